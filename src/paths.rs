use std::path::{Component, Path, PathBuf};

/// Uncompiled requirements file suffix.
pub const SUFFIX_IN: &str = ".in";
/// Output of the external resolver.
pub const SUFFIX_LOCKED: &str = ".lock";
/// Flattened `.in` file, every `-c`/`-r` replaced by the referenced requirements.
pub const SUFFIX_UNLOCKED: &str = ".unlock";

const SHARED_MARKER: &str = "shared";
const SHARED_PIN_PREFIX: &str = "pins";

#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// True if the file name carries at least one suffix, e.g. `prod.in`.
pub fn has_suffix(path: &Path) -> bool {
    path.extension().is_some_and(|ext| !ext.is_empty())
}

/// Replaces only the last suffix: `pins.shared.in` becomes `pins.shared.unlock`.
pub fn replace_last_suffix(path: &Path, suffix: &str) -> PathBuf {
    path.with_extension(suffix.trim_start_matches('.'))
}

/// Appends `suffix` to a suffix-less requirement path taken from `[[tool.venvs]]`.
/// A path already ending with one of the known stage suffixes has it swapped out.
pub fn with_stage_suffix(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = [SUFFIX_IN, SUFFIX_UNLOCKED, SUFFIX_LOCKED]
        .iter()
        .find_map(|known| file_name.strip_suffix(known))
        .unwrap_or(&file_name);
    path.with_file_name(format!("{stem}{suffix}"))
}

/// A file is shared between venvs when one of its suffixes is `.shared`.
pub fn is_shared(file_name: &str) -> bool {
    file_name
        .split('.')
        .skip(1)
        .any(|segment| segment == SHARED_MARKER)
}

/// Shared pin files, e.g. `pins.shared.in`, are consumed by the fixing stage as is.
pub fn is_shared_pin(file_name: &str) -> bool {
    file_name.starts_with(SHARED_PIN_PREFIX) && is_shared(file_name)
}

/// Lexically resolves `.` and `..` without touching the filesystem, so a path
/// to a file which does not exist yet can still be normalized.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(component);
                }
            }
            other => result.push(other),
        }
    }
    result
}

/// `path` relative to `base`, both normalized first.
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    normalize(path)
        .strip_prefix(normalize(base))
        .ok()
        .map(Path::to_path_buf)
}

/// POSIX style rendering used for relative paths acting as keys.
pub fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
