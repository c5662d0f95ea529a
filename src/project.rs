use std::path::{Path, PathBuf};

use log::debug;

const PYPROJECT_TOML: &str = "pyproject.toml";
const PYPROJECT_TOML_FIXTURE_SUFFIX: &str = ".pyproject_toml";

/// How the project root was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootMarker {
    Git,
    Mercurial,
    PyprojectToml,
    FileSystemRoot,
}

/// Closest folder, starting at `start`, containing `.git`, `.hg` or `pyproject.toml`.
/// Falls back to the file system root.
pub fn find_project_root(start: &Path) -> (PathBuf, RootMarker) {
    let start = if start.is_dir() {
        start
    } else {
        start.parent().unwrap_or(start)
    };

    let mut last = start;
    for directory in start.ancestors() {
        if directory.join(".git").exists() {
            return (directory.to_path_buf(), RootMarker::Git);
        }
        if directory.join(".hg").is_dir() {
            return (directory.to_path_buf(), RootMarker::Mercurial);
        }
        if directory.join(PYPROJECT_TOML).is_file() {
            return (directory.to_path_buf(), RootMarker::PyprojectToml);
        }
        last = directory;
    }

    (last.to_path_buf(), RootMarker::FileSystemRoot)
}

/// Absolute path to the project `pyproject.toml`.
///
/// `start` may itself be the config file, either named `pyproject.toml` or,
/// for test fixtures, ending with `.pyproject_toml`.
pub fn find_pyproject_toml(start: &Path) -> Option<PathBuf> {
    let file_name = start
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let is_config_file =
        file_name == PYPROJECT_TOML || file_name.ends_with(PYPROJECT_TOML_FIXTURE_SUFFIX);
    if is_config_file && start.is_file() {
        return Some(start.to_path_buf());
    }

    let (root, marker) = find_project_root(start);
    debug!("Project root {} found by {:?}", root.display(), marker);
    let pyproject_toml = root.join(PYPROJECT_TOML);
    pyproject_toml.is_file().then_some(pyproject_toml)
}
