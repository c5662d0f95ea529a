use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, info};

use super::{InFile, InFilesError};
use crate::paths::{is_shared_pin, replace_last_suffix, LINE_ENDING, SUFFIX_UNLOCKED};

const UNLOCK_FILE_MODE: u32 = 0o644;

/// Lazily writes one `.unlock` file per resolved `.in` file.
///
/// Each call to `next` writes a file, so the iterator is meant to be consumed once.
pub struct UnlockWriter<'a> {
    cwd: &'a Path,
    in_files: std::vec::IntoIter<&'a InFile>,
}

impl<'a> UnlockWriter<'a> {
    pub(super) fn new(cwd: &'a Path, in_files: Vec<&'a InFile>) -> Self {
        Self {
            cwd,
            in_files: in_files.into_iter(),
        }
    }
}

impl<'a> Iterator for UnlockWriter<'a> {
    type Item = Result<PathBuf, InFilesError>;

    fn next(&mut self) -> Option<Self::Item> {
        for in_file in self.in_files.by_ref() {
            let path_in = in_file.abspath(self.cwd);
            let file_name = path_in
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if is_shared_pin(&file_name) {
                debug!("Skipping shared pins file {}", in_file.relpath());
                continue;
            }

            let path_unlock = replace_last_suffix(&path_in, SUFFIX_UNLOCKED);
            return Some(write_unlock(&path_unlock, in_file).map(|()| {
                info!("Wrote {}", path_unlock.display());
                path_unlock
            }));
        }
        None
    }
}

/// Requirements sorted alphabetically, one per line, trailing newline included.
fn unlock_contents(in_file: &InFile) -> String {
    let mut contents = String::new();
    for requirement in in_file.requirements() {
        contents.push_str(requirement);
        contents.push_str(LINE_ENDING);
    }
    if contents.is_empty() {
        contents.push_str(LINE_ENDING);
    }
    contents
}

fn write_unlock(path: &Path, in_file: &InFile) -> Result<(), InFilesError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(UNLOCK_FILE_MODE);
    }
    #[cfg(not(unix))]
    let _ = UNLOCK_FILE_MODE;

    options
        .open(path)
        .and_then(|mut file| file.write_all(unlock_contents(in_file).as_bytes()))
        .map_err(|source| InFilesError::Write {
            path: path.to_path_buf(),
            source,
        })
}
