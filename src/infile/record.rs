use std::{
    cmp::Ordering,
    collections::BTreeSet,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

use log::{trace, warn};

use super::{
    line::{parse_line, Line},
    InFilesError,
};
use crate::paths::{has_suffix, normalize, relative_to, to_posix};

/// One `.in` requirements file.
///
/// Identity is the relative path alone. `constraints` only shrink and
/// `requirements` only grow while the file is being resolved, so a record can
/// be looked up by its path at any point during resolution.
#[derive(Debug, Clone)]
pub struct InFile {
    relpath: String,
    stem: String,
    constraints: BTreeSet<String>,
    requirements: BTreeSet<String>,
}

impl InFile {
    pub fn new(
        relpath: impl Into<String>,
        stem: impl Into<String>,
        constraints: BTreeSet<String>,
        requirements: BTreeSet<String>,
    ) -> Result<InFile, InFilesError> {
        let relpath = relpath.into();
        let stem = stem.into();

        let path = Path::new(&relpath);
        if !has_suffix(path) {
            return Err(InFilesError::MissingSuffix(relpath));
        }

        let is_stem_file_name = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy() == stem);
        if stem.is_empty() || !relpath.contains(&stem) || is_stem_file_name {
            return Err(InFilesError::MalformedIdentity { relpath, stem });
        }

        Ok(InFile {
            relpath,
            stem,
            constraints,
            requirements,
        })
    }

    /// Reads and classifies every line of `path_abs`.
    ///
    /// `-c`/`-r` targets become constraints, relative to `cwd`. A target which
    /// does not exist is only warned about: it may still be supplied later.
    pub fn from_file(cwd: &Path, path_abs: &Path) -> Result<InFile, InFilesError> {
        let relpath = relative_to(path_abs, cwd).ok_or_else(|| InFilesError::NotRelative {
            path: path_abs.to_path_buf(),
            base: cwd.to_path_buf(),
        })?;
        let contents = std::fs::read_to_string(path_abs).map_err(|source| InFilesError::Read {
            path: path_abs.to_path_buf(),
            source,
        })?;
        let parent = path_abs.parent().unwrap_or(cwd);

        let mut constraints = BTreeSet::new();
        let mut requirements = BTreeSet::new();
        for line in contents.lines() {
            match parse_line(line) {
                Line::Ignorable => {}
                Line::Include(target) => {
                    let target_abs = normalize(&parent.join(target));
                    if !target_abs.is_file() {
                        warn!(
                            "In {}, constraint file does not exist! {}",
                            to_posix(&relpath),
                            target_abs.display()
                        );
                    }
                    let target_rel = relative_to(&target_abs, cwd).ok_or_else(|| {
                        InFilesError::NotRelative {
                            path: target_abs.clone(),
                            base: cwd.to_path_buf(),
                        }
                    })?;
                    constraints.insert(to_posix(&target_rel));
                }
                Line::Requirement(requirement) => {
                    requirements.insert(requirement.to_string());
                }
            }
        }

        let stem = path_abs
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let in_file = InFile::new(to_posix(&relpath), stem, constraints, requirements)?;
        trace!("Read {:?}", in_file);
        Ok(in_file)
    }

    pub fn relpath(&self) -> &str {
        &self.relpath
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn constraints(&self) -> &BTreeSet<String> {
        &self.constraints
    }

    pub fn requirements(&self) -> &BTreeSet<String> {
        &self.requirements
    }

    pub fn abspath(&self, base: &Path) -> PathBuf {
        base.join(&self.relpath)
    }

    /// Number of unresolved constraints. Zero means the file is fully flattened.
    pub fn depth(&self) -> usize {
        self.constraints.len()
    }

    /// Drops `constraint` and merges in the requirements of the file it names.
    /// Version specifiers are not interpreted, so `pip` and `pip>=24` both stay.
    pub fn resolve(&mut self, constraint: &str, requirements: &BTreeSet<String>) -> bool {
        if !self.constraints.remove(constraint) {
            return false;
        }
        self.requirements.extend(requirements.iter().cloned());
        true
    }
}

impl PartialEq for InFile {
    fn eq(&self, other: &Self) -> bool {
        self.relpath == other.relpath
    }
}

impl Eq for InFile {}

impl Hash for InFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.relpath.hash(state);
    }
}

impl Ord for InFile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stem
            .cmp(&other.stem)
            .then_with(|| self.relpath.cmp(&other.relpath))
    }
}

impl PartialOrd for InFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
