pub mod line;
mod output;
mod record;

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Write},
    path::{Path, PathBuf},
};

use log::{debug, trace, warn};
use thiserror::Error;

pub use line::{parse_line, strip_inline_comment, Line};
pub use output::UnlockWriter;
pub use record::InFile;

use crate::paths::relative_to;

#[derive(Error, Debug)]
pub enum InFilesError {
    #[error("Requirements file path must contain a suffix, got `{0}`")]
    MissingSuffix(String),
    #[error("InFile stem `{stem}` has no relation to relpath `{relpath}`")]
    MalformedIdentity { relpath: String, stem: String },
    #[error("Expected an absolute path, got {0}")]
    NotAbsolute(PathBuf),
    #[error("{path} is not relative to {base}")]
    NotRelative { path: PathBuf, base: PathBuf },
    #[error("Could not read requirements file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Missing .in requirements file(s). Unable to resolve constraint(s). {0}")]
    MissingSupportFiles(Unresolvable),
}

/// Every file still waiting on constraints once resolution stops making progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolvable {
    pub files: Vec<(String, Vec<String>)>,
}

impl Display for Unresolvable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Files with unresolvable constraints:")?;
        for (relpath, constraints) in &self.files {
            f.write_char(' ')?;
            write!(f, "{} (missing {})", relpath, constraints.join(", "))?;
            f.write_char(';')?;
        }
        Ok(())
    }
}

/// Resolves the constraints of a set of `.in` files into flat requirement sets.
///
/// Files with outstanding constraints are `pending`. Files whose constraints
/// have all been merged in are `resolved`. A file is in exactly one of the two.
#[derive(Debug)]
pub struct InFiles {
    cwd: PathBuf,
    pending: BTreeMap<String, InFile>,
    resolved: BTreeMap<String, InFile>,
}

impl InFiles {
    /// `cwd` anchors every relative path. `in_files` are absolute paths to `.in` files.
    pub fn new(cwd: impl Into<PathBuf>, in_files: &[PathBuf]) -> Result<InFiles, InFilesError> {
        let cwd = cwd.into();
        if !cwd.is_absolute() {
            return Err(InFilesError::NotAbsolute(cwd));
        }

        let mut in_files_set = InFiles {
            cwd,
            pending: BTreeMap::new(),
            resolved: BTreeMap::new(),
        };
        for path_abs in in_files {
            in_files_set.add_file(path_abs)?;
        }
        in_files_set.move_zeroes();

        Ok(in_files_set)
    }

    /// Reads `path_abs` and adds it as pending. Returns false when the file is
    /// already known or does not exist (yet).
    pub fn add_file(&mut self, path_abs: &Path) -> Result<bool, InFilesError> {
        if !path_abs.is_absolute() {
            return Err(InFilesError::NotAbsolute(path_abs.to_path_buf()));
        }
        if relative_to(path_abs, &self.cwd).is_none() {
            return Err(InFilesError::NotRelative {
                path: path_abs.to_path_buf(),
                base: self.cwd.clone(),
            });
        }
        if !path_abs.is_file() {
            warn!("Requirement file does not exist! {}", path_abs.display());
            return Ok(false);
        }

        let in_file = InFile::from_file(&self.cwd, path_abs)?;
        Ok(self.add(in_file))
    }

    /// Adds an already built record. Returns false if its path is already known.
    pub fn add(&mut self, in_file: InFile) -> bool {
        if self.contains(in_file.relpath()) {
            return false;
        }
        self.pending.insert(in_file.relpath().to_string(), in_file);
        true
    }

    pub fn contains(&self, relpath: &str) -> bool {
        self.is_pending(relpath) || self.is_resolved(relpath)
    }

    pub fn is_pending(&self, relpath: &str) -> bool {
        self.pending.contains_key(relpath)
    }

    pub fn is_resolved(&self, relpath: &str) -> bool {
        self.resolved.contains_key(relpath)
    }

    pub fn get(&self, relpath: &str) -> Option<&InFile> {
        self.pending
            .get(relpath)
            .or_else(|| self.resolved.get(relpath))
    }

    /// Files with outstanding constraints, sorted by stem then path.
    pub fn pending(&self) -> Vec<&InFile> {
        sorted(&self.pending)
    }

    /// Fully flattened files, sorted by stem then path.
    pub fn resolved(&self) -> Vec<&InFile> {
        sorted(&self.resolved)
    }

    /// Moves every pending file without constraints into resolved.
    pub fn move_zeroes(&mut self) -> usize {
        let zeroes: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, in_file)| in_file.depth() == 0)
            .map(|(relpath, _)| relpath.clone())
            .collect();

        for relpath in &zeroes {
            if let Some(in_file) = self.pending.remove(relpath) {
                trace!("{} is resolved", relpath);
                self.resolved.insert(relpath.clone(), in_file);
            }
        }

        zeroes.len()
    }

    /// One resolution pass: promote, discover new constraint files, promote,
    /// merge resolved constraints into their dependents, promote.
    pub fn resolve_zeroes(&mut self) -> Result<(), InFilesError> {
        self.move_zeroes();

        let discovered: BTreeSet<String> = self
            .pending
            .values()
            .flat_map(InFile::constraints)
            .filter(|constraint| !self.contains(constraint))
            .cloned()
            .collect();
        for relpath in discovered {
            let path_abs = self.cwd.join(&relpath);
            if self.add_file(&path_abs)? {
                debug!("Discovered constraint file {}", relpath);
            }
        }

        self.move_zeroes();

        let resolved = &self.resolved;
        for in_file in self.pending.values_mut() {
            let ready: Vec<String> = in_file
                .constraints()
                .iter()
                .filter(|constraint| resolved.contains_key(*constraint))
                .cloned()
                .collect();
            for constraint in ready {
                let requirements = resolved[&constraint].requirements();
                in_file.resolve(&constraint, requirements);
                trace!("Merged {} into {}", constraint, in_file.relpath());
            }
        }

        self.move_zeroes();

        Ok(())
    }

    /// Runs resolution passes until nothing is pending.
    ///
    /// Fails with [`InFilesError::MissingSupportFiles`] as soon as a pass
    /// changes neither the pending nor the resolved count. A missing file and a
    /// cycle without a base case look the same and are reported the same.
    pub fn resolution_loop(&mut self) -> Result<(), InFilesError> {
        let mut previous = (self.pending.len(), self.resolved.len());
        let mut pass = 0;
        while !self.pending.is_empty() {
            pass += 1;
            trace!(
                "Pass {} before: pending {:?} resolved {:?}",
                pass,
                self.pending.keys().collect::<Vec<_>>(),
                self.resolved.keys().collect::<Vec<_>>()
            );

            self.resolve_zeroes()?;

            let current = (self.pending.len(), self.resolved.len());
            trace!(
                "Pass {} after: {} pending {} resolved",
                pass,
                current.0,
                current.1
            );
            if !self.pending.is_empty() && current == previous {
                let unresolvable = self.unresolvable();
                warn!("{}", unresolvable);
                return Err(InFilesError::MissingSupportFiles(unresolvable));
            }
            previous = current;
        }

        debug!(
            "Resolved {} requirements files in {} passes",
            self.resolved.len(),
            pass
        );
        Ok(())
    }

    fn unresolvable(&self) -> Unresolvable {
        Unresolvable {
            files: self
                .pending()
                .into_iter()
                .map(|in_file| {
                    (
                        in_file.relpath().to_string(),
                        in_file.constraints().iter().cloned().collect(),
                    )
                })
                .collect(),
        }
    }

    /// Writes a `.unlock` file for every resolved file apart from shared pins.
    pub fn write(&self) -> UnlockWriter<'_> {
        UnlockWriter::new(&self.cwd, self.resolved())
    }
}

fn sorted(map: &BTreeMap<String, InFile>) -> Vec<&InFile> {
    let mut in_files: Vec<&InFile> = map.values().collect();
    in_files.sort();
    in_files
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn write(dir: &Path, relpath: &str, contents: &str) -> PathBuf {
        let path = dir.join(relpath);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn relpaths(in_files: Vec<&InFile>) -> Vec<&str> {
        in_files.into_iter().map(InFile::relpath).collect()
    }

    #[test]
    fn flattening() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        let a = write(cwd, "requirements/a.in", "-c b.in\nmine\n");
        write(cwd, "requirements/b.in", "x\ny\n");

        let mut in_files = InFiles::new(cwd, &[a]).unwrap();
        assert_eq!(relpaths(in_files.pending()), vec!["requirements/a.in"]);
        in_files.resolution_loop().unwrap();

        assert!(in_files.pending().is_empty());
        let a = in_files.get("requirements/a.in").unwrap();
        assert!(a.constraints().is_empty());
        assert_eq!(a.requirements(), &set(&["mine", "x", "y"]));
        assert_eq!(
            relpaths(in_files.resolved()),
            vec!["requirements/a.in", "requirements/b.in"]
        );
    }

    #[test]
    fn diamond_merges_once() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        let a = write(cwd, "a.in", "-r b.in\n-r c.in\n");
        let b = write(cwd, "b.in", "-c d.in\nbee\n");
        write(cwd, "c.in", "-c d.in\n");
        write(cwd, "d.in", "z\n");

        for initial in [vec![a.clone()], vec![b.clone(), a.clone()]] {
            let mut in_files = InFiles::new(cwd, &initial).unwrap();
            in_files.resolution_loop().unwrap();
            let a = in_files.get("a.in").unwrap();
            assert_eq!(a.requirements(), &set(&["bee", "z"]));
            assert_eq!(in_files.resolved().len(), 4);
        }
    }

    #[test]
    fn missing_constraint_is_unresolvable() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        let a = write(cwd, "a.in", "-c b.in\nflask\n");

        let mut in_files = InFiles::new(cwd, &[a]).unwrap();
        match in_files.resolution_loop() {
            Err(InFilesError::MissingSupportFiles(unresolvable)) => assert_eq!(
                unresolvable.files,
                vec![("a.in".to_string(), vec!["b.in".to_string()])]
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn cycle_is_unresolvable() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        let a = write(cwd, "a.in", "-c b.in\n");
        write(cwd, "b.in", "-c a.in\n");

        let mut in_files = InFiles::new(cwd, &[a]).unwrap();
        let err = in_files.resolution_loop().unwrap_err();
        assert!(matches!(err, InFilesError::MissingSupportFiles(_)));
        assert!(err.to_string().contains("a.in (missing b.in)"));
    }

    #[test]
    fn forward_reference_supplied_later() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        let a = write(cwd, "a.in", "-c b.in\nflask\n");

        let mut in_files = InFiles::new(cwd, &[a]).unwrap();
        in_files.resolve_zeroes().unwrap();
        assert!(in_files.is_pending("a.in"));

        let b = write(cwd, "b.in", "werkzeug\n");
        assert!(in_files.add_file(&b).unwrap());
        in_files.resolution_loop().unwrap();
        assert_eq!(
            in_files.get("a.in").unwrap().requirements(),
            &set(&["flask", "werkzeug"])
        );
    }

    #[test]
    fn promotion_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        let a = write(cwd, "a.in", "-c b.in\n");
        let b = write(cwd, "b.in", "x\n");

        let mut in_files = InFiles::new(cwd, &[a, b]).unwrap();
        let first = (relpaths(in_files.pending()).len(), in_files.resolved().len());
        assert_eq!(in_files.move_zeroes(), 0);
        let second = (relpaths(in_files.pending()).len(), in_files.resolved().len());
        assert_eq!(first, second);
        assert_eq!(first, (1, 1));
    }

    #[test]
    fn requirements_grow_and_constraints_shrink() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        let a = write(cwd, "a.in", "-c b.in\nalpha\n");
        write(cwd, "b.in", "-c c.in\nbeta\n");
        write(cwd, "c.in", "gamma\n");

        let mut in_files = InFiles::new(cwd, &[a]).unwrap();
        let mut requirements = in_files.get("a.in").unwrap().requirements().clone();
        let mut constraints = in_files.get("a.in").unwrap().constraints().clone();
        let mut passes = 0;
        while !in_files.pending().is_empty() {
            in_files.resolve_zeroes().unwrap();
            passes += 1;
            let a = in_files.get("a.in").unwrap();
            assert!(a.requirements().is_superset(&requirements));
            assert!(a.constraints().is_subset(&constraints));
            requirements = a.requirements().clone();
            constraints = a.constraints().clone();
        }
        assert!(passes <= 3);
        assert_eq!(requirements, set(&["alpha", "beta", "gamma"]));
    }

    #[test]
    fn missing_initial_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        let in_files = InFiles::new(cwd, &[cwd.join("nope.in")]).unwrap();
        assert!(in_files.pending().is_empty());
        assert!(in_files.resolved().is_empty());
    }

    #[test]
    fn paths_outside_cwd_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("project");
        let outside = write(dir.path(), "other/a.in", "x\n");
        assert!(matches!(
            InFiles::new(&cwd, &[outside]),
            Err(InFilesError::NotRelative { .. })
        ));
        assert!(matches!(
            InFiles::new(&cwd, &[PathBuf::from("a.in")]),
            Err(InFilesError::NotAbsolute(_))
        ));
    }
}
