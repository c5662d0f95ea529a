use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use pep440_rs::Version;
use thiserror::Error;

use crate::{
    compile::{unlock_compile, CompileError},
    loader::{LoaderError, LoaderStrategy},
    model::{
        pin::{PinDatum, Requirement},
        venvs::VenvMapLoader,
    },
    paths::{is_shared, SUFFIX_LOCKED, SUFFIX_UNLOCKED},
};

#[derive(Error, Debug)]
pub enum FixError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("IO error while fixing {path}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A `.lock` file rewritten to the winning version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixed {
    pub venv_path: String,
    pub name: String,
    pub file: PathBuf,
    pub from: String,
    pub to: String,
}

impl Display for Fixed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {} in {}",
            self.name,
            self.from,
            self.to,
            self.file.display()
        )
    }
}

/// Locked at several versions while a `.unlock` file asks for a specific one.
/// Needs manual intervention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolvable {
    pub venv_path: String,
    pub name: String,
    pub versions: Vec<String>,
    pub specifiers: Vec<String>,
}

impl Display for Unresolvable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} locked as {} while constrained by {}",
            self.name,
            self.versions.join(", "),
            self.specifiers.join("; ")
        )
    }
}

/// Resolvable, but the outdated pin lives in a `.shared` file, which other
/// projects also consume. Left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvableShared {
    pub venv_path: String,
    pub name: String,
    pub file: PathBuf,
    pub version: String,
    pub to: String,
}

impl Display for ResolvableShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} in shared {}, use {}",
            self.name,
            self.version,
            self.file.display(),
            self.to
        )
    }
}

/// Packages locked at different versions across the `.lock` files of a venv,
/// and what was done about them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixReport {
    pub fixed: Vec<Fixed>,
    pub unresolvables: Vec<Unresolvable>,
    pub resolvable_shared: Vec<ResolvableShared>,
}

/// Writes `.unlock` files, then brings every package of a venv to a single
/// locked version where no `.unlock` file pins it explicitly.
pub fn fix_requirements_lock(
    loader: &VenvMapLoader,
    venv: Option<&Path>,
    strategy: LoaderStrategy,
) -> Result<FixReport, FixError> {
    unlock_compile(loader, venv)?;

    let mut report = FixReport::default();
    for venv_relpath in loader.selected(venv) {
        let venv_path = Path::new(&venv_relpath);
        let locks = strategy.load(loader, venv_path, SUFFIX_LOCKED, true)?;
        let unlocks = strategy.load(loader, venv_path, SUFFIX_UNLOCKED, true)?;
        fix_venv(&venv_relpath, &locks, &unlocks, &mut report)?;
    }
    Ok(report)
}

fn fix_venv(
    venv_relpath: &str,
    locks: &BTreeSet<PinDatum>,
    unlocks: &BTreeSet<PinDatum>,
    report: &mut FixReport,
) -> Result<(), FixError> {
    let mut by_name: BTreeMap<&str, Vec<(&PinDatum, Version)>> = BTreeMap::new();
    for pin in locks {
        if let Some(version) = pin.requirement.locked_version() {
            by_name.entry(pin.name()).or_default().push((pin, version));
        }
    }

    for (name, pins) in by_name {
        // PEP 440 equality, `24.2` and `24.2.0` are the same version
        let versions: BTreeSet<&Version> = pins.iter().map(|(_, version)| version).collect();
        let Some(&highest) = versions.last() else {
            continue;
        };
        if versions.len() < 2 {
            continue;
        }

        let specifiers: Vec<String> = unlocks
            .iter()
            .filter(|pin| pin.name() == name)
            .map(PinDatum::to_string)
            .collect();
        if !specifiers.is_empty() {
            warn!("{} has conflicting locked versions {:?}", name, versions);
            report.unresolvables.push(Unresolvable {
                venv_path: venv_relpath.to_string(),
                name: name.to_string(),
                versions: versions.iter().map(ToString::to_string).collect(),
                specifiers,
            });
            continue;
        }
        debug!("{} resolves to {} out of {:?}", name, highest, versions);

        for (pin, version) in pins.iter().filter(|(_, version)| version != highest) {
            let file_name = pin
                .file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if is_shared(&file_name) {
                report.resolvable_shared.push(ResolvableShared {
                    venv_path: venv_relpath.to_string(),
                    name: name.to_string(),
                    file: pin.file.clone(),
                    version: version.to_string(),
                    to: highest.to_string(),
                });
                continue;
            }

            rewrite_locked_version(&pin.file, name, highest)?;
            info!(
                "Fixed {} {} -> {} in {}",
                name,
                version,
                highest,
                pin.file.display()
            );
            report.fixed.push(Fixed {
                venv_path: venv_relpath.to_string(),
                name: name.to_string(),
                file: pin.file.clone(),
                from: version.to_string(),
                to: highest.to_string(),
            });
        }
    }
    Ok(())
}

/// Sets the `==` version on the line locking `name`. Line endings and
/// trailing comments are kept.
fn rewrite_locked_version(path: &Path, name: &str, to: &Version) -> Result<(), FixError> {
    let to_io_error = |source| FixError::IO {
        path: path.to_path_buf(),
        source,
    };
    let contents = std::fs::read_to_string(path).map_err(to_io_error)?;
    let to = to.to_string();

    let rewritten: String = contents
        .split_inclusive('\n')
        .map(|line| match locked_name(line) {
            Some(locked) if locked == name => replace_locked_version(line, &to),
            _ => line.to_string(),
        })
        .collect();
    std::fs::write(path, rewritten).map_err(to_io_error)
}

/// Normalized name of the requirement starting on `line`, if any.
fn locked_name(line: &str) -> Option<String> {
    let head = line.trim();
    if head.is_empty() || head.starts_with('#') || head.starts_with('-') {
        return None;
    }
    let head = head.trim_end_matches('\\');
    let head = head.split(" #").next().unwrap_or(head);
    let head = head.split(" --").next().unwrap_or(head);
    Requirement::parse(head).map(|requirement| requirement.name)
}

/// Replaces the version token following the first `==` of `line`.
fn replace_locked_version(line: &str, to: &str) -> String {
    let Some(start) = line.find("==").map(|pos| pos + 2) else {
        return line.to_string();
    };
    let rest = &line[start..];
    let start = start + rest.len() - rest.trim_start().len();
    let end = line[start..]
        .find(|c: char| c.is_whitespace() || matches!(c, ';' | ',' | '\\' | '#'))
        .map_or(line.len(), |len| start + len);
    format!("{}{}{}", &line[..start], to, &line[end..])
}
