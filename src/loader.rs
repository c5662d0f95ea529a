use std::{collections::BTreeSet, path::Path, str::FromStr};

use log::debug;
use thiserror::Error;

use crate::model::{
    pin::{FilePins, PinDatum, PinError},
    venvs::{VenvError, VenvMapLoader},
};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error(transparent)]
    Venv(#[from] VenvError),
    #[error("For venv {venv}, {source}")]
    Pin { venv: String, source: PinError },
    #[error("Unknown loader strategy `{0}`, expected `per-entry` or `single-pass`")]
    UnknownStrategy(String),
}

/// How pins are extracted from the compiled requirement files of one venv.
/// Both strategies return the same set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoaderStrategy {
    /// Re-reads a file for every entry it contains.
    PerEntry,
    /// Reads each file exactly once.
    #[default]
    SinglePass,
}

impl FromStr for LoaderStrategy {
    type Err = LoaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "per-entry" => Ok(LoaderStrategy::PerEntry),
            "single-pass" => Ok(LoaderStrategy::SinglePass),
            _ => Err(LoaderError::UnknownStrategy(value.to_string())),
        }
    }
}

impl LoaderStrategy {
    /// Pins of every requirement file of `venv` ending with `suffix`.
    /// With `filter_by_pin`, entries without a version specifier are dropped.
    pub fn load(
        self,
        loader: &VenvMapLoader,
        venv: &Path,
        suffix: &str,
        filter_by_pin: bool,
    ) -> Result<BTreeSet<PinDatum>, LoaderError> {
        let pins = match self {
            LoaderStrategy::PerEntry => load_per_entry(loader, venv, suffix)?,
            LoaderStrategy::SinglePass => from_loader_filepins(loader, venv, suffix)?
                .iter()
                .flat_map(FilePins::iter)
                .cloned()
                .collect(),
        };

        Ok(pins
            .into_iter()
            .filter(|pin| !filter_by_pin || pin.is_pin())
            .collect())
    }
}

/// Parsed requirement files of `venv`, one [`FilePins`] per file.
pub fn from_loader_filepins(
    loader: &VenvMapLoader,
    venv: &Path,
    suffix: &str,
) -> Result<Vec<FilePins>, LoaderError> {
    let venv_relpath = loader.venv_relpath(venv);
    loader
        .get_reqs(venv, suffix)?
        .iter()
        .map(|path| {
            FilePins::from_file(path).map_err(|source| LoaderError::Pin {
                venv: venv_relpath.clone(),
                source,
            })
        })
        .collect()
}

fn load_per_entry(
    loader: &VenvMapLoader,
    venv: &Path,
    suffix: &str,
) -> Result<BTreeSet<PinDatum>, LoaderError> {
    let venv_relpath = loader.venv_relpath(venv);
    let to_loader_error = |source: PinError| LoaderError::Pin {
        venv: venv_relpath.clone(),
        source,
    };

    let mut pins = BTreeSet::new();
    for path in loader.get_reqs(venv, suffix)? {
        let count = FilePins::from_file(&path).map_err(to_loader_error)?.iter().count();
        debug!("{} entries in {}", count, path.display());

        for index in 0..count {
            let file_pins = FilePins::from_file(&path).map_err(to_loader_error)?;
            if let Some(pin) = file_pins.iter().nth(index) {
                pins.insert(pin.clone());
            }
        }
    }
    Ok(pins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::{SUFFIX_LOCKED, SUFFIX_UNLOCKED};

    use pretty_assertions::assert_eq;

    fn project() -> (tempfile::TempDir, VenvMapLoader) {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        std::fs::write(
            base.join("pyproject.toml"),
            "[[tool.venvs]]\nvenv_base_path = '.venv'\nreqs = ['requirements/prod', 'requirements/dev']\n",
        )
        .unwrap();
        std::fs::create_dir_all(base.join(".venv")).unwrap();
        std::fs::create_dir_all(base.join("requirements")).unwrap();
        std::fs::write(
            base.join("requirements/prod.unlock"),
            "attrs\npip>=24.2\ntyping-extensions; python_version<\"3.11\"\n",
        )
        .unwrap();
        std::fs::write(base.join("requirements/dev.unlock"), "pytest>=8\nattrs\n").unwrap();
        let loader = VenvMapLoader::new(base).unwrap();
        (dir, loader)
    }

    #[test]
    fn strategies_agree() {
        let (_dir, loader) = project();
        for filter_by_pin in [true, false] {
            let per_entry = LoaderStrategy::PerEntry
                .load(&loader, Path::new(".venv"), SUFFIX_UNLOCKED, filter_by_pin)
                .unwrap();
            let single_pass = LoaderStrategy::SinglePass
                .load(&loader, Path::new(".venv"), SUFFIX_UNLOCKED, filter_by_pin)
                .unwrap();
            assert_eq!(per_entry, single_pass);
        }
    }

    #[test]
    fn filter_by_pin() {
        let (_dir, loader) = project();
        let pins = LoaderStrategy::default()
            .load(&loader, Path::new(".venv"), SUFFIX_UNLOCKED, true)
            .unwrap();
        let names: Vec<&str> = pins.iter().map(PinDatum::name).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"pip"));
        assert!(names.contains(&"pytest"));

        let everything = LoaderStrategy::default()
            .load(&loader, Path::new(".venv"), SUFFIX_UNLOCKED, false)
            .unwrap();
        // attrs appears in both files
        assert_eq!(everything.len(), 5);
    }

    #[test]
    fn missing_compiled_file() {
        let (_dir, loader) = project();
        for strategy in [LoaderStrategy::PerEntry, LoaderStrategy::SinglePass] {
            assert!(matches!(
                strategy.load(&loader, Path::new(".venv"), SUFFIX_LOCKED, true),
                Err(LoaderError::Venv(VenvError::MissingRequirementsFile { .. }))
            ));
            assert!(matches!(
                strategy.load(&loader, Path::new(".nope"), SUFFIX_UNLOCKED, true),
                Err(LoaderError::Venv(VenvError::VenvNotFound(_)))
            ));
        }
    }

    #[test]
    fn strategy_from_str() {
        assert_eq!(
            "per-entry".parse::<LoaderStrategy>().unwrap(),
            LoaderStrategy::PerEntry
        );
        assert_eq!(
            "Single-Pass".parse::<LoaderStrategy>().unwrap(),
            LoaderStrategy::SinglePass
        );
        assert!("fastest".parse::<LoaderStrategy>().is_err());
    }
}
