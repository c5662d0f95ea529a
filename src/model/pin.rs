use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use pep440_rs::{Operator, Version, VersionSpecifier, VersionSpecifiers};
use pep508_rs::{Requirement as PepRequirement, VersionOrUrl};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PinError {
    #[error("Requirements file not found {0}. Create it")]
    NotFound(PathBuf),
    #[error("IO error reading requirements file {path}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A single requirement entry of a compiled requirements file, e.g.
/// `Sphinx[docs]>=7.0,<8; python_version >= "3.9"`.
///
/// `name` is normalized, so entries compare equal across files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    pub specifiers: Vec<String>,
    pub url: Option<String>,
    pub marker: Option<String>,
}

impl Requirement {
    pub fn parse(line: &str) -> Option<Requirement> {
        let requirement = PepRequirement::from_str(line.trim()).ok()?;
        let (specifiers, url) = match requirement.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => {
                let specifiers = VersionSpecifiers::from_str(&specifiers.to_string()).ok()?;
                (specifiers.iter().map(ToString::to_string).collect(), None)
            }
            Some(VersionOrUrl::Url(url)) => (Vec::new(), Some(url.to_string())),
            None => (Vec::new(), None),
        };
        Some(Requirement {
            name: normalize_name(&requirement.name.to_string()),
            extras: requirement
                .extras
                .iter()
                .map(ToString::to_string)
                .collect(),
            specifiers,
            url,
            marker: requirement.marker.map(|marker| marker.to_string()),
        })
    }

    /// The version of an exact `==` pin. Wildcards and `===` do not lock.
    pub fn locked_version(&self) -> Option<Version> {
        let [only] = self.specifiers.as_slice() else {
            return None;
        };
        let specifier = VersionSpecifier::from_str(only).ok()?;
        match specifier.operator() {
            Operator::Equal => Some(specifier.version().clone()),
            _ => None,
        }
    }
}

/// PEP 503 normalized name, used to compare packages across files.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut last_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !last_separator {
                normalized.push('-');
            }
            last_separator = true;
        } else {
            normalized.push(c.to_ascii_lowercase());
            last_separator = false;
        }
    }
    normalized
}

/// Joins `\` continuations, drops comments and pip option lines and strips
/// trailing per-requirement options such as `--hash=...`.
pub fn logical_lines(contents: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for raw in contents.lines() {
        let line = strip_comment(raw);
        match line.trim_end().strip_suffix('\\') {
            Some(continued) => {
                current.push_str(continued);
                current.push(' ');
                continue;
            }
            None => current.push_str(line),
        }

        let logical = std::mem::take(&mut current);
        let logical = match logical.find(" --") {
            Some(pos) => &logical[..pos],
            None => logical.as_str(),
        };
        let logical = logical.trim();
        if !logical.is_empty() && !logical.starts_with('-') {
            lines.push(logical.to_string());
        }
    }
    lines
}

/// A comment starts at `#` at the beginning of a line or after whitespace,
/// so URL fragments such as `#egg=` survive.
fn strip_comment(line: &str) -> &str {
    let mut previous_whitespace = true;
    for (pos, c) in line.char_indices() {
        if c == '#' && previous_whitespace {
            return &line[..pos];
        }
        previous_whitespace = c.is_whitespace();
    }
    line
}

/// One requirement entry together with the compiled `.unlock` or `.lock`
/// file it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinDatum {
    pub file: PathBuf,
    pub line: String,
    pub requirement: Requirement,
}

impl PinDatum {
    pub fn name(&self) -> &str {
        &self.requirement.name
    }

    pub fn specifiers(&self) -> &[String] {
        &self.requirement.specifiers
    }

    /// Has an explicit version specifier, e.g. `pip>=24.2`.
    pub fn is_pin(&self) -> bool {
        !self.requirement.specifiers.is_empty()
    }
}

impl Display for PinDatum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.line, self.file.display())
    }
}

/// Every entry of one compiled requirements file, read once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePins {
    pins: Vec<PinDatum>,
}

impl FilePins {
    pub fn from_file(path: &Path) -> Result<FilePins, PinError> {
        let contents = read_requirements_file(path)?;
        Ok(FilePins::from_str(path, &contents))
    }

    pub fn from_str(path: &Path, contents: &str) -> FilePins {
        let pins = logical_lines(contents)
            .into_iter()
            .filter_map(|line| {
                Requirement::parse(&line).map(|requirement| PinDatum {
                    file: path.to_path_buf(),
                    line,
                    requirement,
                })
            })
            .collect();
        FilePins { pins }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PinDatum> {
        self.pins.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.pins.iter().map(PinDatum::name).collect()
    }

    pub fn by_name(&self, name: &str) -> Option<&PinDatum> {
        let name = normalize_name(name);
        self.pins
            .iter()
            .find(|pin| pin.requirement.name == name)
    }
}

impl<'a> IntoIterator for &'a FilePins {
    type Item = &'a PinDatum;
    type IntoIter = std::slice::Iter<'a, PinDatum>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub(crate) fn read_requirements_file(path: &Path) -> Result<String, PinError> {
    std::fs::read_to_string(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => PinError::NotFound(path.to_path_buf()),
        _ => PinError::IO {
            path: path.to_path_buf(),
            source,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_requirement_forms() {
        let sphinx =
            Requirement::parse("Sphinx[docs, test] >= 7.0, <8 ; python_version >= \"3.9\"").unwrap();
        assert_eq!(sphinx.name, "sphinx");
        assert_eq!(sphinx.extras, vec!["docs", "test"]);
        assert_eq!(sphinx.specifiers, vec![">=7.0", "<8"]);
        assert_eq!(sphinx.url, None);
        assert!(sphinx.marker.unwrap().contains("python_version"));

        let plain = Requirement::parse("requests").unwrap();
        assert_eq!(plain.name, "requests");
        assert!(plain.specifiers.is_empty());
        assert_eq!(plain.marker, None);

        let url = Requirement::parse("wreck @ https://example.org/wreck-1.0.tar.gz").unwrap();
        assert_eq!(url.name, "wreck");
        assert!(url.specifiers.is_empty());
        assert!(url.url.is_some());

        assert_eq!(Requirement::parse("./local/checkout"), None);
    }

    #[test]
    fn locked_versions() {
        let locked = Requirement::parse("typing-extensions==4.12.2").unwrap();
        assert_eq!(locked.locked_version(), Version::from_str("4.12.2").ok());
        let epoch = Requirement::parse("idna==1!2.0").unwrap();
        assert_eq!(epoch.locked_version(), Version::from_str("1!2.0").ok());
        assert_eq!(Requirement::parse("pip>=24.2").unwrap().locked_version(), None);
        assert_eq!(Requirement::parse("pip===24.2").unwrap().locked_version(), None);
        assert_eq!(Requirement::parse("pip==24.*").unwrap().locked_version(), None);
        assert_eq!(Requirement::parse("pip").unwrap().locked_version(), None);
    }

    #[test]
    fn name_normalization() {
        assert_eq!(normalize_name("Typing_Extensions"), "typing-extensions");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("a-_b"), "a-b");
    }

    #[test]
    fn compiled_file_lines() {
        let contents = "\
#
# This file is autogenerated by pip-compile
#
--index-url https://pypi.org/simple

click==8.1.7 \\
    --hash=sha256:ae74fb96c20a0277a1d615f1e4d73c8414f5a98db8b799a7931d1582f3390c28
    # via pip-tools
pip-tools==7.4.1
    # via -r requirements/pip-tools.in
wreck @ git+https://example.org/wreck.git#egg=wreck  # editable
";
        assert_eq!(
            logical_lines(contents),
            vec![
                "click==8.1.7",
                "pip-tools==7.4.1",
                "wreck @ git+https://example.org/wreck.git#egg=wreck",
            ]
        );
    }

    #[test]
    fn file_pins() {
        let path = Path::new("/p/requirements/prod.lock");
        let file_pins = FilePins::from_str(path, "attrs==24.2.0\nTyping_Extensions==4.12.2\nrich\n");
        assert_eq!(file_pins.names(), vec!["attrs", "typing-extensions", "rich"]);
        let pin = file_pins.by_name("typing-extensions").unwrap();
        assert!(pin.is_pin());
        assert_eq!(pin.specifiers(), &["==4.12.2".to_string()]);
        assert!(!file_pins.by_name("rich").unwrap().is_pin());
        assert_eq!(file_pins.iter().filter(|pin| pin.is_pin()).count(), 2);
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            FilePins::from_file(Path::new("/nonexistent/prod.lock")),
            Err(PinError::NotFound(_))
        ));
    }
}
