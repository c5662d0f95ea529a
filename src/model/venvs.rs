use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use log::debug;
use thiserror::Error;
use toml::Value;

use crate::{
    model::ParseError,
    paths::{normalize, relative_to, to_posix, with_stage_suffix},
    project::find_pyproject_toml,
};

#[derive(Error, Debug)]
pub enum VenvError {
    #[error("Reverse search lookup from {0} could not find a pyproject.toml file")]
    ProjectNotFound(PathBuf),
    #[error("Error while parsing {path}: {source}")]
    Parse { path: PathBuf, source: ParseError },
    #[error("No such venv found, {0}")]
    VenvNotFound(String),
    #[error("venv base folder does not exist, {0}. Create it")]
    NotADirectory(PathBuf),
    #[error("For venv {venv}, requirements file not found {path}. Create it")]
    MissingRequirementsFile { venv: String, path: PathBuf },
}

/// One `[[tool.venvs]]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenvReq {
    pub venv_base_path: String,
    /// Paths relative to the project base, without the stage suffix.
    pub reqs: Vec<String>,
}

/// Parsed `[[tool.venvs]]` sections, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenvMap {
    pub venvs: Vec<VenvReq>,
}

impl VenvMap {
    pub fn from_file(path: &Path) -> Result<VenvMap, ParseError> {
        debug!("Attempting to read [[tool.venvs]] from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        VenvMap::from_toml_str(&contents)
    }

    pub fn from_toml_str(data: &str) -> Result<VenvMap, ParseError> {
        let mut toml_value = toml::from_str::<HashMap<String, Value>>(data)?;

        let venvs = toml_value
            .remove("tool")
            .and_then(|tool| tool.get("venvs").cloned())
            .and_then(|venvs| match venvs {
                Value::Array(venvs) => Some(venvs),
                _ => None,
            })
            .filter(|venvs| !venvs.is_empty())
            .ok_or(ParseError::MissingVenvs)?;

        let venvs = venvs
            .iter()
            .map(parse_venv)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(VenvMap { venvs })
    }

    pub fn get(&self, venv_relpath: &str) -> Option<&VenvReq> {
        self.venvs
            .iter()
            .find(|venv| venv.venv_base_path == venv_relpath)
    }
}

fn parse_venv(value: &Value) -> Result<VenvReq, ParseError> {
    let venv_base_path = value
        .get("venv_base_path")
        .ok_or_else(|| ParseError::MissingKey("venv_base_path".to_string()))
        .and_then(|v| v.clone().try_into::<String>().map_err(|e| e.into()))?;
    let venv_base_path = to_posix(&normalize(Path::new(&venv_base_path)));

    let reqs = match value.get("reqs") {
        None => vec![],
        Some(Value::Array(reqs)) => reqs
            .iter()
            .map(|req| {
                req.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ParseError::ReqsNotSequence(venv_base_path.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(ParseError::ReqsNotSequence(venv_base_path)),
    };

    Ok(VenvReq {
        venv_base_path,
        reqs,
    })
}

/// Finds the project `pyproject.toml` and maps venvs to their requirement files.
#[derive(Debug, Clone)]
pub struct VenvMapLoader {
    project_base: PathBuf,
    venv_map: VenvMap,
}

impl VenvMapLoader {
    /// `start` is a folder within the project or the config file itself.
    pub fn new(start: &Path) -> Result<VenvMapLoader, VenvError> {
        let pyproject_toml = find_pyproject_toml(start)
            .ok_or_else(|| VenvError::ProjectNotFound(start.to_path_buf()))?;
        let venv_map = VenvMap::from_file(&pyproject_toml).map_err(|source| VenvError::Parse {
            path: pyproject_toml.clone(),
            source,
        })?;
        let project_base = pyproject_toml
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| VenvError::ProjectNotFound(start.to_path_buf()))?;

        Ok(VenvMapLoader {
            project_base,
            venv_map,
        })
    }

    pub fn project_base(&self) -> &Path {
        &self.project_base
    }

    pub fn venv_relpaths(&self) -> Vec<String> {
        self.venv_map
            .venvs
            .iter()
            .map(|venv| venv.venv_base_path.clone())
            .collect()
    }

    /// The venv key for `venv`. Absolute paths are made relative to the project base.
    pub fn venv_relpath(&self, venv: &Path) -> String {
        let relpath = if venv.is_absolute() {
            relative_to(venv, &self.project_base).unwrap_or_else(|| venv.to_path_buf())
        } else {
            normalize(venv)
        };
        to_posix(&relpath)
    }

    /// Absolute paths of one venv's requirement files with `suffix_last` appended.
    pub fn get_reqs(&self, venv: &Path, suffix_last: &str) -> Result<Vec<PathBuf>, VenvError> {
        let venv_relpath = self.venv_relpath(venv);
        let venv_req = self
            .venv_map
            .get(&venv_relpath)
            .ok_or_else(|| VenvError::VenvNotFound(venv_relpath.clone()))?;

        let venv_abspath = self.project_base.join(&venv_req.venv_base_path);
        if !venv_abspath.is_dir() {
            return Err(VenvError::NotADirectory(venv_abspath));
        }

        venv_req
            .reqs
            .iter()
            .map(|req| {
                let path = with_stage_suffix(&self.project_base.join(req), suffix_last);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(VenvError::MissingRequirementsFile {
                        venv: venv_relpath.clone(),
                        path,
                    })
                }
            })
            .collect()
    }

    /// Selected venv, or every venv when `venv` is `None`.
    pub fn selected(&self, venv: Option<&Path>) -> Vec<String> {
        match venv {
            Some(venv) => vec![self.venv_relpath(venv)],
            None => self.venv_relpaths(),
        }
    }
}
