use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use log::{debug, info, warn};
use thiserror::Error;
use tokio::{process::Command, runtime::Runtime};

use crate::{
    infile::{parse_line, InFiles, InFilesError, Line},
    model::venvs::{VenvError, VenvMapLoader},
    paths::{is_shared_pin, relative_to, replace_last_suffix, SUFFIX_IN, SUFFIX_LOCKED},
};

pub const DEFAULT_COMPILE_PROGRAM: &str = "pip-compile";
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Venv(#[from] VenvError),
    #[error(transparent)]
    InFiles(#[from] InFilesError),
    #[error("pip-tools is required to lock package dependencies. Install it. Program not found: {0}")]
    ProgramNotFound(PathBuf),
    #[error("IO error on {path}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not start the async runtime: {0}")]
    Runtime(std::io::Error),
    #[error("Timeout while compiling {0}. Check web connection")]
    Timeout(PathBuf),
    #[error("Compiling {in_path} failed with status {status:?}: {stderr}")]
    Failed {
        in_path: PathBuf,
        status: Option<i32>,
        stderr: String,
    },
}

impl CompileError {
    /// Failures of a single file. Everything else aborts the whole stage.
    fn is_per_file(&self) -> bool {
        matches!(self, CompileError::Timeout(_) | CompileError::Failed { .. })
    }
}

/// Result of the lock stage. `failures` only holds per-file failures.
#[derive(Debug, Default)]
pub struct CompileOutcome {
    pub compiled: Vec<PathBuf>,
    pub failures: Vec<CompileError>,
}

impl CompileOutcome {
    pub fn is_timeout(&self) -> bool {
        self.failures
            .iter()
            .any(|failure| matches!(failure, CompileError::Timeout(_)))
    }
}

/// Turns one `.in` file into one `.lock` file.
///
/// `in_path` and `out_path` are relative to `cwd`.
pub trait RequirementsCompiler {
    fn compile(
        &self,
        cwd: &Path,
        in_path: &Path,
        out_path: &Path,
        timeout: Duration,
    ) -> Result<(), CompileError>;
}

/// Runs `pip-compile`, or a drop-in replacement, under a timeout.
pub struct PipCompile {
    program: PathBuf,
    runtime: Runtime,
}

impl PipCompile {
    pub fn new(program: impl Into<PathBuf>) -> Result<PipCompile, CompileError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(CompileError::Runtime)?;
        Ok(PipCompile {
            program: program.into(),
            runtime,
        })
    }
}

impl RequirementsCompiler for PipCompile {
    fn compile(
        &self,
        cwd: &Path,
        in_path: &Path,
        out_path: &Path,
        timeout: Duration,
    ) -> Result<(), CompileError> {
        let mut command = Command::new(&self.program);
        command
            .current_dir(cwd)
            .args(["--allow-unsafe", "--no-header", "--resolver=backtracking"])
            .arg("-o")
            .arg(out_path)
            .arg(in_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("Running {:?}", command.as_std());

        self.runtime.block_on(async {
            let child = command.spawn().map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => CompileError::ProgramNotFound(self.program.clone()),
                _ => CompileError::IO {
                    path: self.program.clone(),
                    source,
                },
            })?;

            match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Err(_) => Err(CompileError::Timeout(in_path.to_path_buf())),
                Ok(Err(source)) => Err(CompileError::IO {
                    path: self.program.clone(),
                    source,
                }),
                Ok(Ok(output)) if output.status.success() => Ok(()),
                Ok(Ok(output)) => Err(CompileError::Failed {
                    in_path: in_path.to_path_buf(),
                    status: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                }),
            }
        })
    }
}

/// Writes the `.unlock` files of the selected venv, or of every venv.
/// Returns the written paths, each once.
pub fn unlock_compile(
    loader: &VenvMapLoader,
    venv: Option<&Path>,
) -> Result<Vec<PathBuf>, CompileError> {
    let mut written = Vec::new();
    for venv_relpath in loader.selected(venv) {
        let in_files = resolved_in_files(loader, &venv_relpath)?;
        for path in in_files.write() {
            let path = path?;
            if !written.contains(&path) {
                written.push(path);
            }
        }
    }
    Ok(written)
}

/// Compiles every `.in` file of the selected venv, or of every venv, into a
/// `.lock` file. Missing support files abort before the resolver runs.
pub fn lock_compile(
    loader: &VenvMapLoader,
    venv: Option<&Path>,
    compiler: &dyn RequirementsCompiler,
    timeout: Duration,
) -> Result<CompileOutcome, CompileError> {
    let project_base = loader.project_base();
    let mut seen = BTreeSet::new();
    let mut outcome = CompileOutcome::default();

    for venv_relpath in loader.selected(venv) {
        resolved_in_files(loader, &venv_relpath)?;

        for path_in in loader.get_reqs(Path::new(&venv_relpath), SUFFIX_IN)? {
            if !seen.insert(path_in.clone()) {
                continue;
            }
            let file_name = path_in
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if is_shared_pin(&file_name) {
                continue;
            }

            let path_out = replace_last_suffix(&path_in, SUFFIX_LOCKED);
            if empty_in_empty_out(&path_in, &path_out)? {
                info!("Empty {}, wrote empty {}", path_in.display(), path_out.display());
                outcome.compiled.push(path_out);
                continue;
            }

            let in_relpath = relative_to(&path_in, project_base).unwrap_or_else(|| path_in.clone());
            let out_relpath =
                relative_to(&path_out, project_base).unwrap_or_else(|| path_out.clone());
            match compiler.compile(project_base, &in_relpath, &out_relpath, timeout) {
                Ok(()) => {
                    abspath_to_relpath(&path_out, project_base)?;
                    info!("Compiled {}", path_out.display());
                    outcome.compiled.push(path_out);
                }
                Err(err) if err.is_per_file() => {
                    warn!("{}", err);
                    outcome.failures.push(err);
                }
                Err(err) => return Err(err),
            }
        }
    }
    Ok(outcome)
}

fn resolved_in_files(loader: &VenvMapLoader, venv_relpath: &str) -> Result<InFiles, CompileError> {
    let in_paths = loader.get_reqs(Path::new(venv_relpath), SUFFIX_IN)?;
    let mut in_files = InFiles::new(loader.project_base(), &in_paths)?;
    in_files.resolution_loop()?;
    Ok(in_files)
}

/// pip-compile turns an empty `.in` into a one byte `.lock`. Write zero bytes
/// instead and skip the resolver.
fn empty_in_empty_out(path_in: &Path, path_out: &Path) -> Result<bool, CompileError> {
    let contents = std::fs::read_to_string(path_in).map_err(|source| CompileError::IO {
        path: path_in.to_path_buf(),
        source,
    })?;
    let is_empty = contents
        .lines()
        .all(|line| matches!(parse_line(line), Line::Ignorable));
    if is_empty {
        std::fs::write(path_out, "").map_err(|source| CompileError::IO {
            path: path_out.to_path_buf(),
            source,
        })?;
    }
    Ok(is_empty)
}

/// Strips the project base from paths in resolver output, e.g. `# via -r /abs/requirements/prod.in`.
fn abspath_to_relpath(path: &Path, project_base: &Path) -> Result<(), CompileError> {
    let to_io_error = |source| CompileError::IO {
        path: path.to_path_buf(),
        source,
    };
    let contents = std::fs::read_to_string(path).map_err(to_io_error)?;
    let prefix = format!("{}{}", project_base.display(), std::path::MAIN_SEPARATOR);
    if contents.contains(&prefix) {
        std::fs::write(path, contents.replace(&prefix, "")).map_err(to_io_error)?;
    }
    Ok(())
}
