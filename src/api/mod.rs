use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;

use crate::{
    compile::{lock_compile, unlock_compile, CompileError, CompileOutcome, PipCompile},
    fixing::{fix_requirements_lock, FixError, FixReport},
    infile::InFilesError,
    loader::{LoaderError, LoaderStrategy},
    model::{
        venvs::{VenvError, VenvMapLoader},
        ParseError,
    },
};

mod builder;

pub use builder::WreckBuilder;

#[derive(Error, Debug)]
pub enum WreckError {
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
    #[error(transparent)]
    Venv(#[from] VenvError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Fix(#[from] FixError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("Failed to compile {0} requirements file(s)")]
    CompileFailures(usize),
    #[error("Failed to write results: {0}")]
    Output(#[from] std::io::Error),
}

impl WreckError {
    /// Process exit code of the `reqs` binary for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            WreckError::Config(_) => 2,
            WreckError::CompileFailures(_) | WreckError::Output(_) => 1,
            WreckError::Venv(err) => venv_exit_code(err),
            WreckError::Loader(err) => loader_exit_code(err),
            WreckError::Compile(err) => compile_exit_code(err),
            WreckError::Fix(FixError::Compile(err)) => compile_exit_code(err),
            WreckError::Fix(FixError::Loader(err)) => loader_exit_code(err),
            WreckError::Fix(FixError::IO { .. }) => 1,
        }
    }
}

fn venv_exit_code(err: &VenvError) -> i32 {
    match err {
        VenvError::ProjectNotFound(_) => 3,
        VenvError::Parse {
            source: ParseError::ReqsNotSequence(_),
            ..
        } => 8,
        VenvError::Parse { .. } => 4,
        VenvError::MissingRequirementsFile { .. } => 6,
        VenvError::NotADirectory(_) => 7,
        VenvError::VenvNotFound(_) => 9,
    }
}

fn loader_exit_code(err: &LoaderError) -> i32 {
    match err {
        LoaderError::Venv(err) => venv_exit_code(err),
        LoaderError::Pin { .. } => 6,
        LoaderError::UnknownStrategy(_) => 2,
    }
}

fn compile_exit_code(err: &CompileError) -> i32 {
    match err {
        CompileError::Venv(err) => venv_exit_code(err),
        CompileError::InFiles(InFilesError::MissingSupportFiles(_)) => 6,
        CompileError::ProgramNotFound(_) => 5,
        CompileError::Timeout(_) => 10,
        _ => 1,
    }
}

/// Entry point for the unlock, lock and fix stages of one project.
pub struct Wreck {
    loader: VenvMapLoader,
    compile_timeout: Duration,
    compile_program: PathBuf,
    loader_strategy: LoaderStrategy,
}

impl Wreck {
    pub fn builder() -> WreckBuilder {
        WreckBuilder::default()
    }

    pub fn project_base(&self) -> &Path {
        self.loader.project_base()
    }

    /// Venv keys in `pyproject.toml` order.
    pub fn venv_relpaths(&self) -> Vec<String> {
        self.loader.venv_relpaths()
    }

    /// Venv key of `venv`, relative to the project base.
    pub fn venv_relpath(&self, venv: &Path) -> String {
        self.loader.venv_relpath(venv)
    }

    /// Flattens `.in` files into `.unlock` files. `None` means every venv.
    pub fn unlock(&self, venv: Option<&Path>) -> Result<Vec<PathBuf>, WreckError> {
        Ok(unlock_compile(&self.loader, venv)?)
    }

    /// Compiles `.in` files into `.lock` files with the external resolver.
    pub fn lock(&self, venv: Option<&Path>) -> Result<CompileOutcome, WreckError> {
        let compiler = PipCompile::new(&self.compile_program)?;
        Ok(lock_compile(
            &self.loader,
            venv,
            &compiler,
            self.compile_timeout,
        )?)
    }

    /// Reconciles locked versions between the `.lock` files of each venv.
    pub fn fix(&self, venv: Option<&Path>) -> Result<FixReport, WreckError> {
        Ok(fix_requirements_lock(
            &self.loader,
            venv,
            self.loader_strategy,
        )?)
    }
}
