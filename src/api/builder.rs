use std::{env, path::PathBuf, time::Duration};

use crate::{
    compile::{DEFAULT_COMPILE_PROGRAM, DEFAULT_COMPILE_TIMEOUT},
    config::WreckConfig,
    loader::LoaderStrategy,
    model::venvs::VenvMapLoader,
    Wreck, WreckError,
};

#[derive(Default)]
pub struct WreckBuilder {
    root: Option<PathBuf>,
    compile_timeout: Option<Duration>,
    compile_program: Option<PathBuf>,
    loader_strategy: Option<LoaderStrategy>,
}

impl WreckBuilder {
    /// Folder within the project, or the `pyproject.toml` itself.
    /// The project base is found by reverse search from here.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Time allowed for each `pip-compile` run.
    ///
    /// Defaults to `WRECK_COMPILE_TIMEOUT`, otherwise 15 seconds.
    pub fn compile_timeout(mut self, timeout: Duration) -> Self {
        self.compile_timeout = Some(timeout);
        self
    }

    /// Path of the `pip-compile` executable.
    ///
    /// Defaults to `WRECK_COMPILE_PROGRAM`, otherwise `pip-compile` on `PATH`.
    pub fn compile_program(mut self, path: impl Into<PathBuf>) -> Self {
        self.compile_program = Some(path.into());
        self
    }

    /// How pins are read from compiled requirement files.
    pub fn loader_strategy(mut self, strategy: LoaderStrategy) -> Self {
        self.loader_strategy = Some(strategy);
        self
    }

    pub fn try_build(self) -> Result<Wreck, WreckError> {
        let Self {
            root,
            compile_timeout,
            compile_program,
            loader_strategy,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir().map_err(anyhow::Error::from)?,
        };
        let root = if root.is_absolute() {
            root
        } else {
            env::current_dir().map_err(anyhow::Error::from)?.join(root)
        };

        let config = WreckConfig::load()?;

        let compile_timeout = compile_timeout
            .or(config.compile_timeout)
            .unwrap_or(DEFAULT_COMPILE_TIMEOUT);
        let compile_program = compile_program
            .or(config.compile_program)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COMPILE_PROGRAM));

        let loader = VenvMapLoader::new(&root)?;

        Ok(Wreck {
            loader,
            compile_timeout,
            compile_program,
            loader_strategy: loader_strategy.unwrap_or_default(),
        })
    }
}
