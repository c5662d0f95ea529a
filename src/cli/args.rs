use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::loader::LoaderStrategy;

/// Manages the requirement files of a Python project's venvs.
#[derive(Debug, Parser)]
#[clap(name = "reqs", version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Parser)]
pub enum Command {
    ///Creates .unlock files from .in files, flattening -c and -r constraints
    Unlock {
        /// Folder within the project or the pyproject.toml file
        #[clap(short, long, default_value = ".")]
        path: PathBuf,
        /// Venv relative path as in [[tool.venvs]]. Defaults to every venv
        #[clap(short = 'v', long = "venv-relpath")]
        venv_relpath: Option<PathBuf>,
    },
    ///Creates .lock files with pip-compile then fixes versions differing between them
    Fix {
        /// Folder within the project or the pyproject.toml file
        #[clap(short, long, default_value = ".")]
        path: PathBuf,
        /// Venv relative path as in [[tool.venvs]]. Defaults to every venv
        #[clap(short = 'v', long = "venv-relpath")]
        venv_relpath: Option<PathBuf>,
        /// Web connection time out in seconds, per compiled file
        #[clap(short, long)]
        timeout: Option<u64>,
        /// How pins are read from compiled files, `single-pass` or `per-entry`
        #[clap(long, default_value = "single-pass")]
        loader: LoaderStrategy,
        /// Hide unresolvable dependency conflicts. These need manual intervention
        #[clap(long = "hide-unresolvables", action = ArgAction::SetFalse)]
        show_unresolvables: bool,
        /// Hide fixed dependency issues
        #[clap(long = "hide-fixed", action = ArgAction::SetFalse)]
        show_fixed: bool,
        /// Hide resolvable issues within .shared files, which are left as is
        #[clap(long = "hide-resolvable-shared", action = ArgAction::SetFalse)]
        show_resolvable_shared: bool,
    },
}
