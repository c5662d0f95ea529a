use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, error};

use crate::{compile::CompileError, fixing::FixReport, loader::LoaderStrategy, Wreck, WreckError};

/// Which parts of a [`FixReport`] are printed.
#[derive(Debug, Clone, Copy)]
pub struct ShowResults {
    pub unresolvables: bool,
    pub fixed: bool,
    pub resolvable_shared: bool,
}

/// Handler to unlock command
pub fn do_unlock(root: &Path, venv: Option<&Path>) -> Result<Vec<PathBuf>, WreckError> {
    let wreck = Wreck::builder().root(root).try_build()?;
    let written = wreck.unlock(venv)?;
    for path in &written {
        println!("{}", path.display());
    }
    Ok(written)
}

/// Handler to fix command
/// 1 - Compiles .lock files with pip-compile
/// 2 - Writes .unlock files
/// 3 - Fixes locked versions differing between .lock files of a venv
pub fn do_fix(
    root: &Path,
    venv: Option<&Path>,
    timeout: Option<u64>,
    loader: LoaderStrategy,
    show: ShowResults,
) -> Result<FixReport, WreckError> {
    let mut builder = Wreck::builder().root(root).loader_strategy(loader);
    if let Some(timeout) = timeout {
        builder = builder.compile_timeout(Duration::from_secs(timeout));
    }
    let wreck = builder.try_build()?;

    let mut outcome = wreck.lock(venv)?;
    debug!("Compiled {} .lock files", outcome.compiled.len());
    if let Some(index) = outcome
        .failures
        .iter()
        .position(|failure| matches!(failure, CompileError::Timeout(_)))
    {
        return Err(outcome.failures.swap_remove(index).into());
    }
    if !outcome.failures.is_empty() {
        for failure in &outcome.failures {
            error!("{}", failure);
        }
        return Err(WreckError::CompileFailures(outcome.failures.len()));
    }

    let report = wreck.fix(venv)?;

    let venv_relpaths = match venv {
        Some(venv) => vec![wreck.venv_relpath(venv)],
        None => wreck.venv_relpaths(),
    };
    let mut stderr = std::io::stderr().lock();
    for venv_relpath in &venv_relpaths {
        present_results(&mut stderr, venv_relpath, &report, show)?;
    }
    Ok(report)
}

/// Writes the issues of one venv, grouped by kind.
pub fn present_results(
    out: &mut impl Write,
    venv_relpath: &str,
    report: &FixReport,
    show: ShowResults,
) -> std::io::Result<()> {
    let unresolvables: Vec<_> = report
        .unresolvables
        .iter()
        .filter(|issue| issue.venv_path == venv_relpath)
        .collect();
    if show.unresolvables && !unresolvables.is_empty() {
        writeln!(out, "Unresolvables ({venv_relpath})")?;
        for issue in unresolvables {
            writeln!(out, "{issue}")?;
        }
        writeln!(out)?;
    }

    let fixed: Vec<_> = report
        .fixed
        .iter()
        .filter(|issue| issue.venv_path == venv_relpath)
        .collect();
    if show.fixed && !fixed.is_empty() {
        writeln!(out, "Fixed ({venv_relpath})")?;
        for issue in fixed {
            writeln!(out, "{issue}")?;
        }
        writeln!(out)?;
    }

    let resolvable_shared: Vec<_> = report
        .resolvable_shared
        .iter()
        .filter(|issue| issue.venv_path == venv_relpath)
        .collect();
    if show.resolvable_shared && !resolvable_shared.is_empty() {
        writeln!(out, "Resolvable shared ({venv_relpath})")?;
        for issue in resolvable_shared {
            writeln!(out, "{issue}")?;
        }
        writeln!(out)?;
    }

    Ok(())
}
