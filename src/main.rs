use clap::Parser;

use wreck::{
    cli::{
        args::{CliArgs, Command},
        command_handlers::{do_fix, do_unlock, ShowResults},
    },
    WreckError,
};

fn run() -> Result<(), WreckError> {
    let cli_args: CliArgs = CliArgs::parse();

    match cli_args.cmd {
        Command::Unlock { path, venv_relpath } => {
            do_unlock(&path, venv_relpath.as_deref())?;
        }
        Command::Fix {
            path,
            venv_relpath,
            timeout,
            loader,
            show_unresolvables,
            show_fixed,
            show_resolvable_shared,
        } => {
            let show = ShowResults {
                unresolvables: show_unresolvables,
                fixed: show_fixed,
                resolvable_shared: show_resolvable_shared,
            };
            do_fix(&path, venv_relpath.as_deref(), timeout, loader, show)?;
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(e.exit_code());
    }
}
