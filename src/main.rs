//! jointfile: diagnostic CLI over the joinable file manager.
//!
//! Parses arguments, installs logging, loads the manager configuration,
//! dispatches to the command handler, and maps errors to exit codes.

mod cli;
mod commands;

use cli::Cli;
use jointfile::{ManagerConfig, Result, exit_codes};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let result = load_config(cli.config.as_deref())
        .and_then(|config| commands::dispatch(cli.command, config));

    match result {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

/// Log to stderr. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "jointfile=debug,info",
            _ => "jointfile=trace,debug",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ManagerConfig> {
    match path {
        Some(path) => ManagerConfig::load(path),
        None => Ok(ManagerConfig::default()),
    }
}
