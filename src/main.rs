//! homestead - resilient installer for a Matrix homeserver
//!
//! Drives a fresh Debian or Ubuntu host through an ordered plan of fallible steps:
//! retries transient failures, waits out package-manager locks, polls services until they
//! answer, and falls back to an interactive troubleshooting menu when a wait stalls.

use clap::Parser;
use miette::Diagnostic;

mod cli;
mod clock;
mod commands;
mod config;
mod contention;
mod context;
mod deploy;
mod error;
mod health;
mod logging;
mod operator;
mod plan;
mod progress;
mod retry;
mod runner;
mod troubleshoot;

#[cfg(test)]
mod test_support;

use cli::{Cli, Commands};
use error::DeployError;

fn report(err: &DeployError) {
    let red = console::Style::new().red().bold();
    eprintln!("{} {err}", red.apply_to("Error:"));
    if let Some(help) = err.help() {
        eprintln!("  help: {help}");
    }
    let diagnostics = err.diagnostics();
    if !diagnostics.is_empty() {
        eprintln!();
        eprintln!("Diagnostics:");
        for line in diagnostics {
            eprintln!("  {line}");
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let _logging = match logging::init_logging(cli.verbose, cli.log_file.as_deref()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Warning: {e}");
            None
        }
    };
    let interactive = commands::helpers::is_interactive(cli.non_interactive);

    let result = match &cli.command {
        Commands::Install(args) => commands::install::run(args, interactive),
        Commands::Run(args) => commands::run::run(args, interactive),
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Diagnose(args) => commands::diagnose::run(args, interactive),
        Commands::Version => commands::version::run(),
        Commands::Completions(args) => commands::completions::run(args),
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(e.exit_code());
    }
}
