//! CLI definitions using clap derive API
//!
//! One submodule per command's argument types:
//! - install: the built-in deployment
//! - run: YAML plan files
//! - plan: plan listings
//! - diagnose: standalone troubleshooting
//! - completions: shell completions

use clap::builder::{Styles, styling::AnsiColor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod completions;
pub mod diagnose;
pub mod install;
pub mod plan;
pub mod run;

pub use completions::CompletionsArgs;
pub use diagnose::DiagnoseArgs;
pub use install::InstallArgs;
pub use plan::PlanArgs;
pub use run::RunArgs;

/// homestead - resilient installer for a Matrix homeserver with TURN and TLS
#[derive(Parser, Debug)]
#[command(
    name = "homestead",
    author,
    version,
    color = clap::ColorChoice::Always,
    styles = Styles::styled()
        .header(AnsiColor::Green.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default().bold())
        .placeholder(AnsiColor::Cyan.on_default()),
    about = "Resilient installer for a Matrix homeserver with TURN relay and TLS",
    long_about = "homestead takes a fresh Debian or Ubuntu host to a running conduwuit Matrix homeserver \
                  with a coturn relay and Let's Encrypt certificates. It retries transient failures, \
                  waits out package-manager locks and opens a troubleshooting menu when a wait stalls.",
    after_help = "\x1b[1m\x1b[32mExamples:\x1b[0m\n   \
                  homestead install                              \x1b[90m# Prompt for anything missing\x1b[0m\n   \
                  homestead install --domain matrix.example.org  \x1b[90m# Preset the domain\x1b[0m\n   \
                  homestead install --start-at 8                 \x1b[90m# Resume after a failure\x1b[0m\n   \
                  homestead plan                                 \x1b[90m# List the install steps\x1b[0m\n   \
                  homestead run maintenance.yaml                 \x1b[90m# Run a custom plan\x1b[0m\n   \
                  homestead diagnose \"service health\"            \x1b[90m# Open the recovery menu\x1b[0m\n\n\
                  "
)]
pub struct Cli {
    /// Show debug logs on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Also write debug logs to this file
    #[arg(long, global = true, value_name = "PATH", env = "HOMESTEAD_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Never prompt; keep waiting when stalled and decline destructive fixes
    #[arg(long, global = true, env = "HOMESTEAD_NON_INTERACTIVE")]
    pub non_interactive: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install conduwuit, coturn and TLS certificates on this host
    Install(InstallArgs),

    /// Run the steps of a YAML plan file
    Run(RunArgs),

    /// List the steps of the install plan or a plan file
    Plan(PlanArgs),

    /// Show diagnostics and recovery options for a stalled component
    Diagnose(DiagnoseArgs),

    /// Show version information
    #[command(hide = true)]
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}
