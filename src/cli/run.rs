use std::path::PathBuf;

use clap::Parser;

/// Arguments for the run command
#[derive(Parser, Debug)]
#[command(after_help = "EXAMPLES:\n  \
                  Run a plan file:\n    homestead run maintenance.yaml\n\n\
                  Resume a plan at its third step:\n    homestead run maintenance.yaml --start-at 3")]
pub struct RunArgs {
    /// YAML plan file
    pub plan: PathBuf,

    /// Config file whose retry, lock and health sections supply the default timings
    #[arg(long, short = 'c', value_name = "FILE", env = "HOMESTEAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip the steps before this one (1-based)
    #[arg(long, value_name = "STEP")]
    pub start_at: Option<usize>,
}
