use std::path::PathBuf;

use clap::Parser;

/// Arguments for the plan command
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Plan file to list instead of the built-in install plan
    pub file: Option<PathBuf>,

    /// Config file used to fill in domains and timings
    #[arg(long, short = 'c', value_name = "FILE", env = "HOMESTEAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Domain shown in the built-in plan
    #[arg(long, env = "HOMESTEAD_DOMAIN")]
    pub domain: Option<String>,

    /// Print the steps as JSON
    #[arg(long)]
    pub json: bool,
}
