use std::path::PathBuf;

use clap::Parser;

/// Arguments for the diagnose command
#[derive(Parser, Debug)]
#[command(after_help = "SUBJECTS:\n  \
                  package manager, docker daemon, snap daemon, service health, admin account, \
                  public reachability")]
pub struct DiagnoseArgs {
    /// What is misbehaving; picks the fix routine and guidance
    #[arg(default_value = "service health")]
    pub subject: String,

    /// Directory of the compose project
    #[arg(long, value_name = "DIR", env = "HOMESTEAD_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,

    /// Config file supplying the install directory and domains
    #[arg(long, short = 'c', value_name = "FILE", env = "HOMESTEAD_CONFIG")]
    pub config: Option<PathBuf>,
}
