//! Diagnose command: the troubleshooting menu outside of a run

use crate::cli::DiagnoseArgs;
use crate::config::DeployConfig;
use crate::deploy;
use crate::error::Result;
use crate::runner::CommandSpec;
use crate::troubleshoot::{MenuState, TroubleshootingMenu};

use super::helpers;

pub fn run(args: &DiagnoseArgs, interactive: bool) -> Result<()> {
    let mut config = DeployConfig::load_or_default(args.config.as_deref())?;
    if let Some(dir) = &args.install_dir {
        config.install_dir.clone_from(dir);
    }
    let logs = CommandSpec::new("docker-compose")
        .args(["logs", "--tail=50", deploy::plan::SERVICE])
        .current_dir(&config.install_dir);
    let mut ctx = helpers::host_context(interactive).with_recovery(deploy::plan::recovery(&config));

    if interactive {
        TroubleshootingMenu::new(&args.subject, Some(logs)).run(&mut ctx)?;
        return Ok(());
    }
    // Unattended: print diagnostics and guidance, never attempt fixes
    for state in [MenuState::Diagnostics, MenuState::ManualGuidance] {
        TroubleshootingMenu::new(&args.subject, Some(logs.clone()))
            .starting_at(state)
            .advance(&mut ctx)?;
    }
    Ok(())
}
