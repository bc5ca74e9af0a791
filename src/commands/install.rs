//! Install command: the built-in deployment plan

use tracing::info;

use super::helpers;
use crate::cli::InstallArgs;
use crate::config::DeployConfig;
use crate::deploy::{self, InputOptions, Summary};
use crate::error::Result;
use crate::plan::Sequencer;

/// Environment variable holding the admin password
pub const PASSWORD_ENV: &str = "HOMESTEAD_ADMIN_PASSWORD";

pub fn run(args: &InstallArgs, interactive: bool) -> Result<()> {
    let mut config = resolve_config(args, admin_password_from_env())?;
    deploy::input::complete(
        &mut config,
        InputOptions {
            interactive,
            assume_yes: args.yes,
        },
    )?;
    config.validate()?;
    info!(domain = %config.domain, install_dir = %config.install_dir.display(), "starting install");

    let plan = deploy::build(&config);
    let mut sequencer = Sequencer::new(plan.steps);
    if let Some(start_at) = args.start_at {
        sequencer.skip_before(start_at)?;
    }

    let mut ctx = helpers::host_context(interactive).with_recovery(plan.recovery);
    match sequencer.run(&mut ctx) {
        Ok(report) => {
            Summary::new(&config, &plan.secrets, report.elapsed).print();
            Ok(())
        }
        Err(err) => {
            helpers::print_resume_hint(&sequencer, "homestead install");
            Err(err)
        }
    }
}

/// The admin password is never a flag; an empty variable counts as unset
pub fn admin_password_from_env() -> Option<String> {
    std::env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty())
}

/// Defaults, then the config file, then flags and environment
pub fn resolve_config(args: &InstallArgs, admin_password: Option<String>) -> Result<DeployConfig> {
    let mut config = DeployConfig::load_or_default(args.config.as_deref())?;
    config.apply(args.overrides(admin_password));
    Ok(config)
}
