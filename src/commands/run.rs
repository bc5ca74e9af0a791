//! Run command: executes a YAML plan file

use console::Style;
use tracing::info;

use super::helpers;
use crate::cli::RunArgs;
use crate::config::DeployConfig;
use crate::error::Result;
use crate::plan::{PlanFile, Sequencer};

pub fn run(args: &RunArgs, interactive: bool) -> Result<()> {
    let config = DeployConfig::load_or_default(args.config.as_deref())?;
    let timing = config.timing();
    timing.validate()?;

    let plan = PlanFile::load(&args.plan)?;
    let name = plan
        .name
        .clone()
        .unwrap_or_else(|| args.plan.display().to_string());
    let mut sequencer = Sequencer::new(plan.into_steps(&timing)?);
    if let Some(start_at) = args.start_at {
        sequencer.skip_before(start_at)?;
    }
    info!(plan = %name, steps = sequencer.steps().len(), "running plan");

    let mut ctx = helpers::host_context(interactive)
        .with_recovery(crate::deploy::plan::recovery(&config));
    match sequencer.run(&mut ctx) {
        Ok(report) => {
            println!(
                "{} {name}: {} of {} steps in {}s",
                Style::new().green().bold().apply_to("Finished"),
                report.succeeded.len(),
                report.total,
                report.elapsed.as_secs()
            );
            Ok(())
        }
        Err(err) => {
            helpers::print_resume_hint(
                &sequencer,
                &format!("homestead run {}", args.plan.display()),
            );
            Err(err)
        }
    }
}
