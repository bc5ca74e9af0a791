//! Plan command: lists steps without running them

use console::Style;

use crate::cli::PlanArgs;
use crate::config::DeployConfig;
use crate::deploy;
use crate::error::Result;
use crate::plan::{PlanFile, Sequencer, StepOutline};

pub fn run(args: &PlanArgs) -> Result<()> {
    let outline = outline(args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outline)?);
    } else {
        print!("{}", render(&outline));
    }
    Ok(())
}

pub fn outline(args: &PlanArgs) -> Result<Vec<StepOutline>> {
    let mut config = DeployConfig::load_or_default(args.config.as_deref())?;
    if let Some(domain) = &args.domain {
        config.domain.clone_from(domain);
    }
    let steps = match &args.file {
        Some(path) => PlanFile::load(path)?.into_steps(&config.timing())?,
        None => {
            if config.domain.is_empty() {
                config.domain = "<domain>".to_string();
            }
            deploy::plan::steps(&config, &deploy::Secrets::generate())
        }
    };
    Ok(Sequencer::new(steps).outline())
}

fn render(outline: &[StepOutline]) -> String {
    let label = Style::new().bold();
    let category = Style::new().cyan();
    let detail = Style::new().dim();
    let mut out = String::new();
    for row in outline {
        out.push_str(&format!(
            "{:>2}. {} {}\n    {}\n",
            row.ordinal,
            label.apply_to(&row.label),
            category.apply_to(format!("[{}]", row.category)),
            detail.apply_to(&row.detail)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_in_outline() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("deploy.yaml");
        std::fs::write(&config, "domain: matrix.example.org\n").unwrap();
        let args = PlanArgs {
            file: None,
            config: Some(config),
            domain: None,
            json: false,
        };

        let outline = outline(&args).unwrap();

        assert_eq!(outline.len(), 12);
        assert_eq!(outline[0].label, "Preflight checks");
        assert!(
            outline[11]
                .detail
                .contains("https://matrix.example.org/_matrix/client/versions")
        );
        let text = render(&outline);
        assert!(text.contains("12. "));
    }

    #[test]
    fn test_outline_serializes_categories() {
        let dir = tempfile::tempdir().unwrap();
        let plan = dir.path().join("plan.yaml");
        std::fs::write(
            &plan,
            "steps:\n  - label: Update\n    kind: lock_guarded\n    command: apt-get update\n",
        )
        .unwrap();
        let config = dir.path().join("deploy.yaml");
        std::fs::write(&config, "{}\n").unwrap();
        let args = PlanArgs {
            file: Some(plan),
            config: Some(config),
            domain: None,
            json: true,
        };

        let json = serde_json::to_value(outline(&args).unwrap()).unwrap();

        assert_eq!(json[0]["category"], "lock_guarded");
        assert_eq!(json[0]["status"], "pending");
        assert_eq!(json[0]["ordinal"], 1);
    }
}
