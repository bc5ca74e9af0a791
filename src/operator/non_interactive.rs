//! Operator stand-in for unattended runs

use tracing::info;

use super::{ContentionChoice, MenuChoice, Operator};
use crate::error::Result;

/// Keeps waiting and never confirms anything destructive
#[derive(Debug, Default)]
pub struct NonInteractiveOperator;

impl Operator for NonInteractiveOperator {
    fn choose_recovery(&mut self, subject: &str) -> Result<MenuChoice> {
        info!(subject, "no operator attached; continuing to wait");
        Ok(MenuChoice::Continue)
    }

    fn choose_contention(&mut self, resource: &str, blockers: &str) -> Result<ContentionChoice> {
        info!(resource, blockers, "no operator attached; continuing to wait");
        Ok(ContentionChoice::Wait)
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        info!(question, "no operator attached; declining");
        Ok(false)
    }

    fn show(&mut self, title: &str, body: &str) {
        eprintln!("{title}");
        for line in body.lines() {
            eprintln!("  {line}");
        }
    }
}
