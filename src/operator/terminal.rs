//! Interactive operator prompts using inquire

use console::Style;
use inquire::{Confirm, Select};

use super::{ContentionChoice, MenuChoice, Operator};
use crate::error::{DeployError, Result};

#[derive(Debug, Default)]
pub struct TerminalOperator;

impl Operator for TerminalOperator {
    fn choose_recovery(&mut self, subject: &str) -> Result<MenuChoice> {
        println!();
        let Some(choice) = Select::new(
            &format!("{subject} is taking longer than expected. What would you like to do?"),
            MenuChoice::ALL.to_vec(),
        )
        .with_starting_cursor(0)
        .without_filtering()
        .with_help_message("↑↓ to move, ENTER to select, ESC to keep waiting")
        .prompt_skippable()?
        else {
            return Ok(MenuChoice::Continue);
        };

        Ok(choice)
    }

    fn choose_contention(&mut self, resource: &str, blockers: &str) -> Result<ContentionChoice> {
        println!();
        println!(
            "{} The {resource} is still locked by: {blockers}",
            Style::new().yellow().bold().apply_to("[!]")
        );
        let Some(choice) = Select::new(
            "Automatic recovery did not free it. How should we proceed?",
            ContentionChoice::ALL.to_vec(),
        )
        .with_starting_cursor(0)
        .without_filtering()
        .with_help_message("↑↓ to move, ENTER to select, ESC to keep waiting")
        .prompt_skippable()?
        else {
            return Ok(ContentionChoice::Wait);
        };

        Ok(choice)
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        Confirm::new(question)
            .with_default(false)
            .with_help_message("Type 'y' to confirm, press Enter to decline")
            .prompt()
            .map_err(|e| DeployError::PromptFailed {
                message: format!("Failed to read confirmation: {e}"),
            })
    }

    fn show(&mut self, title: &str, body: &str) {
        println!();
        println!("{}", Style::new().bold().underlined().apply_to(title));
        if body.trim().is_empty() {
            println!("  (no output)");
        } else {
            for line in body.lines() {
                println!("  {line}");
            }
        }
        println!();
    }
}
