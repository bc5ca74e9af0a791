//! Operator I/O: the human in the loop
//!
//! Prompts are small enumerated choices and yes/no confirmations. The orchestrator only
//! talks to the [`Operator`] trait; the terminal implementation uses inquire, the
//! non-interactive one answers conservatively so unattended runs never block on stdin.

use std::fmt;

use crate::error::Result;

mod non_interactive;
mod terminal;

pub use non_interactive::NonInteractiveOperator;
pub use terminal::TerminalOperator;

/// Options offered by the troubleshooting menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Continue,
    ShowDiagnostics,
    AutomaticFix,
    ManualGuidance,
    Cancel,
}

impl MenuChoice {
    pub const ALL: [MenuChoice; 5] = [
        MenuChoice::Continue,
        MenuChoice::ShowDiagnostics,
        MenuChoice::AutomaticFix,
        MenuChoice::ManualGuidance,
        MenuChoice::Cancel,
    ];
}

impl fmt::Display for MenuChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MenuChoice::Continue => "Continue waiting",
            MenuChoice::ShowDiagnostics => "Show diagnostics",
            MenuChoice::AutomaticFix => "Attempt automatic fix",
            MenuChoice::ManualGuidance => "Show manual intervention steps",
            MenuChoice::Cancel => "Cancel installation",
        };
        f.write_str(text)
    }
}

/// Options offered when a shared resource stays locked after automatic intervention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentionChoice {
    Wait,
    Force,
    Abort,
}

impl ContentionChoice {
    pub const ALL: [ContentionChoice; 3] = [
        ContentionChoice::Wait,
        ContentionChoice::Force,
        ContentionChoice::Abort,
    ];
}

impl fmt::Display for ContentionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ContentionChoice::Wait => "Keep waiting",
            ContentionChoice::Force => "Force: kill blocking processes and remove locks",
            ContentionChoice::Abort => "Abort installation",
        };
        f.write_str(text)
    }
}

pub trait Operator {
    /// Troubleshooting menu prompt for a stalled `subject`
    fn choose_recovery(&mut self, subject: &str) -> Result<MenuChoice>;

    /// `resource` is still held; `blockers` describes what holds it
    fn choose_contention(&mut self, resource: &str, blockers: &str) -> Result<ContentionChoice>;

    /// Explicit yes/no; defaults to no
    fn confirm(&mut self, question: &str) -> Result<bool>;

    /// Display a block of text (diagnostics, guidance)
    fn show(&mut self, title: &str, body: &str);
}
