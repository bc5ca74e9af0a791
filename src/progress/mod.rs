//! Progress presentation layer
//!
//! This module handles:
//! - A determinate step bar (`n/total` plus the current step label)
//! - An indeterminate busy indicator while a step blocks on a wait
//! - Operator-facing status lines that never tear the bar
//!
//! All reporting goes through the [`ProgressReporter`] trait so the orchestrator can run
//! with interactive bars, plain line output (no TTY), or silently in tests.

use console::Style;

mod busy;
mod interactive;
mod plain;
mod state;

pub use interactive::InteractiveProgressReporter;
pub use plain::{PlainProgressReporter, SilentProgressReporter};
pub use state::{ProgressState, SharedProgress};

/// Severity of an operator-facing status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    /// Milestones (`[+]`)
    Info,
    /// Sub-actions inside a step (`[*]`)
    Detail,
    /// Recoverable problems (`[!]`)
    Warning,
    /// Fatal problems (`[-]`)
    Error,
}

impl MessageLevel {
    pub fn marker(self) -> &'static str {
        match self {
            MessageLevel::Info => "[+]",
            MessageLevel::Detail => "[*]",
            MessageLevel::Warning => "[!]",
            MessageLevel::Error => "[-]",
        }
    }

    fn style(self) -> Style {
        let style = Style::new().for_stderr();
        match self {
            MessageLevel::Info => style.green(),
            MessageLevel::Detail => style.blue(),
            MessageLevel::Warning => style.yellow().bold(),
            MessageLevel::Error => style.red().bold(),
        }
    }

    /// Render `text` with the colored marker for this level
    pub fn format(self, text: &str) -> String {
        format!("{} {}", self.style().apply_to(self.marker()), text)
    }
}

/// Progress reporter for the step sequence
///
/// Exactly one component writes through the reporter at a time; the busy indicator is the
/// only background reader.
pub trait ProgressReporter: Send {
    /// A step starts; `ordinal` is 1-based
    fn begin_step(&mut self, ordinal: usize, total: usize, label: &str);

    /// A step reached a terminal status
    fn finish_step(&mut self, ordinal: usize, succeeded: bool);

    /// Start the indeterminate busy indicator
    fn begin_wait(&mut self, message: &str);

    /// Stop the busy indicator and wait for its thread to exit
    fn end_wait(&mut self);

    fn is_waiting(&self) -> bool;

    /// Print a status line above the bars
    fn message(&mut self, level: MessageLevel, text: &str);

    /// The whole run succeeded
    fn finish(&mut self);

    /// Abandon on error
    fn abandon(&mut self);
}

/// Pick a reporter for the current terminal
pub fn for_terminal(quiet: bool) -> Box<dyn ProgressReporter> {
    if quiet {
        Box::new(SilentProgressReporter::default())
    } else if console::Term::stderr().is_term() {
        Box::new(InteractiveProgressReporter::new(0))
    } else {
        Box::new(PlainProgressReporter::stderr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_level_markers() {
        assert_eq!(MessageLevel::Info.marker(), "[+]");
        assert_eq!(MessageLevel::Detail.marker(), "[*]");
        assert_eq!(MessageLevel::Warning.marker(), "[!]");
        assert_eq!(MessageLevel::Error.marker(), "[-]");
    }

    #[test]
    fn test_format_contains_text_and_marker() {
        let line = MessageLevel::Warning.format("retrying");
        assert!(line.contains("[!]"));
        assert!(line.ends_with("retrying"));
    }
}
