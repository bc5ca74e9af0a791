//! Interactive progress reporter with visual progress bars

use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::busy::{BusyIndicator, DEFAULT_CADENCE};
use super::{MessageLevel, ProgressReporter, ProgressState, SharedProgress};

/// Uses indicatif bars: one determinate bar for the plan, one spinner while waiting
pub struct InteractiveProgressReporter {
    multi: MultiProgress,
    /// Main progress bar for plan steps
    step_pb: ProgressBar,
    state: SharedProgress,
    busy: Option<BusyIndicator>,
}

impl InteractiveProgressReporter {
    /// Create a new interactive progress reporter with total step count
    pub fn new(total_steps: u64) -> Self {
        let step_style = ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let multi = MultiProgress::new();
        let step_pb = multi.add(ProgressBar::new(total_steps));
        step_pb.set_style(step_style);

        Self {
            multi,
            step_pb,
            state: ProgressState::shared(usize::try_from(total_steps).unwrap_or(usize::MAX)),
            busy: None,
        }
    }

    fn spinner(&self) -> ProgressBar {
        let style = ProgressStyle::default_spinner()
            .template("  {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let spinner = self.multi.add(ProgressBar::new_spinner());
        spinner.set_style(style);
        spinner
    }
}

impl ProgressReporter for InteractiveProgressReporter {
    fn begin_step(&mut self, ordinal: usize, total: usize, label: &str) {
        let advanced = match self.state.lock() {
            Ok(mut state) => state.advance(ordinal, total),
            Err(_) => true,
        };
        if !advanced {
            return;
        }
        self.step_pb.set_length(total as u64);
        self.step_pb.set_position(ordinal.saturating_sub(1) as u64);
        self.step_pb
            .set_message(format!("({ordinal}/{total}) {label}"));
    }

    fn finish_step(&mut self, ordinal: usize, succeeded: bool) {
        if succeeded {
            self.step_pb.set_position(ordinal as u64);
        }
    }

    fn begin_wait(&mut self, message: &str) {
        if self.busy.is_some() {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            state.start_wait(message);
        }
        let spinner = self.spinner();
        self.busy = Some(BusyIndicator::start(
            spinner,
            Arc::clone(&self.state),
            DEFAULT_CADENCE,
        ));
    }

    fn end_wait(&mut self) {
        if let Some(busy) = self.busy.take() {
            busy.stop();
        }
        if let Ok(mut state) = self.state.lock() {
            state.stop_wait();
        }
    }

    fn is_waiting(&self) -> bool {
        self.busy.is_some()
    }

    fn message(&mut self, level: MessageLevel, text: &str) {
        let _ = self.multi.println(level.format(text));
    }

    fn finish(&mut self) {
        self.end_wait();
        self.step_pb.finish_with_message("done");
    }

    fn abandon(&mut self) {
        self.end_wait();
        self.step_pb.abandon();
    }
}
