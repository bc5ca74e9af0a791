//! Line-oriented and silent reporters for non-terminal output

use std::io::Write;

use super::{MessageLevel, ProgressReporter, ProgressState};

/// Writes one line per event; used when stderr is not a terminal
pub struct PlainProgressReporter {
    out: Box<dyn Write + Send>,
    state: ProgressState,
}

impl PlainProgressReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            state: ProgressState::new(0),
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
    }
}

impl ProgressReporter for PlainProgressReporter {
    fn begin_step(&mut self, ordinal: usize, total: usize, label: &str) {
        if self.state.advance(ordinal, total) {
            self.line(&format!("[{ordinal}/{total}] {label}"));
        }
    }

    fn finish_step(&mut self, ordinal: usize, succeeded: bool) {
        let outcome = if succeeded { "done" } else { "failed" };
        self.line(&format!("[{ordinal}/{}] {outcome}", self.state.total()));
    }

    fn begin_wait(&mut self, message: &str) {
        if !self.state.is_waiting() {
            self.state.start_wait(message);
            self.line(&format!("    {message}..."));
        }
    }

    fn end_wait(&mut self) {
        self.state.stop_wait();
    }

    fn is_waiting(&self) -> bool {
        self.state.is_waiting()
    }

    fn message(&mut self, level: MessageLevel, text: &str) {
        self.line(&level.format(text));
    }

    fn finish(&mut self) {
        self.end_wait();
    }

    fn abandon(&mut self) {
        self.end_wait();
    }
}

/// No-op reporter for quiet mode
///
/// Still tracks the wait flag so the operator hand-off logic behaves the same.
#[derive(Default)]
pub struct SilentProgressReporter {
    waiting: bool,
}

impl ProgressReporter for SilentProgressReporter {
    fn begin_step(&mut self, _ordinal: usize, _total: usize, _label: &str) {
        // No-op for silent mode
    }

    fn finish_step(&mut self, _ordinal: usize, _succeeded: bool) {
        // No-op for silent mode
    }

    fn begin_wait(&mut self, _message: &str) {
        self.waiting = true;
    }

    fn end_wait(&mut self) {
        self.waiting = false;
    }

    fn is_waiting(&self) -> bool {
        self.waiting
    }

    fn message(&mut self, _level: MessageLevel, _text: &str) {
        // No-op for silent mode
    }

    fn finish(&mut self) {
        self.waiting = false;
    }

    fn abandon(&mut self) {
        self.waiting = false;
    }
}
