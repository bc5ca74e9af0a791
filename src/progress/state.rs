//! Shared progress state read by the busy indicator

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Process-wide progress of the current run
#[derive(Debug, Clone)]
pub struct ProgressState {
    current: usize,
    total: usize,
    waiting: bool,
    wait_message: String,
    wait_started: Option<Instant>,
}

pub type SharedProgress = Arc<Mutex<ProgressState>>;

impl ProgressState {
    pub fn new(total: usize) -> Self {
        Self {
            current: 0,
            total,
            waiting: false,
            wait_message: String::new(),
            wait_started: None,
        }
    }

    pub fn shared(total: usize) -> SharedProgress {
        Arc::new(Mutex::new(Self::new(total)))
    }

    /// Move to step `ordinal`
    ///
    /// The current step never decreases; a lower ordinal is ignored and `false` returned.
    pub fn advance(&mut self, ordinal: usize, total: usize) -> bool {
        if ordinal < self.current {
            return false;
        }
        self.current = ordinal;
        self.total = total.max(ordinal);
        true
    }

    pub fn start_wait(&mut self, message: &str) {
        self.waiting = true;
        self.wait_message = message.to_string();
        self.wait_started = Some(Instant::now());
    }

    pub fn stop_wait(&mut self) {
        self.waiting = false;
        self.wait_started = None;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Status line painted by the busy indicator
    pub fn wait_line(&self) -> String {
        let waited = self.wait_started.map(|s| s.elapsed()).unwrap_or_default();
        format!(
            "({}/{}) {} [{}s]",
            self.current,
            self.total,
            self.wait_message,
            waited.as_secs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_monotonic() {
        let mut state = ProgressState::new(3);
        assert!(state.advance(1, 3));
        assert!(state.advance(2, 3));
        assert!(!state.advance(1, 3));
        assert!(state.wait_line().starts_with("(2/3)"));
    }

    #[test]
    fn test_total_never_below_current() {
        let mut state = ProgressState::new(0);
        state.advance(4, 2);
        assert_eq!(state.total(), 4);
    }

    #[test]
    fn test_wait_flag() {
        let mut state = ProgressState::new(2);
        state.advance(1, 2);
        state.start_wait("waiting for service health");
        assert!(state.is_waiting());
        assert!(state.wait_line().starts_with("(1/2) waiting for service health"));
        state.stop_wait();
        assert!(!state.is_waiting());
    }
}
