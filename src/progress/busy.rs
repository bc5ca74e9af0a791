//! Background busy indicator for blocking waits
//!
//! One lightweight thread repaints a spinner at a fixed cadence from the shared
//! [`ProgressState`]. It is stopped cooperatively through a flag and joined before any
//! operator prompt, so its output never interleaves with prompt text.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use indicatif::ProgressBar;

use super::SharedProgress;

pub const DEFAULT_CADENCE: Duration = Duration::from_millis(120);

pub struct BusyIndicator {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    spinner: ProgressBar,
}

impl BusyIndicator {
    pub fn start(spinner: ProgressBar, state: SharedProgress, cadence: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_spinner = spinner.clone();

        let handle = thread::spawn(move || {
            while !thread_stop.load(Ordering::Acquire) {
                if let Ok(state) = state.lock() {
                    thread_spinner.set_message(state.wait_line());
                }
                thread_spinner.tick();
                thread::park_timeout(cadence);
            }
        });

        Self {
            stop,
            handle: Some(handle),
            spinner,
        }
    }

    /// Signal the thread, wait for it to exit, and clear the spinner line
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
        self.spinner.finish_and_clear();
    }
}

impl Drop for BusyIndicator {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressState;

    #[test]
    fn test_stop_joins_thread() {
        let state = ProgressState::shared(1);
        let spinner = ProgressBar::hidden();
        let indicator = BusyIndicator::start(spinner.clone(), state, Duration::from_millis(5));
        indicator.stop();
        assert!(spinner.is_finished());
    }

    #[test]
    fn test_spinner_message_follows_state() {
        let state = ProgressState::shared(2);
        {
            let mut guard = state.lock().unwrap();
            guard.advance(2, 2);
            guard.start_wait("waiting for health endpoint");
        }
        let spinner = ProgressBar::hidden();
        let indicator =
            BusyIndicator::start(spinner.clone(), Arc::clone(&state), Duration::from_millis(5));
        thread::sleep(Duration::from_millis(50));
        indicator.stop();
        assert!(spinner.message().contains("waiting for health endpoint"));
    }
}
