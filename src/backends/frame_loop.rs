// SPDX-License-Identifier: GPL-3.0-only
//! Capture thread lifecycle
//!
//! Sensor backends that receive frames asynchronously run a [`CaptureLoop`]
//! that feeds a [`FrameSlot`](super::sensor::FrameSlot). The keyboard
//! pipeline itself stays on the caller's thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::errors::SensorError;

/// Returned by a loop step to keep going or finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Handle to a capture thread; stops and joins it on drop
pub struct CaptureLoop {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoop {
    /// Run `step` repeatedly on a new thread until it returns
    /// [`LoopAction::Stop`] or the loop is stopped
    pub fn spawn<F>(name: &str, mut step: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::spawn_with_init(name, || Ok(()), move |_: &mut ()| step())
    }

    /// Like [`CaptureLoop::spawn`] but calls `step` at most once per `period`
    ///
    /// A step that overruns the period is followed immediately by the next.
    pub fn paced<F>(name: &str, period: Duration, mut step: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::spawn_with_init(
            name,
            || Ok(Instant::now()),
            move |next_due: &mut Instant| {
                let now = Instant::now();
                if now < *next_due {
                    thread::sleep(*next_due - now);
                }
                *next_due = Instant::now() + period;
                step()
            },
        )
    }

    /// Open a resource on the capture thread, then loop over it
    ///
    /// If `init` fails the thread exits without running `step`.
    pub fn spawn_with_init<S, I, F>(name: &str, init: I, mut step: F) -> Self
    where
        S: Send + 'static,
        I: FnOnce() -> Result<S, SensorError> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, "Starting capture loop");

        let thread_handle = thread::spawn(move || {
            let mut state = match init() {
                Ok(state) => state,
                Err(e) => {
                    warn!(name = %thread_name, error = %e, "Capture loop initialization failed");
                    return;
                }
            };

            let mut iterations = 0u64;
            while !thread_stop.load(Ordering::SeqCst) {
                iterations += 1;
                if step(&mut state) == LoopAction::Stop {
                    debug!(name = %thread_name, "Loop requested stop");
                    break;
                }
            }

            info!(name = %thread_name, iterations, "Capture loop exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Whether the thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Signal the loop to stop and wait for the thread
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread without signalling it
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take()
            && handle.join().is_err()
        {
            warn!(name = %self.name, "Capture loop thread panicked");
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_loop_stops_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut capture = CaptureLoop::spawn("test-loop", move || {
            if counter_clone.fetch_add(1, Ordering::SeqCst) >= 4 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });

        capture.join();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(!capture.is_running());
    }

    #[test]
    fn test_stop_signal_ends_loop() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut capture = CaptureLoop::spawn("test-stop", move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            LoopAction::Continue
        });

        thread::sleep(Duration::from_millis(30));
        capture.stop();
        assert!(counter.load(Ordering::SeqCst) > 0);
        assert!(!capture.is_running());
    }

    #[test]
    fn test_failed_init_skips_steps() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        let mut capture = CaptureLoop::spawn_with_init(
            "test-init",
            || Err::<(), _>(SensorError::NoDevice),
            move |_| {
                ran_clone.store(true, Ordering::SeqCst);
                LoopAction::Stop
            },
        );

        capture.join();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_paced_loop_respects_period() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);
        let started = Instant::now();

        let mut capture = CaptureLoop::paced("test-paced", Duration::from_millis(10), move || {
            if counter_clone.fetch_add(1, Ordering::SeqCst) >= 2 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });

        capture.join();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        // First step runs immediately, the next two wait one period each
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
