// SPDX-License-Identifier: GPL-3.0-only
//! Repeating async task with a stop predicate
//!
//! The live decode loop is "tick, wait, tick again" until something says
//! stop. This module owns that shape so the scanner only has to supply the
//! tick itself and the condition under which it may keep running.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Action returned by a tick to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Schedule another tick after the interval
    Continue,
    /// Stop the loop without scheduling another tick
    Stop,
}

/// Cancellation flag shared between a [`PollHandle`] and its task
///
/// Setting the flag never interrupts a tick that is already running. The
/// tick sees it when its awaited work completes, and the loop sees it before
/// scheduling anything else.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    wake: Notify,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // notify_one keeps a permit, so a loop that is about to sleep still wakes
        self.wake.notify_one();
    }
}

/// Handle to a running poll loop
///
/// Dropping the handle requests a stop. Nothing here ever waits for the task:
/// a tick may be parked on a decode that cannot be interrupted, and callers
/// such as `Scanner::stop` must stay synchronous.
pub struct PollHandle {
    signal: Arc<StopSignal>,
    task: Option<JoinHandle<()>>,
    name: String,
}

impl PollHandle {
    /// Spawn a poll loop on the current tokio runtime
    ///
    /// `should_run` is evaluated before every tick and again before every
    /// reschedule; `false` ends the loop. `tick` receives the loop's
    /// [`StopSignal`] so it can discard work that completes after a stop.
    /// Each tick is awaited to completion before the next one is scheduled.
    pub fn spawn<P, T, Fut>(name: &str, interval: Duration, should_run: P, mut tick: T) -> Self
    where
        P: Fn() -> bool + Send + 'static,
        T: FnMut(Arc<StopSignal>) -> Fut + Send + 'static,
        Fut: Future<Output = LoopAction> + Send + 'static,
    {
        let signal = Arc::new(StopSignal::default());
        let task_signal = Arc::clone(&signal);
        let task_name = name.to_string();

        debug!(name = %name, interval_ms = interval.as_millis(), "Starting poll loop");

        let task = tokio::spawn(async move {
            let mut ticks: u64 = 0;
            loop {
                if task_signal.is_stopped() || !should_run() {
                    trace!(name = %task_name, "Stop predicate hit before tick");
                    break;
                }

                ticks += 1;
                if tick(Arc::clone(&task_signal)).await == LoopAction::Stop {
                    debug!(name = %task_name, ticks, "Tick requested stop");
                    break;
                }

                if task_signal.is_stopped() || !should_run() {
                    trace!(name = %task_name, "Stop predicate hit before reschedule");
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = task_signal.wake.notified() => {}
                }
            }
            debug!(name = %task_name, ticks, "Poll loop exited");
        });

        Self {
            signal,
            task: Some(task),
            name: name.to_string(),
        }
    }

    /// Whether the task is still alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.is_stopped()
    }

    /// Mark the loop cancelled (non-blocking)
    pub fn request_stop(&self) {
        if !self.signal.is_stopped() {
            debug!(name = %self.name, "Requesting poll loop stop");
            self.signal.stop();
        }
    }

    /// Cancel the loop and forget the task
    ///
    /// The task finishes on its own once any in-flight tick resolves.
    pub fn cancel(&mut self) {
        self.request_stop();
        if self.task.take().is_some() {
            info!(name = %self.name, "Poll loop cancelled");
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            debug!(name = %self.name, "PollHandle dropped, stopping loop");
        }
        self.request_stop();
    }
}
