//! Shared lifecycle state.
//!
//! One mutex guards the running flag, the pending-operation count and the
//! loop handle. The condvar on the same mutex is used only for the startup
//! rendezvous; shutdown waits by joining the loop thread instead.
//!
//! Nothing here blocks on the loop: quitting is a non-blocking
//! cancellation, so the loop thread and a caller holding the lock can never
//! wait on each other.

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::event_loop::LoopHandle;
use crate::metrics::LoopMetrics;

#[derive(Debug, Default)]
pub(crate) struct LifecycleState {
    /// True from the loop-started marker until shutdown begins.
    pub(crate) running: bool,
    pub(crate) pending: usize,
    /// Present while the loop thread is between loop construction and teardown.
    pub(crate) loop_handle: Option<LoopHandle>,
    pub(crate) startup_failed: Option<String>,
}

impl LifecycleState {
    /// Quit the loop if shutdown has begun and no operation is pending.
    ///
    /// Both the completion path and the shutdown path decide through here,
    /// with the lock held. An idle loop that is still in service is never
    /// quit.
    fn quit_if_drained(&self) -> bool {
        if self.running || self.pending != 0 {
            return false;
        }
        match &self.loop_handle {
            Some(handle) if handle.is_running() => {
                handle.quit();
                true
            }
            _ => false,
        }
    }
}

/// Lifecycle state shared by the owner, the loop thread and completion handlers.
#[derive(Default)]
pub(crate) struct SharedState {
    state: Mutex<LifecycleState>,
    started: Condvar,
    metrics: LoopMetrics,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn metrics(&self) -> &LoopMetrics {
        &self.metrics
    }

    pub(crate) fn publish_handle(&self, handle: LoopHandle) {
        self.state.lock().loop_handle = Some(handle);
    }

    pub(crate) fn clear_handle(&self) {
        self.state.lock().loop_handle = None;
    }

    pub(crate) fn loop_handle(&self) -> Option<LoopHandle> {
        self.state.lock().loop_handle.clone()
    }

    /// Loop-started marker: publish that the loop is live.
    pub(crate) fn mark_started(&self) {
        {
            let mut state = self.state.lock();
            state.running = true;
        }
        self.metrics.mark_start();
        self.started.notify_all();
    }

    /// Record that the loop could not be built, releasing the rendezvous.
    pub(crate) fn mark_startup_failed(&self, reason: String) {
        {
            let mut state = self.state.lock();
            state.startup_failed = Some(reason);
        }
        self.started.notify_all();
    }

    /// Block until the loop is live, or until startup is known to have failed.
    ///
    /// No timeout: a loop that never reports either outcome is a defect in
    /// the runner.
    pub(crate) fn wait_until_started(&self) -> Result<(), String> {
        let mut state = self.state.lock();
        while !state.running && state.startup_failed.is_none() {
            self.started.wait(&mut state);
        }
        match &state.startup_failed {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.lock().pending
    }

    pub(crate) fn operation_started(&self) {
        let mut state = self.state.lock();
        state.pending += 1;
        self.metrics.record_started();
        trace!(pending = state.pending, "operation started");
    }

    /// Announce an operation only if the loop will still run it.
    ///
    /// Returns the loop to schedule on, or `None` once the loop has quit
    /// or is gone. The check and the increment share one lock acquisition,
    /// so no quit can slip in between them.
    pub(crate) fn try_operation_started(&self) -> Option<LoopHandle> {
        let mut state = self.state.lock();
        let handle = state
            .loop_handle
            .as_ref()
            .filter(|handle| !handle.is_quit_requested())?
            .clone();
        state.pending += 1;
        self.metrics.record_started();
        trace!(pending = state.pending, "operation started");
        Some(handle)
    }

    /// Account one finished operation; the last one after shutdown quits the loop.
    ///
    /// # Panics
    ///
    /// Panics when no operation is pending.
    pub(crate) fn operation_completed(&self) {
        let mut state = self.state.lock();
        assert!(
            state.pending > 0,
            "operation_completed called without a matching operation_started"
        );
        state.pending -= 1;
        self.metrics.record_completed();
        trace!(pending = state.pending, "operation completed");

        if state.quit_if_drained() {
            self.metrics.record_quit();
            debug!("last pending operation completed after shutdown, quitting loop");
        }
    }

    /// Leave service: clear `running` and quit at once if nothing is pending.
    ///
    /// Returns whether the quit was issued here; otherwise the last
    /// [`operation_completed`](Self::operation_completed) issues it.
    pub(crate) fn begin_shutdown(&self) -> bool {
        let mut state = self.state.lock();
        state.running = false;
        let quit = state.quit_if_drained();
        if quit {
            self.metrics.record_quit();
        }
        debug!(pending = state.pending, quit, "shutdown requested");
        quit
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
