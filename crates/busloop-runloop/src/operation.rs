//! Pending-operation accounting hooks.
//!
//! Every collaborator that schedules asynchronous work on the loop calls
//! [`LoopHooks::operation_started`] before scheduling it and
//! [`LoopHooks::operation_completed`] exactly once when it finishes, on
//! every exit path. [`OperationGuard`] pairs the two calls automatically and
//! is what [`LoopHooks::spawn`] wraps around each unit of work.
//!
//! An unmatched `operation_started` keeps shutdown waiting forever.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread::ThreadId;

use tokio::task::JoinHandle;

use crate::error::{RunLoopError, RunLoopResult};
use crate::event_loop::LoopHandle;
use crate::metrics::MetricsSnapshot;
use crate::state::SharedState;

/// Cloneable access to a loop's lifecycle hooks.
///
/// Collaborators such as proxies keep one of these instead of borrowing the
/// [`BusLoop`](crate::BusLoop).
#[derive(Clone)]
pub struct LoopHooks {
    shared: Arc<SharedState>,
}

impl LoopHooks {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// Announce an asynchronous operation about to be scheduled on the loop.
    pub fn operation_started(&self) {
        self.shared.operation_started();
    }

    /// Account the completion of an announced operation.
    ///
    /// # Panics
    ///
    /// Panics when called more often than [`operation_started`](Self::operation_started).
    pub fn operation_completed(&self) {
        self.shared.operation_completed();
    }

    /// Announce an operation and complete it when the guard drops.
    pub fn guard(&self) -> OperationGuard {
        OperationGuard::new(self.clone())
    }

    /// Schedule an accounted unit of work on the loop thread.
    ///
    /// The operation counts as pending until the future finishes or is
    /// dropped, so shutdown will not quit the loop underneath it.
    pub fn spawn<F>(&self, future: F) -> RunLoopResult<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (handle, guard) = self.reserve()?;
        Ok(handle.spawn(async move {
            let _guard = guard;
            future.await
        }))
    }

    /// Announce an operation and return the loop it must be scheduled on.
    ///
    /// Fails with [`RunLoopError::LoopStopped`] once the loop has quit, so
    /// work accepted here is always run.
    pub(crate) fn reserve(&self) -> RunLoopResult<(LoopHandle, OperationGuard)> {
        let handle = self
            .shared
            .try_operation_started()
            .ok_or(RunLoopError::LoopStopped)?;
        Ok((handle, OperationGuard::adopt(self.clone())))
    }

    /// Schedule work that does not hold shutdown open.
    ///
    /// Used for long-lived subscriptions; the work is dropped when the loop
    /// quits.
    pub fn spawn_untracked<F>(&self, future: F) -> RunLoopResult<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self
            .loop_handle()
            .filter(|handle| !handle.is_quit_requested())
            .ok_or(RunLoopError::LoopStopped)?;
        Ok(handle.spawn(future))
    }

    /// Number of operations started but not yet completed.
    pub fn pending_operations(&self) -> usize {
        self.shared.pending()
    }

    /// Whether the loop is live and not shutting down.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// The active loop, or `None` once it has stopped.
    pub fn loop_handle(&self) -> Option<LoopHandle> {
        self.shared.loop_handle()
    }

    /// The loop thread, while the loop exists.
    pub fn loop_thread_id(&self) -> Option<ThreadId> {
        self.loop_handle().map(|handle| handle.thread_id())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics().snapshot()
    }
}

impl fmt::Debug for LoopHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHooks")
            .field("running", &self.is_running())
            .field("pending", &self.pending_operations())
            .finish()
    }
}

/// One pending operation; completes it on drop.
#[must_use = "the operation completes as soon as the guard is dropped"]
pub struct OperationGuard {
    hooks: LoopHooks,
}

impl OperationGuard {
    fn new(hooks: LoopHooks) -> Self {
        hooks.operation_started();
        Self { hooks }
    }

    /// Take over an operation that was already announced.
    fn adopt(hooks: LoopHooks) -> Self {
        Self { hooks }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.hooks.operation_completed();
    }
}

impl fmt::Debug for OperationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
