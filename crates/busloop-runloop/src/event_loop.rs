//! The cooperative loop a [`BusLoop`](crate::BusLoop) drives.
//!
//! An [`EventLoop`] is a Tokio current-thread runtime bound to the thread
//! that built it. Units of work spawned through its [`LoopHandle`] from any
//! thread are executed serially on that thread while [`EventLoop::run`] is
//! pumping. The loop stops when [`LoopHandle::quit`] is called.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct LoopShared {
    runtime: Handle,
    quit: CancellationToken,
    running: AtomicBool,
    thread_id: ThreadId,
}

/// Cloneable reference to an [`EventLoop`].
#[derive(Clone)]
pub struct LoopHandle {
    inner: Arc<LoopShared>,
}

impl LoopHandle {
    /// Schedule a unit of work on the loop thread.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.runtime.spawn(future)
    }

    /// Ask the loop to stop. Never blocks; repeated calls are no-ops.
    pub fn quit(&self) {
        self.inner.quit.cancel();
    }

    /// Whether the loop is currently pumping.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Whether [`quit`](Self::quit) has been called.
    pub fn is_quit_requested(&self) -> bool {
        self.inner.quit.is_cancelled()
    }

    /// The thread the loop runs on.
    pub fn thread_id(&self) -> ThreadId {
        self.inner.thread_id
    }

    /// Whether both handles refer to the same loop.
    pub fn ptr_eq(&self, other: &LoopHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("thread_id", &self.inner.thread_id)
            .field("running", &self.is_running())
            .field("quit_requested", &self.is_quit_requested())
            .finish()
    }
}

/// A cooperative loop owned by the thread that built it.
pub struct EventLoop {
    runtime: Runtime,
    handle: LoopHandle,
}

impl EventLoop {
    /// Build a loop bound to the calling thread.
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = LoopHandle {
            inner: Arc::new(LoopShared {
                runtime: runtime.handle().clone(),
                quit: CancellationToken::new(),
                running: AtomicBool::new(false),
                thread_id: std::thread::current().id(),
            }),
        };
        Ok(Self { runtime, handle })
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Pump scheduled work until quit is requested.
    ///
    /// Work still scheduled when the loop stops is not polled again; it is
    /// dropped together with the loop.
    pub fn run(&self) {
        let shared = &self.handle.inner;
        shared.running.store(true, Ordering::SeqCst);
        self.runtime.block_on(shared.quit.cancelled());
        shared.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "event_loop_tests.rs"]
mod tests;
