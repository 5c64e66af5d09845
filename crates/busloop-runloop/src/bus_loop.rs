//! The bus loop lifecycle manager.
//!
//! A [`BusLoop`] owns one dedicated thread running one [`EventLoop`]
//! (see [`crate::event_loop`]). Construction blocks until the loop is
//! confirmed live, so anything scheduled right after construction is
//! pumped. Teardown never quits the loop while an accounted operation is
//! still pending and always joins the thread.
//!
//! [`EventLoop`]: crate::event_loop::EventLoop

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{JoinHandle, ThreadId};

use busloop_protocols::{BusConnection, BusConnector, BusName, ObjectPath};
use tracing::{debug, error, info, warn};

use crate::config::LoopConfig;
use crate::error::{InitializationError, RunLoopResult};
use crate::event_loop::{EventLoop, LoopHandle};
use crate::metrics::MetricsSnapshot;
use crate::operation::{LoopHooks, OperationGuard};
use crate::runner::LoopRunner;
use crate::state::SharedState;

/// Managed background loop driving IPC calls for bus proxies.
///
/// Construction and teardown block the calling thread. Do not construct or
/// drop a `BusLoop` from inside an async task (use
/// `tokio::task::spawn_blocking`), and never from the loop thread itself.
pub struct BusLoop {
    shared: Arc<SharedState>,
    thread: Option<JoinHandle<()>>,
    connection: Option<Arc<dyn BusConnection>>,
    bus_name: Option<BusName>,
    object_path: Option<ObjectPath>,
}

impl BusLoop {
    /// Start a loop without a bus connection.
    ///
    /// Returns once the loop is pumping.
    pub fn start(config: &LoopConfig) -> Result<Self, InitializationError> {
        Self::start_with(config, EventLoop::new)
    }

    /// Start a loop built by `build` on the loop thread.
    pub(crate) fn start_with<B>(config: &LoopConfig, build: B) -> Result<Self, InitializationError>
    where
        B: FnOnce() -> io::Result<EventLoop> + Send + 'static,
    {
        let shared = Arc::new(SharedState::new());
        let thread = LoopRunner::start(&config.thread_name, Arc::clone(&shared), build)
            .map_err(InitializationError::ThreadSpawn)?;

        if let Err(reason) = shared.wait_until_started() {
            // The runner returns right after reporting; reap it before failing.
            if thread.join().is_err() {
                error!("bus loop thread panicked during startup");
            }
            return Err(InitializationError::LoopStartup(reason));
        }

        info!(thread = %config.thread_name, "bus loop started");
        Ok(Self {
            shared,
            thread: Some(thread),
            connection: None,
            bus_name: None,
            object_path: None,
        })
    }

    /// Start a loop and connect it to `bus_name` at `object_path`.
    pub fn connect(
        connector: Arc<dyn BusConnector>,
        bus_name: &str,
        object_path: &str,
    ) -> Result<Self, InitializationError> {
        Self::connect_with_config(connector, bus_name, object_path, &LoopConfig::default())
    }

    /// Start a loop with `config` and connect it to `bus_name` at `object_path`.
    ///
    /// The connection is established as a unit of work on the loop. On
    /// failure the loop is shut down and its thread joined before the error
    /// is returned.
    pub fn connect_with_config(
        connector: Arc<dyn BusConnector>,
        bus_name: &str,
        object_path: &str,
        config: &LoopConfig,
    ) -> Result<Self, InitializationError> {
        let bus_name = BusName::new(bus_name).map_err(InitializationError::InvalidBusName)?;
        let object_path =
            ObjectPath::new(object_path).map_err(InitializationError::InvalidObjectPath)?;

        let mut bus_loop = Self::start(config)?;

        let (tx, rx) = mpsc::sync_channel(1);
        let (name, path) = (bus_name.clone(), object_path.clone());
        let scheduled = bus_loop.spawn(async move {
            let result = connector.connect(&name, &path).await;
            // The receiver only goes away if the owner already gave up.
            let _ = tx.send(result);
        });
        if scheduled.is_err() {
            bus_loop.shutdown();
            return Err(InitializationError::ConnectionDropped);
        }

        match rx.recv() {
            Ok(Ok(connection)) => {
                info!(
                    bus_name = %bus_name,
                    object_path = %object_path,
                    unique_name = connection.unique_name(),
                    "bus connection established"
                );
                bus_loop.connection = Some(connection);
                bus_loop.bus_name = Some(bus_name);
                bus_loop.object_path = Some(object_path);
                Ok(bus_loop)
            }
            Ok(Err(source)) => {
                warn!(bus_name = %bus_name, error = %source, "bus connection failed");
                bus_loop.shutdown();
                Err(InitializationError::Connection {
                    bus_name: bus_name.to_string(),
                    source,
                })
            }
            Err(_) => {
                bus_loop.shutdown();
                Err(InitializationError::ConnectionDropped)
            }
        }
    }

    /// Hooks for collaborators that schedule work on this loop.
    pub fn hooks(&self) -> LoopHooks {
        LoopHooks::new(Arc::clone(&self.shared))
    }

    /// See [`LoopHooks::operation_started`].
    pub fn operation_started(&self) {
        self.shared.operation_started();
    }

    /// See [`LoopHooks::operation_completed`].
    pub fn operation_completed(&self) {
        self.shared.operation_completed();
    }

    /// See [`LoopHooks::guard`].
    pub fn guard(&self) -> OperationGuard {
        self.hooks().guard()
    }

    /// See [`LoopHooks::spawn`].
    pub fn spawn<F>(&self, future: F) -> RunLoopResult<tokio::task::JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.hooks().spawn(future)
    }

    pub fn pending_operations(&self) -> usize {
        self.shared.pending()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn loop_handle(&self) -> Option<LoopHandle> {
        self.shared.loop_handle()
    }

    /// The dedicated loop thread.
    pub fn loop_thread_id(&self) -> Option<ThreadId> {
        self.thread.as_ref().map(|thread| thread.thread().id())
    }

    /// The established connection, if this loop was built with one.
    pub fn connection(&self) -> Option<&Arc<dyn BusConnection>> {
        self.connection.as_ref()
    }

    pub fn bus_name(&self) -> Option<&BusName> {
        self.bus_name.as_ref()
    }

    pub fn object_path(&self) -> Option<&ObjectPath> {
        self.object_path.as_ref()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics().snapshot()
    }

    /// Shut the loop down and release everything it owns.
    ///
    /// Blocks until every pending operation has completed and the loop
    /// thread has exited. Dropping a `BusLoop` does the same.
    pub fn shutdown(mut self) {
        self.shutdown_sequence();
    }

    fn shutdown_sequence(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        assert_ne!(
            thread.thread().id(),
            std::thread::current().id(),
            "a BusLoop cannot be shut down from its own loop thread"
        );

        match self.shared.wait_until_started() {
            Ok(()) => {
                self.shared.begin_shutdown();
            }
            Err(reason) => {
                debug!(reason = %reason, "bus loop never started, nothing to stop");
            }
        }

        if thread.join().is_err() {
            error!("bus loop thread panicked");
        }

        if let Some(connection) = self.connection.take() {
            connection.close();
            debug!(unique_name = connection.unique_name(), "bus connection released");
        }
        info!("bus loop shut down");
    }
}

impl Drop for BusLoop {
    fn drop(&mut self) {
        self.shutdown_sequence();
    }
}

impl fmt::Debug for BusLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusLoop")
            .field("bus_name", &self.bus_name)
            .field("object_path", &self.object_path)
            .field("running", &self.is_running())
            .field("pending", &self.pending_operations())
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "bus_loop_tests.rs"]
mod tests;
