//! # busloop RunLoop
//!
//! Lifecycle manager for a cooperative event loop that runs on a dedicated
//! background thread and drives IPC calls for bus proxies.
//!
//! ## Lifecycle
//!
//! ```text
//!  owner thread                     loop thread                  completion handlers
//!  ────────────                     ───────────                  ───────────────────
//!  BusLoop::start ──spawn──────────▶ build loop, publish handle
//!       │ wait(running)             schedule loop-started marker
//!       │◀──────────notify───────── marker: running = true
//!  proxy call: operation_started ──▶ unit of work ──────────────▶ operation_completed
//!  drop / shutdown:                                               (last one after
//!       running = false                                            shutdown quits)
//!       quit if nothing pending
//!       join ◀──────────────────── loop exits, handle cleared
//!       release connection
//! ```
//!
//! ## Key Components
//!
//! - [`BusLoop`]: The lifecycle manager
//! - [`LoopHooks`] / [`OperationGuard`]: Pending-operation accounting
//! - [`EventLoop`] / [`LoopHandle`]: The loop itself
//! - [`BusProxy`]: Typed proxy that schedules accounted calls
//! - [`MemoryBus`]: In-process bus for tools and tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use busloop_protocols::PropertyMap;
//! use busloop_runloop::{BusLoop, BusProxy, MemoryBus};
//!
//! let bus = Arc::new(MemoryBus::new());
//! let bus_loop = BusLoop::connect(bus, "org.freedesktop.DBus", "/org/freedesktop/DBus")?;
//!
//! let proxy: BusProxy<PropertyMap> = BusProxy::new(
//!     &bus_loop,
//!     "org.freedesktop.DBus",
//!     "/org/freedesktop/DBus",
//!     "org.freedesktop.DBus",
//! )?;
//! proxy.get_properties(|result| {
//!     if let Ok(properties) = result {
//!         println!("{:?}", properties);
//!     }
//! })?;
//!
//! // Waits for the fetch above before stopping the loop.
//! bus_loop.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bus_loop;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod memory_bus;
pub mod metrics;
pub mod operation;
pub mod proxy;
mod runner;
mod state;

// Re-exports
pub use bus_loop::BusLoop;
pub use config::LoopConfig;
pub use error::{InitializationError, RunLoopError, RunLoopResult};
pub use event_loop::{EventLoop, LoopHandle};
pub use memory_bus::{BUS_DAEMON_NAME, BUS_DAEMON_PATH, MemoryBus, MemoryConnection, MethodHandler};
pub use metrics::{LoopMetrics, MetricsSnapshot};
pub use operation::{LoopHooks, OperationGuard};
pub use proxy::{BusProxy, PropertySet, Subscription};
