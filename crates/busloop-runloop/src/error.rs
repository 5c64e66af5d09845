//! Error types for the bus loop.

use busloop_protocols::BusError;
use thiserror::Error;

/// Construction of a [`BusLoop`](crate::BusLoop) failed.
///
/// When this is returned no loop thread is left running.
#[derive(Debug, Error)]
pub enum InitializationError {
    /// The bus name is malformed.
    #[error("Invalid bus name: {0}")]
    InvalidBusName(#[source] BusError),

    /// The object path is malformed.
    #[error("Invalid object path: {0}")]
    InvalidObjectPath(#[source] BusError),

    /// The loop thread could not be spawned.
    #[error("Failed to spawn loop thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// The loop could not be built on its thread.
    #[error("Loop failed to start: {0}")]
    LoopStartup(String),

    /// The bus or the target object is unreachable.
    #[error("Connection to {bus_name} failed: {source}")]
    Connection {
        bus_name: String,
        #[source]
        source: BusError,
    },

    /// The connection attempt was dropped before it reported back.
    #[error("Connection attempt was dropped before completing")]
    ConnectionDropped,
}

/// Errors of operations scheduled on a running loop.
#[derive(Debug, Error)]
pub enum RunLoopError {
    /// The loop has stopped; nothing more can be scheduled.
    #[error("Bus loop has stopped")]
    LoopStopped,

    /// The loop was started without a bus connection.
    #[error("Bus loop has no connection")]
    NotConnected,

    /// A bus identifier is malformed.
    #[error("Invalid name: {0}")]
    InvalidName(#[source] BusError),

    /// The remote call failed.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// A reply could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for bus loop operations.
pub type RunLoopResult<T> = Result<T, RunLoopError>;
