//! Connection protocol definitions.
//!
//! A [`BusConnector`] turns a bus name and object path into an established
//! [`BusConnection`]. Everything a proxy does on the bus (property fetches,
//! method calls, change notifications) goes through the connection.
//!
//! Implementations are driven from a background loop: async methods are
//! polled on the loop thread, so they must not block it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::BusError;
use crate::names::{BusName, InterfaceName, ObjectPath};

/// Property name to value, ordered by name.
pub type PropertyMap = BTreeMap<String, Value>;

/// The remote object an operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectAddress {
    /// Destination service.
    pub service: BusName,
    /// Object path on that service.
    pub path: ObjectPath,
    /// Interface on that object.
    pub interface: InterfaceName,
}

impl ObjectAddress {
    pub fn new(service: BusName, path: ObjectPath, interface: InterfaceName) -> Self {
        Self {
            service,
            path,
            interface,
        }
    }
}

impl fmt::Display for ObjectAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.service, self.path, self.interface)
    }
}

/// Notification that properties of an interface changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertiesChanged {
    /// Interface whose properties changed.
    pub interface: InterfaceName,
    /// New values.
    #[serde(default)]
    pub changed: PropertyMap,
    /// Properties whose values are no longer cached and must be re-fetched.
    #[serde(default)]
    pub invalidated: Vec<String>,
}

/// Resolves a bus name and object path into an established connection.
#[async_trait]
pub trait BusConnector: Send + Sync {
    /// Connect, failing when the service or object is unreachable.
    async fn connect(
        &self,
        bus_name: &BusName,
        object_path: &ObjectPath,
    ) -> Result<Arc<dyn BusConnection>, BusError>;
}

/// An established connection to a message bus.
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// The unique name the bus assigned to this connection.
    fn unique_name(&self) -> &str;

    /// Fetch every property of `target.interface`.
    async fn get_all_properties(&self, target: &ObjectAddress) -> Result<PropertyMap, BusError>;

    /// Invoke a method and return its reply.
    async fn call_method(
        &self,
        target: &ObjectAddress,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, BusError>;

    /// Subscribe to property change notifications of `target.interface`.
    fn subscribe_properties(
        &self,
        target: &ObjectAddress,
    ) -> Result<broadcast::Receiver<PropertiesChanged>, BusError>;

    /// Release the connection. Later calls fail with [`BusError::Disconnected`].
    fn close(&self);
}
