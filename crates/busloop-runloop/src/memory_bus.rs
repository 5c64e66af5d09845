//! In-memory message bus.
//!
//! A [`BusConnector`] whose services, objects and properties live in
//! process memory. It stands in for a real bus daemon in the CLI and in
//! tests. Every bus exports the daemon itself as `org.freedesktop.DBus`
//! at `/org/freedesktop/DBus`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use busloop_protocols::{
    BusConnection, BusConnector, BusError, BusName, InterfaceName, ObjectAddress, ObjectPath,
    PropertiesChanged, PropertyMap,
};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// Well-known name of the bus daemon.
pub const BUS_DAEMON_NAME: &str = "org.freedesktop.DBus";
/// Object path of the bus daemon.
pub const BUS_DAEMON_PATH: &str = "/org/freedesktop/DBus";

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Handler answering a method call.
pub type MethodHandler = Arc<dyn Fn(&[Value]) -> Result<Value, BusError> + Send + Sync>;

struct InterfaceEntry {
    properties: PropertyMap,
    methods: HashMap<String, MethodHandler>,
    changes: broadcast::Sender<PropertiesChanged>,
}

impl InterfaceEntry {
    fn new(properties: PropertyMap) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            properties,
            methods: HashMap::new(),
            changes,
        }
    }
}

type ObjectEntry = HashMap<InterfaceName, InterfaceEntry>;

#[derive(Default)]
struct Registry {
    services: HashMap<BusName, HashMap<ObjectPath, ObjectEntry>>,
}

impl Registry {
    fn interface(&self, target: &ObjectAddress) -> Result<&InterfaceEntry, BusError> {
        let objects = self
            .services
            .get(&target.service)
            .ok_or_else(|| BusError::ServiceUnknown(target.service.to_string()))?;
        let object = objects.get(&target.path).ok_or_else(|| BusError::UnknownObject {
            service: target.service.to_string(),
            path: target.path.to_string(),
        })?;
        object
            .get(&target.interface)
            .ok_or_else(|| BusError::UnknownInterface {
                path: target.path.to_string(),
                interface: target.interface.to_string(),
            })
    }

    fn interface_mut(&mut self, target: &ObjectAddress) -> Result<&mut InterfaceEntry, BusError> {
        let objects = self
            .services
            .get_mut(&target.service)
            .ok_or_else(|| BusError::ServiceUnknown(target.service.to_string()))?;
        let object = objects
            .get_mut(&target.path)
            .ok_or_else(|| BusError::UnknownObject {
                service: target.service.to_string(),
                path: target.path.to_string(),
            })?;
        object
            .get_mut(&target.interface)
            .ok_or_else(|| BusError::UnknownInterface {
                path: target.path.to_string(),
                interface: target.interface.to_string(),
            })
    }
}

/// Process-local bus shared by every connection made through it.
#[derive(Clone)]
pub struct MemoryBus {
    registry: Arc<RwLock<Registry>>,
    next_connection: Arc<AtomicU64>,
    latency: Duration,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// Create a bus exporting only the bus daemon.
    pub fn new() -> Self {
        let bus = Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            next_connection: Arc::new(AtomicU64::new(1)),
            latency: Duration::ZERO,
        };
        bus.register_daemon();
        bus
    }

    /// Delay every property fetch and method call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn register_daemon(&self) {
        let Ok(daemon) = parse_address(BUS_DAEMON_NAME, BUS_DAEMON_PATH, BUS_DAEMON_NAME) else {
            return;
        };
        let properties = PropertyMap::from([
            ("Features".to_string(), Value::Array(Vec::new())),
            (
                "Interfaces".to_string(),
                Value::Array(vec![Value::String(BUS_DAEMON_NAME.to_string())]),
            ),
        ]);
        self.insert_interface(&daemon, properties);

        let registry: Weak<RwLock<Registry>> = Arc::downgrade(&self.registry);
        let list_names: MethodHandler = Arc::new(move |_args| {
            let registry = registry.upgrade().ok_or(BusError::Disconnected)?;
            let mut names: Vec<String> = registry
                .read()
                .services
                .keys()
                .map(|name| name.to_string())
                .collect();
            names.sort();
            Ok(Value::from(names))
        });
        self.insert_method(&daemon, "ListNames", list_names);

        let registry: Weak<RwLock<Registry>> = Arc::downgrade(&self.registry);
        let name_has_owner: MethodHandler = Arc::new(move |args| {
            let registry = registry.upgrade().ok_or(BusError::Disconnected)?;
            let name = match args {
                [Value::String(name)] => name,
                _ => {
                    return Err(BusError::Failed(
                        "NameHasOwner expects a single bus name argument".to_string(),
                    ));
                }
            };
            let owned = BusName::new(name.as_str())
                .map(|name| registry.read().services.contains_key(&name))
                .unwrap_or(false);
            Ok(Value::Bool(owned))
        });
        self.insert_method(&daemon, "NameHasOwner", name_has_owner);
        self.insert_method(&daemon, "Ping", Arc::new(|_args| Ok(Value::Null)));
    }

    fn insert_interface(&self, target: &ObjectAddress, properties: PropertyMap) {
        let mut registry = self.registry.write();
        registry
            .services
            .entry(target.service.clone())
            .or_default()
            .entry(target.path.clone())
            .or_default()
            .insert(target.interface.clone(), InterfaceEntry::new(properties));
    }

    fn insert_method(&self, target: &ObjectAddress, method: &str, handler: MethodHandler) {
        let mut registry = self.registry.write();
        if let Ok(entry) = registry.interface_mut(target) {
            entry.methods.insert(method.to_string(), handler);
        }
    }

    /// Export `interface` at `path` on `service`, replacing any previous export.
    pub fn register_object(
        &self,
        service: &str,
        path: &str,
        interface: &str,
        properties: PropertyMap,
    ) -> Result<(), BusError> {
        let target = parse_address(service, path, interface)?;
        debug!(object = %target, "registering object on memory bus");
        self.insert_interface(&target, properties);
        Ok(())
    }

    /// Answer calls of `method` on an exported interface.
    pub fn register_method<F>(
        &self,
        service: &str,
        path: &str,
        interface: &str,
        method: &str,
        handler: F,
    ) -> Result<(), BusError>
    where
        F: Fn(&[Value]) -> Result<Value, BusError> + Send + Sync + 'static,
    {
        let target = parse_address(service, path, interface)?;
        let mut registry = self.registry.write();
        let entry = registry.interface_mut(&target)?;
        entry.methods.insert(method.to_string(), Arc::new(handler));
        Ok(())
    }

    /// Change one property and notify subscribers.
    pub fn set_property(
        &self,
        service: &str,
        path: &str,
        interface: &str,
        name: &str,
        value: Value,
    ) -> Result<(), BusError> {
        let target = parse_address(service, path, interface)?;
        let mut registry = self.registry.write();
        let entry = registry.interface_mut(&target)?;
        entry.properties.insert(name.to_string(), value.clone());

        let change = PropertiesChanged {
            interface: target.interface.clone(),
            changed: PropertyMap::from([(name.to_string(), value)]),
            invalidated: Vec::new(),
        };
        // No subscribers is not an error.
        let _ = entry.changes.send(change);
        Ok(())
    }

    /// Remove a service and everything it exports.
    pub fn unregister_service(&self, service: &str) -> bool {
        let Ok(name) = BusName::new(service) else {
            return false;
        };
        self.registry.write().services.remove(&name).is_some()
    }

    /// Whether a service is currently exported.
    pub fn has_service(&self, service: &str) -> bool {
        BusName::new(service)
            .map(|name| self.registry.read().services.contains_key(&name))
            .unwrap_or(false)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn parse_address(service: &str, path: &str, interface: &str) -> Result<ObjectAddress, BusError> {
    Ok(ObjectAddress::new(
        BusName::new(service)?,
        ObjectPath::new(path)?,
        InterfaceName::new(interface)?,
    ))
}

#[async_trait]
impl BusConnector for MemoryBus {
    async fn connect(
        &self,
        bus_name: &BusName,
        object_path: &ObjectPath,
    ) -> Result<Arc<dyn BusConnection>, BusError> {
        self.simulate_latency().await;
        {
            let registry = self.registry.read();
            let objects = registry
                .services
                .get(bus_name)
                .ok_or_else(|| BusError::ServiceUnknown(bus_name.to_string()))?;
            if !objects.contains_key(object_path) {
                return Err(BusError::UnknownObject {
                    service: bus_name.to_string(),
                    path: object_path.to_string(),
                });
            }
        }

        let serial = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let connection = MemoryConnection {
            bus: self.clone(),
            unique_name: format!(":1.{}", serial),
            closed: AtomicBool::new(false),
        };
        debug!(unique_name = %connection.unique_name, "memory bus connection opened");
        Ok(Arc::new(connection))
    }
}

/// A connection to a [`MemoryBus`].
pub struct MemoryConnection {
    bus: MemoryBus,
    unique_name: String,
    closed: AtomicBool,
}

impl MemoryConnection {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.is_closed() {
            Err(BusError::Disconnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BusConnection for MemoryConnection {
    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    async fn get_all_properties(&self, target: &ObjectAddress) -> Result<PropertyMap, BusError> {
        self.ensure_open()?;
        self.bus.simulate_latency().await;
        let registry = self.bus.registry.read();
        Ok(registry.interface(target)?.properties.clone())
    }

    async fn call_method(
        &self,
        target: &ObjectAddress,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, BusError> {
        self.ensure_open()?;
        self.bus.simulate_latency().await;
        let handler = {
            let registry = self.bus.registry.read();
            registry
                .interface(target)?
                .methods
                .get(method)
                .cloned()
                .ok_or_else(|| BusError::UnknownMethod {
                    interface: target.interface.to_string(),
                    method: method.to_string(),
                })?
        };
        handler(&args)
    }

    fn subscribe_properties(
        &self,
        target: &ObjectAddress,
    ) -> Result<broadcast::Receiver<PropertiesChanged>, BusError> {
        self.ensure_open()?;
        let registry = self.bus.registry.read();
        Ok(registry.interface(target)?.changes.subscribe())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "memory_bus_tests.rs"]
mod tests;
