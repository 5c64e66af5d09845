//! Typed proxy for one interface of a remote object.
//!
//! Every asynchronous call a proxy makes is scheduled on the bus loop and
//! accounted through [`LoopHooks`], so a [`BusLoop`](crate::BusLoop) never
//! quits while a proxy call is in flight. Callbacks run on the loop thread.

use std::marker::PhantomData;
use std::sync::Arc;

use busloop_protocols::{
    BusConnection, BusName, InterfaceName, ObjectAddress, ObjectPath, PropertiesChanged,
    PropertyMap,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus_loop::BusLoop;
use crate::error::{RunLoopError, RunLoopResult};
use crate::operation::LoopHooks;

/// Local view of an interface's properties.
pub trait PropertySet: Default + Send + 'static {
    /// Apply a new value for `name`.
    fn update(&mut self, name: &str, value: &Value);

    /// Forget the cached value of `name`.
    fn invalidate(&mut self, _name: &str) {}

    /// Apply a change notification.
    fn apply(&mut self, change: &PropertiesChanged) {
        for (name, value) in &change.changed {
            self.update(name, value);
        }
        for name in &change.invalidated {
            self.invalidate(name);
        }
    }
}

impl PropertySet for PropertyMap {
    fn update(&mut self, name: &str, value: &Value) {
        self.insert(name.to_string(), value.clone());
    }

    fn invalidate(&mut self, name: &str) {
        self.remove(name);
    }
}

fn collect<P: PropertySet>(properties: &PropertyMap) -> P {
    let mut set = P::default();
    for (name, value) in properties {
        set.update(name, value);
    }
    set
}

/// Proxy for `interface` at `path` on `service`.
pub struct BusProxy<P> {
    hooks: LoopHooks,
    connection: Arc<dyn BusConnection>,
    address: ObjectAddress,
    _properties: PhantomData<fn() -> P>,
}

impl<P: PropertySet> BusProxy<P> {
    /// Create a proxy using the loop's own connection.
    pub fn new(
        bus_loop: &BusLoop,
        service: &str,
        path: &str,
        interface: &str,
    ) -> RunLoopResult<Self> {
        let connection = bus_loop
            .connection()
            .cloned()
            .ok_or(RunLoopError::NotConnected)?;
        let address = ObjectAddress::new(
            BusName::new(service).map_err(RunLoopError::InvalidName)?,
            ObjectPath::new(path).map_err(RunLoopError::InvalidName)?,
            InterfaceName::new(interface).map_err(RunLoopError::InvalidName)?,
        );
        Ok(Self::with_connection(bus_loop.hooks(), connection, address))
    }

    /// Create a proxy over an explicit connection.
    pub fn with_connection(
        hooks: LoopHooks,
        connection: Arc<dyn BusConnection>,
        address: ObjectAddress,
    ) -> Self {
        Self {
            hooks,
            connection,
            address,
            _properties: PhantomData,
        }
    }

    pub fn address(&self) -> &ObjectAddress {
        &self.address
    }

    /// Fetch every property and hand the result to `callback` on the loop thread.
    pub fn get_properties<F>(&self, callback: F) -> RunLoopResult<()>
    where
        F: FnOnce(RunLoopResult<P>) + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let address = self.address.clone();
        self.hooks.spawn(async move {
            let result = connection
                .get_all_properties(&address)
                .await
                .map(|properties| collect::<P>(&properties))
                .map_err(RunLoopError::from);
            if let Err(e) = &result {
                debug!(object = %address, error = %e, "property fetch failed");
            }
            callback(result);
        })?;
        Ok(())
    }

    /// Call `method` and hand the decoded reply to `callback` on the loop thread.
    pub fn call_method<T, F>(&self, method: &str, args: Vec<Value>, callback: F) -> RunLoopResult<()>
    where
        T: DeserializeOwned,
        F: FnOnce(RunLoopResult<T>) + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let address = self.address.clone();
        let method = method.to_string();
        self.hooks.spawn(async move {
            let result = match connection.call_method(&address, &method, args).await {
                Ok(reply) => serde_json::from_value(reply).map_err(RunLoopError::from),
                Err(e) => Err(RunLoopError::from(e)),
            };
            callback(result);
        })?;
        Ok(())
    }

    /// Track the interface's properties.
    ///
    /// `callback` runs once with the initial values and again after every
    /// change notification. The initial fetch is a pending operation; the
    /// watch afterwards is not, and ends when the returned [`Subscription`]
    /// is dropped or the loop quits.
    pub fn watch_properties<F>(&self, mut callback: F) -> RunLoopResult<Subscription>
    where
        F: FnMut(&P) + Send + 'static,
    {
        let mut changes = self.connection.subscribe_properties(&self.address)?;
        let connection = Arc::clone(&self.connection);
        let address = self.address.clone();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let (handle, initial_fetch) = self.hooks.reserve()?;

        handle.spawn(async move {
            let mut properties = match connection.get_all_properties(&address).await {
                Ok(initial) => collect::<P>(&initial),
                Err(e) => {
                    warn!(object = %address, error = %e, "initial property fetch failed");
                    P::default()
                }
            };
            callback(&properties);
            drop(initial_fetch);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(change) => {
                            properties.apply(&change);
                            callback(&properties);
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!(object = %address, missed, "property watch lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(object = %address, "property watch ended");
        });

        Ok(Subscription { token })
    }
}

/// Active property watch; stops when dropped.
#[must_use = "the watch stops as soon as the subscription is dropped"]
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
