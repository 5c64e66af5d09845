//! # busloop Protocols
//!
//! Interface definitions for the IPC layer driven by a `busloop-runloop`
//! `BusLoop`. Contains only traits and value types - no implementations.
//!
//! ## Core Traits
//!
//! - [`BusConnector`] - Resolves a bus name and object path into a connection
//! - [`BusConnection`] - An established connection: properties, methods, signals

pub mod connection;
pub mod error;
pub mod names;

pub use connection::{BusConnection, BusConnector, ObjectAddress, PropertiesChanged, PropertyMap};
pub use error::BusError;
pub use names::{BusName, InterfaceName, NameKind, ObjectPath};
