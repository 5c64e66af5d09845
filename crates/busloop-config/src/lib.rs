//! # busloop Config
//!
//! TOML configuration for the busloop CLI: loop settings, the target bus
//! object, and the services seeded into the in-memory bus.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
