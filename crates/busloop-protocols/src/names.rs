//! Validated bus identifiers.
//!
//! Names follow the D-Bus naming rules so that malformed identifiers are
//! rejected before any connection attempt is made.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BusError;

const MAX_NAME_LEN: usize = 255;

/// Which kind of identifier failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    BusName,
    ObjectPath,
    InterfaceName,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::BusName => write!(f, "bus name"),
            NameKind::ObjectPath => write!(f, "object path"),
            NameKind::InterfaceName => write!(f, "interface name"),
        }
    }
}

macro_rules! validated_name {
    ($(#[$meta:meta])* $name:ident, $validate:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a name.
            pub fn new(name: impl Into<String>) -> Result<Self, BusError> {
                let name = name.into();
                $validate(&name)?;
                Ok(Self(name))
            }

            /// Borrow the name as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = BusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = BusError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

validated_name!(
    /// A unique (`:1.42`) or well-known (`org.freedesktop.DBus`) bus name.
    BusName,
    validate_bus_name
);

validated_name!(
    /// An object path such as `/org/freedesktop/DBus`.
    ObjectPath,
    validate_object_path
);

validated_name!(
    /// An interface name such as `net.connman.Clock`.
    InterfaceName,
    validate_interface_name
);

impl BusName {
    /// Whether this is a connection-unique name assigned by the bus.
    pub fn is_unique(&self) -> bool {
        self.0.starts_with(':')
    }
}

impl ObjectPath {
    /// The root object path `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }
}

fn check_length(kind: NameKind, name: &str) -> Result<(), BusError> {
    if name.is_empty() {
        return Err(BusError::invalid(kind, name, "must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(BusError::invalid(
            kind,
            name,
            format!("exceeds {} characters", MAX_NAME_LEN),
        ));
    }
    Ok(())
}

fn check_dotted(
    kind: NameKind,
    name: &str,
    body: &str,
    allow_dash: bool,
    allow_leading_digit: bool,
) -> Result<(), BusError> {
    let elements: Vec<&str> = body.split('.').collect();
    if elements.len() < 2 {
        return Err(BusError::invalid(kind, name, "needs at least two elements"));
    }
    for element in elements {
        let Some(first) = element.chars().next() else {
            return Err(BusError::invalid(kind, name, "contains an empty element"));
        };
        if !allow_leading_digit && first.is_ascii_digit() {
            return Err(BusError::invalid(kind, name, "element starts with a digit"));
        }
        let valid = element
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || (allow_dash && c == '-'));
        if !valid {
            return Err(BusError::invalid(kind, name, "contains an invalid character"));
        }
    }
    Ok(())
}

fn validate_bus_name(name: &str) -> Result<(), BusError> {
    check_length(NameKind::BusName, name)?;
    match name.strip_prefix(':') {
        Some(unique) => check_dotted(NameKind::BusName, name, unique, true, true),
        None => check_dotted(NameKind::BusName, name, name, true, false),
    }
}

fn validate_interface_name(name: &str) -> Result<(), BusError> {
    check_length(NameKind::InterfaceName, name)?;
    check_dotted(NameKind::InterfaceName, name, name, false, false)
}

fn validate_object_path(path: &str) -> Result<(), BusError> {
    let kind = NameKind::ObjectPath;
    let Some(rest) = path.strip_prefix('/') else {
        return Err(BusError::invalid(kind, path, "must start with '/'"));
    };
    if rest.is_empty() {
        return Ok(());
    }
    if rest.ends_with('/') {
        return Err(BusError::invalid(kind, path, "must not end with '/'"));
    }
    for element in rest.split('/') {
        if element.is_empty() {
            return Err(BusError::invalid(kind, path, "contains an empty element"));
        }
        if !element.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(BusError::invalid(kind, path, "contains an invalid character"));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "names_tests.rs"]
mod tests;
