//! Bus errors.

use thiserror::Error;

use crate::names::NameKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Service unknown: {0}")]
    ServiceUnknown(String),

    #[error("Unknown object {path} on {service}")]
    UnknownObject { service: String, path: String },

    #[error("Unknown interface {interface} at {path}")]
    UnknownInterface { path: String, interface: String },

    #[error("Unknown method {interface}.{method}")]
    UnknownMethod { interface: String, method: String },

    #[error("Invalid {kind} '{name}': {reason}")]
    InvalidName {
        kind: NameKind,
        name: String,
        reason: String,
    },

    #[error("Connection closed")]
    Disconnected,

    #[error("Call failed: {0}")]
    Failed(String),
}

impl BusError {
    pub(crate) fn invalid(kind: NameKind, name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_unknown_error() {
        let err = BusError::ServiceUnknown("invalid.bus.name".to_string());
        let display = err.to_string();
        assert!(display.contains("Service unknown"));
        assert!(display.contains("invalid.bus.name"));
    }

    #[test]
    fn test_unknown_object_error() {
        let err = BusError::UnknownObject {
            service: "net.connman".to_string(),
            path: "/missing".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("/missing"));
        assert!(display.contains("net.connman"));
    }

    #[test]
    fn test_unknown_method_error() {
        let err = BusError::UnknownMethod {
            interface: "net.connman.Clock".to_string(),
            method: "SetTime".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown method net.connman.Clock.SetTime");
    }

    #[test]
    fn test_invalid_name_error() {
        let err = BusError::invalid(NameKind::ObjectPath, "no/slash", "must start with '/'");
        let display = err.to_string();
        assert!(display.contains("object path"));
        assert!(display.contains("no/slash"));
        assert!(display.contains("must start with '/'"));
    }

    #[test]
    fn test_disconnected_error() {
        assert!(BusError::Disconnected.to_string().contains("closed"));
    }
}
