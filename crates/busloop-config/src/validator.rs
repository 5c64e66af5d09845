//! Configuration validation.

use std::collections::HashSet;

use busloop_protocols::{BusName, InterfaceName, ObjectPath};

use crate::error::ConfigError;
use crate::schema::Config;

/// The service every in-memory bus exports for itself.
const BUS_DAEMON_SERVICE: &str = "org.freedesktop.DBus";

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_runloop(config, &mut result);
        Self::validate_target(config, &mut result);
        Self::validate_probe(config, &mut result);
        Self::validate_services(config, &mut result);

        result
    }

    fn validate_runloop(config: &Config, result: &mut ValidationResult) {
        let name = &config.runloop.thread_name;
        if name.is_empty() {
            result.add_error(ValidationError::new(
                "runloop.thread_name",
                "Thread name cannot be empty",
            ));
        } else if name.contains('\0') {
            result.add_error(ValidationError::new(
                "runloop.thread_name",
                "Thread name cannot contain NUL bytes",
            ));
        }
    }

    fn validate_target(config: &Config, result: &mut ValidationResult) {
        if let Err(e) = BusName::new(config.target.service.as_str()) {
            result.add_error(ValidationError::new("target.service", e.to_string()));
        }
        if let Err(e) = ObjectPath::new(config.target.path.as_str()) {
            result.add_error(ValidationError::new("target.path", e.to_string()));
        }

        let known = config.target.service == BUS_DAEMON_SERVICE
            || config
                .services
                .iter()
                .any(|s| s.name == config.target.service);
        if !known {
            result.add_warning(ValidationWarning::new(
                "target.service",
                format!(
                    "Service '{}' is not configured, connecting to it will fail",
                    config.target.service
                ),
            ));
        }
    }

    fn validate_probe(config: &Config, result: &mut ValidationResult) {
        if config.probe.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "probe.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }
    }

    fn validate_services(config: &Config, result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (i, service) in config.services.iter().enumerate() {
            let prefix = format!("services[{}]", i);

            if let Err(e) = BusName::new(service.name.as_str()) {
                result.add_error(ValidationError::new(format!("{}.name", prefix), e.to_string()));
            }
            if !seen.insert(service.name.as_str()) {
                result.add_error(ValidationError::new(
                    format!("{}.name", prefix),
                    format!("Service '{}' is configured more than once", service.name),
                ));
            }
            if service.objects.is_empty() {
                result.add_warning(ValidationWarning::new(
                    format!("{}.objects", prefix),
                    format!("Service '{}' exports no objects", service.name),
                ));
            }

            for (j, object) in service.objects.iter().enumerate() {
                if let Err(e) = ObjectPath::new(object.path.as_str()) {
                    result.add_error(ValidationError::new(
                        format!("{}.objects[{}].path", prefix, j),
                        e.to_string(),
                    ));
                }
                if let Err(e) = InterfaceName::new(object.interface.as_str()) {
                    result.add_error(ValidationError::new(
                        format!("{}.objects[{}].interface", prefix, j),
                        e.to_string(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
