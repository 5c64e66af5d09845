//! Configuration loader.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a file, or the defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.busloop`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.runloop.thread_name, "busloop");
    }

    #[test]
    fn test_load_target() {
        let content = r#"
            [target]
            service = "net.connman"
            path = "/"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.target.service, "net.connman");
        assert_eq!(config.target.path, "/");
    }

    #[test]
    fn test_load_services() {
        let content = r#"
            [[services]]
            name = "net.connman"

            [[services.objects]]
            path = "/"
            interface = "net.connman.Clock"

            [services.objects.properties]
            TimeUpdates = "auto"
            Timeservers = ["pool.ntp.org"]
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.services.len(), 1);
        let object = &config.services[0].objects[0];
        assert_eq!(object.interface, "net.connman.Clock");
        assert_eq!(object.properties["TimeUpdates"], "auto");
        assert_eq!(object.properties["Timeservers"][0], "pool.ntp.org");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[runloop]").unwrap();
        writeln!(file, "thread_name = \"bus-worker\"").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.runloop.thread_name, "bus-worker");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/busloop.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            ConfigLoader::load_or_default(Path::new("/nonexistent/path/busloop.toml")).unwrap();
        assert_eq!(config.target.service, "org.freedesktop.DBus");
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: This test runs in isolation and sets a unique test-only env var
        unsafe {
            std::env::set_var("BUSLOOP_TEST_SERVICE", "net.connman");
        }
        let content = "[target]\nservice = \"${BUSLOOP_TEST_SERVICE}\"";
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.target.service, "net.connman");
        unsafe {
            std::env::remove_var("BUSLOOP_TEST_SERVICE");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${NONEXISTENT_BUSLOOP_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        let content = "value = \"no variables here\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert_eq!(expanded, content);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = ConfigLoader::expand_path("~/logs");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/logs"));
    }
}
