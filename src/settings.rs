//! Settings for the bridge and the bundled passthrough plugin.
//!
//! Handles loading settings from TOML files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::ConfigData;
use crate::error::{Error, Result};

/// Environment variable overriding the log level.
pub const LOG_ENV: &str = "CONFIG_BRIDGE_LOG";

/// Local settings file name.
pub const LOCAL_SETTINGS_FILE: &str = ".config-bridge.toml";

/// Bridge settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server adapter settings
    pub server: ServerSettings,

    /// Transport settings
    pub transport: TransportSettings,

    /// Logging settings
    pub logging: LoggingSettings,

    /// Passthrough plugin settings
    pub passthrough: PassthroughSettings,
}

/// Server adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Abort the native delegate task when its request is cancelled.
    ///
    /// When false the delegate keeps running and its result is discarded.
    pub abort_on_cancel: bool,
}

/// Transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Largest accepted message, in bytes
    pub max_message_bytes: usize,

    /// Capacity of the outgoing message queue
    pub write_queue: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive (e.g. "info", "config_bridge=debug")
    pub level: String,
}

/// Passthrough plugin settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PassthroughSettings {
    /// Attribute names reported by `ConfigAttributes`
    pub attributes: Vec<String>,

    /// Attributes that validation requires
    pub required: Vec<String>,

    /// Values filled in by finalization when missing
    pub defaults: ConfigData,
}

impl Settings {
    /// Load settings from the default location.
    ///
    /// Looks for settings in:
    /// 1. `.config-bridge.toml` in current directory
    /// 2. `~/.config/config-bridge/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self> {
        let local = PathBuf::from(LOCAL_SETTINGS_FILE);
        if local.exists() {
            return Self::load_from_file(&local);
        }

        if let Some(dir) = Self::config_dir() {
            let global = dir.join("config.toml");
            if global.exists() {
                return Self::load_from_file(&global);
            }
        }

        Ok(Self::default())
    }

    /// Load settings from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Settings(format!("{}: {}", path.display(), e)))
    }

    /// Get the settings directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("config-bridge"))
    }

    /// The effective log filter: `CONFIG_BRIDGE_LOG` wins over the file.
    pub fn log_level(&self) -> String {
        std::env::var(LOG_ENV)
            .ok()
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| self.logging.level.clone())
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { abort_on_cancel: true }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self { max_message_bytes: 16 * 1024 * 1024, write_queue: 64 }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "warn".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.server.abort_on_cancel);
        assert_eq!(settings.transport.write_queue, 64);
        assert_eq!(settings.logging.level, "warn");
        assert!(settings.passthrough.attributes.is_empty());
    }

    #[test]
    fn test_settings_serialization() {
        let toml_str = toml::to_string(&Settings::default()).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[transport]"));
    }

    #[test]
    fn test_settings_deserialization() {
        let toml_str = r#"
            [server]
            abort_on_cancel = false

            [passthrough]
            attributes = ["memory", "cpus", "box"]
            required = ["box"]

            [passthrough.defaults]
            memory = 512
        "#;

        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert!(!settings.server.abort_on_cancel);
        assert_eq!(settings.transport.max_message_bytes, 16 * 1024 * 1024);
        assert_eq!(settings.passthrough.attributes, vec!["memory", "cpus", "box"]);
        assert_eq!(settings.passthrough.defaults.get("memory"), Some(&serde_json::json!(512)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();

        let settings = Settings::load_from_file(file.path()).unwrap();
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn test_load_from_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nabort_on_cancel = \"sometimes\"").unwrap();

        let err = Settings::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Settings(ref msg) if msg.contains(&file.path().display().to_string())));
    }

    #[test]
    #[serial]
    fn test_log_env_overrides_file() {
        let settings = Settings::default();

        std::env::set_var(LOG_ENV, "trace");
        assert_eq!(settings.log_level(), "trace");

        std::env::set_var(LOG_ENV, "  ");
        assert_eq!(settings.log_level(), "warn");

        std::env::remove_var(LOG_ENV);
        assert_eq!(settings.log_level(), "warn");
    }
}
