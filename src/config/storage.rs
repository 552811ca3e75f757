//! Configuration storage
//!
//! The configuration is a JSON document. [`Settings`] gives two-level
//! (`section.key`) lookups over it and [`Settings::client_config`] turns it
//! into a validated [`ClientConfig`].

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::types::ClientConfig;

const APP_DIR: &str = "ascmd-client";
const CONFIG_FILE: &str = "config.json";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot determine the configuration directory")]
    NoConfigDir,

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Missing configuration key {section}.{key}")]
    MissingKey { section: String, key: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Directory holding the client configuration.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or(ConfigError::NoConfigDir)
}

/// Default configuration file path.
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Raw configuration document.
#[derive(Debug, Clone)]
pub struct Settings {
    root: Value,
}

impl Settings {
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let root = serde_json::from_str(&text)?;
        info!("[config] loaded {}", path.display());
        Ok(Self { root })
    }

    /// Load the file at the default location.
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&config_file()?)
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&Value> {
        self.root.get(section).and_then(|s| s.get(key))
    }

    /// String value of `section.key`, or `default` when absent.
    pub fn string(
        &self,
        section: &str,
        key: &str,
        default: Option<&str>,
    ) -> Result<String, ConfigError> {
        match self.lookup(section, key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(ConfigError::invalid(
                format!("{}.{}", section, key),
                format!("expected a string, got {}", other),
            )),
            None => default.map(str::to_owned).ok_or_else(|| missing(section, key)),
        }
    }

    /// Boolean value of `section.key`, or `default` when absent.
    pub fn boolean(
        &self,
        section: &str,
        key: &str,
        default: Option<bool>,
    ) -> Result<bool, ConfigError> {
        match self.lookup(section, key) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(ConfigError::invalid(
                format!("{}.{}", section, key),
                format!("expected a boolean, got {}", other),
            )),
            None => default.ok_or_else(|| missing(section, key)),
        }
    }

    /// Fail on the first `(section, key)` that is absent.
    pub fn require(&self, keys: &[(&str, &str)]) -> Result<(), ConfigError> {
        for (section, key) in keys {
            if self.lookup(section, key).is_none() {
                return Err(missing(section, key));
            }
        }
        Ok(())
    }

    /// Typed, validated client configuration.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let config: ClientConfig = serde_json::from_value(self.root.clone())?;
        config.validate()?;
        debug!(
            "[config] protocol {}, {}",
            config.protocol_version,
            match &config.server {
                Some(server) => format!("server {}:{}", server.host, server.port),
                None => format!("local {}", config.local.program),
            }
        );
        Ok(config)
    }
}

fn missing(section: &str, key: &str) -> ConfigError {
    ConfigError::MissingKey {
        section: section.to_string(),
        key: key.to_string(),
    }
}
