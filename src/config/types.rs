//! Configuration Types

use serde::{Deserialize, Serialize};

use super::storage::ConfigError;
use crate::transport::{AGENT_PROGRAM, DEFAULT_SSH_PORT};

/// Protocol version used when the file does not name one
pub const DEFAULT_PROTOCOL_VERSION: u32 = 1;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// ascmd protocol version (1 or 2)
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,

    /// Fallback log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Local agent settings, used when no server is configured
    #[serde(default)]
    pub local: LocalConfig,

    /// Remote server reached over SSH
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

/// Local agent process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
        }
    }
}

/// SSH server running the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Pinned host key, e.g. `SHA256:...`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key_fingerprint: Option<String>,

    /// Agent executable on the server
    #[serde(default = "default_program")]
    pub program: String,
}

fn default_protocol_version() -> u32 {
    DEFAULT_PROTOCOL_VERSION
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_program() -> String {
    AGENT_PROGRAM.to_string()
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            log_level: default_log_level(),
            local: LocalConfig::default(),
            server: None,
        }
    }
}

impl ClientConfig {
    /// Check every value the transports rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.protocol_version, 1 | 2) {
            return Err(ConfigError::invalid(
                "protocol_version",
                format!("{} is not 1 or 2", self.protocol_version),
            ));
        }
        if self.local.program.trim().is_empty() {
            return Err(ConfigError::invalid("local.program", "must not be empty"));
        }
        if let Some(server) = &self.server {
            if server.host.trim().is_empty() {
                return Err(ConfigError::MissingKey {
                    section: "server".to_string(),
                    key: "host".to_string(),
                });
            }
            if server.username.trim().is_empty() {
                return Err(ConfigError::MissingKey {
                    section: "server".to_string(),
                    key: "username".to_string(),
                });
            }
            if server.port == 0 {
                return Err(ConfigError::invalid("server.port", "must not be 0"));
            }
            if let Some(fingerprint) = &server.host_key_fingerprint {
                if !fingerprint.starts_with("SHA256:") {
                    return Err(ConfigError::invalid(
                        "server.host_key_fingerprint",
                        "expected a SHA256:... fingerprint",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.protocol_version, 1);
        assert_eq!(config.local.program, "ascmd");
        assert!(config.server.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_server_defaults() {
        let json = r#"{"protocol_version": 2, "server": {"host": "hsts.example.com", "username": "xfer"}}"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();
        let server = config.server.as_ref().unwrap();
        assert_eq!(server.port, DEFAULT_SSH_PORT);
        assert_eq!(server.program, "ascmd");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ClientConfig {
            protocol_version: 3,
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.protocol_version = 2;
        config.server = Some(ServerConfig {
            host: "hsts.example.com".to_string(),
            port: 22,
            username: " ".to_string(),
            password: String::new(),
            host_key_fingerprint: None,
            program: "ascmd".to_string(),
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingKey { ref key, .. }) if key == "username"
        ));
    }
}
