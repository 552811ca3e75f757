//! Configuration Management Module
//!
//! Loads the client configuration (protocol version, local agent, SSH
//! server) from a JSON file and validates it up front, so that a bad file is
//! reported at startup instead of in the middle of a session.

pub mod storage;
pub mod types;

pub use storage::{config_dir, config_file, ConfigError, Settings};
pub use types::{ClientConfig, LocalConfig, ServerConfig, DEFAULT_PROTOCOL_VERSION};
