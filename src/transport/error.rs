//! Transport error types

use std::io;
use std::process::ExitStatus;

use thiserror::Error;

use crate::agent::AgentError;

/// Errors raised while establishing or releasing an agent transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to start agent `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Agent {0} pipe not available")]
    MissingPipe(&'static str),

    #[error("Agent exited with {0}")]
    Exited(ExitStatus),

    #[error("Remote agent exited with status {0}")]
    RemoteExited(u32),

    #[error("Failed to wait for agent: {0}")]
    Wait(#[source] io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("Authentication rejected for user {0}")]
    AuthRejected(String),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}
