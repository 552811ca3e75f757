//! Command agent errors

use std::io;

use thiserror::Error;

use crate::protocol::{CommandError, ProtocolError, ResultKind};

/// Errors returned by [`CommandAgent`](super::CommandAgent) operations.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Unsupported protocol version: {0} (expected 1 or 2)")]
    UnsupportedVersion(u32),

    #[error("Handshake failed: expected platform info, got tag {tag}")]
    Handshake { tag: u8 },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Channel write failed: {0}")]
    Io(#[from] io::Error),

    #[error("Remote error {}: {}", .0.code, .0.message)]
    Remote(CommandError),

    #[error("Unexpected {got} in response to {operation}")]
    UnexpectedResult {
        operation: &'static str,
        got: ResultKind,
    },
}

impl AgentError {
    /// The error reported by the agent, if this is a remote application error.
    pub fn remote(&self) -> Option<&CommandError> {
        match self {
            AgentError::Remote(error) => Some(error),
            _ => None,
        }
    }

    /// Whether the agent must be discarded after this error.
    ///
    /// Only remote application errors leave the channel in a known state.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AgentError::Remote(_))
    }
}
