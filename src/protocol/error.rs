//! Protocol error types

use std::io;

use thiserror::Error;

/// Errors raised while deframing or decoding agent responses.
///
/// `Truncated` is a framing error: the stream ended inside a record and the
/// channel is no longer usable. Every other variant is a decode error on a
/// record that was framed correctly.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Truncated record: failed to read {what}: {source}")]
    Truncated {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Unknown tag {tag} in {context}")]
    UnknownTag { context: &'static str, tag: u8 },

    #[error("Field `{field}` is not zero-terminated")]
    MissingTerminator { field: &'static str },

    #[error("Field `{field}` is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("Field `{field}` must be {expected} bytes, got {actual}")]
    WrongWidth {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Mount field `{field}` appears before any filesystem id")]
    OrphanMountField { field: &'static str },

    #[error("Empty response")]
    EmptyResponse,
}

impl ProtocolError {
    /// Whether the error happened while framing, i.e. the stream itself is broken.
    pub fn is_framing(&self) -> bool {
        matches!(self, ProtocolError::Truncated { .. })
    }

    pub(crate) fn truncated(what: &'static str, source: io::Error) -> Self {
        ProtocolError::Truncated { what, source }
    }
}
