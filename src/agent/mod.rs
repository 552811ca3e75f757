//! ascmd Command Agent
//!
//! Drives one ascmd session over a duplex byte channel handed over by a
//! transport (see [`crate::transport`]): bootstrap, then one request/response
//! round trip per operation.

mod command;
mod error;

pub use command::{
    ensure_supported_version, quote_arg, AgentOptions, BoxedReader, BoxedWriter, CommandAgent,
};
pub use error::AgentError;
