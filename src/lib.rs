//! Client for the ascmd agent protocol
//!
//! ascmd performs filesystem operations (stat, list, copy, move, delete,
//! checksum, disk usage, mkdir, disk free) on behalf of a client that talks to
//! it over its standard streams, either as a local child process or through
//! an SSH exec channel.
//!
//! - [`protocol`]: TLV codec and response decoders
//! - [`agent`]: session bootstrap and the per-operation API
//! - [`transport`]: local process and SSH transports
//! - [`config`]: JSON configuration
//! - [`logging`]: subscriber setup and session spans

pub mod agent;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod transport;

pub use agent::{AgentError, AgentOptions, CommandAgent};
pub use protocol::{CommandResult, MountList, PlatformInfo, ProtocolError, SizeSummary, Stat};
pub use transport::{connect, AgentTransport, TransportError};
