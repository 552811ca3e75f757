//! Agent transports
//!
//! A transport owns whatever keeps the agent alive (a child process, an SSH
//! session) next to the [`CommandAgent`] talking to it. Callers use the agent
//! through [`AgentTransport::agent`] and must always finish with
//! [`AgentTransport::close`], which sends `exit` and reclaims the resources
//! even if sending `exit` fails.

mod error;
mod local;
mod ssh;

use async_trait::async_trait;

use crate::agent::CommandAgent;
use crate::config::ClientConfig;
use crate::logging::session_span;

pub use error::TransportError;
pub use local::{LocalOptions, LocalTransport, AGENT_PROGRAM};
pub use ssh::{SshOptions, SshTransport, DEFAULT_SSH_PORT};

/// Capability shared by local and remote agents.
#[async_trait]
pub trait AgentTransport: Send {
    /// The bootstrapped agent.
    fn agent(&mut self) -> &mut CommandAgent;

    /// Terminate the agent and release the transport.
    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}

/// Command-line flag selecting the protocol version; version 1 has none.
pub(crate) fn version_flag(version: u32) -> Option<String> {
    (version != 1).then(|| format!("-V{}", version))
}

/// Open the agent described by `config`: over SSH when a server is
/// configured, as a local process otherwise.
pub async fn connect(config: &ClientConfig) -> Result<Box<dyn AgentTransport>, TransportError> {
    match &config.server {
        Some(server) => {
            let options = SshOptions {
                host: server.host.clone(),
                port: server.port,
                username: server.username.clone(),
                password: server.password.clone(),
                host_key_fingerprint: server.host_key_fingerprint.clone(),
                program: server.program.clone(),
                version: config.protocol_version,
            };
            let span = session_span(&server.host);
            Ok(Box::new(SshTransport::connect(&options, span).await?))
        }
        None => {
            let options = LocalOptions {
                program: config.local.program.clone(),
                args: config.local.args.clone(),
                version: config.protocol_version,
            };
            let span = session_span("localhost");
            Ok(Box::new(LocalTransport::spawn(&options, span).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_flag() {
        assert_eq!(version_flag(1), None);
        assert_eq!(version_flag(2).as_deref(), Some("-V2"));
    }
}
