//! SSH transport — ascmd started through an SSH exec channel
//!
//! Workflow:
//! 1. Connect and check the host key (SHA-256 fingerprint pinning)
//! 2. Password authentication
//! 3. Open a session channel and exec `ascmd [-V<n>]`
//! 4. Bootstrap the agent over the channel stream, announcing the host
//!
//! A pump task owns the read half of the channel: it forwards stdout to the
//! agent, logs stderr and records the remote exit status. Closing sends
//! `exit`, waits for the pump to see the channel close, checks the exit
//! status and then disconnects the SSH session.

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{HashAlg, PublicKey};
use russh::{ChannelMsg, ChannelReadHalf, Disconnect};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};

use super::error::TransportError;
use super::local::AGENT_PROGRAM;
use super::{version_flag, AgentTransport};
use crate::agent::{ensure_supported_version, AgentOptions, CommandAgent};

/// Default SSH port of transfer servers
pub const DEFAULT_SSH_PORT: u16 = 33001;

/// Buffer between the pump task and the agent's reader
const PUMP_BUFFER_SIZE: usize = 64 * 1024;

/// How to reach the remote agent.
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Expected host key fingerprint (`SHA256:...`); any key is accepted when unset
    pub host_key_fingerprint: Option<String>,
    pub program: String,
    pub version: u32,
}

impl SshOptions {
    pub fn new(host: impl Into<String>, username: impl Into<String>, version: u32) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            password: String::new(),
            host_key_fingerprint: None,
            program: AGENT_PROGRAM.to_string(),
            version,
        }
    }

    /// Remote command line starting the agent.
    pub fn remote_command(&self) -> String {
        match version_flag(self.version) {
            Some(flag) => format!("{} {}", self.program, flag),
            None => self.program.clone(),
        }
    }
}

/// russh client callbacks.
struct ClientHandler {
    host: String,
    expected_fingerprint: Option<String>,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        match &self.expected_fingerprint {
            None => {
                warn!(
                    "[ascmd-ssh] accepting unverified host key {} for {}",
                    fingerprint, self.host
                );
                Ok(true)
            }
            Some(expected) if *expected == fingerprint => Ok(true),
            Some(expected) => {
                warn!(
                    "[ascmd-ssh] host key mismatch for {}: expected {}, got {}",
                    self.host, expected, fingerprint
                );
                Ok(false)
            }
        }
    }
}

/// Source of channel messages for the pump.
#[async_trait]
trait ChannelEvents: Send {
    async fn next_message(&mut self) -> Option<ChannelMsg>;
}

#[async_trait]
impl ChannelEvents for ChannelReadHalf {
    async fn next_message(&mut self) -> Option<ChannelMsg> {
        self.wait().await
    }
}

/// Forward channel data into `sink` until the channel closes.
///
/// Returns the exit status sent by the remote side, if any. The status may
/// arrive after EOF, so the pump keeps running until the channel is closed.
async fn pump_channel<E: ChannelEvents>(mut events: E, sink: DuplexStream) -> Option<u32> {
    let mut sink = Some(sink);
    let mut exit_status = None;
    while let Some(msg) = events.next_message().await {
        match msg {
            ChannelMsg::Data { data } => {
                if let Some(out) = sink.as_mut() {
                    if out.write_all(&data[..]).await.is_err() {
                        debug!("[ascmd-ssh] agent reader gone, discarding output");
                        sink = None;
                    }
                }
            }
            ChannelMsg::ExtendedData { data, ext: 1 } => {
                for line in String::from_utf8_lossy(&data[..]).lines() {
                    debug!("[ascmd-stderr] {}", line);
                }
            }
            ChannelMsg::ExitStatus { exit_status: code } => {
                info!("[ascmd-ssh] agent exited with status {}", code);
                exit_status = Some(code);
            }
            ChannelMsg::Eof => {
                // Dropping the sink delivers EOF to the agent's reader
                sink = None;
            }
            ChannelMsg::Close => break,
            _ => {}
        }
    }
    exit_status
}

/// Map the remote exit status to the close outcome.
fn check_exit_status(status: Option<u32>) -> Result<(), TransportError> {
    match status {
        Some(0) => Ok(()),
        Some(code) => Err(TransportError::RemoteExited(code)),
        None => {
            warn!("[ascmd-ssh] channel closed without an exit status");
            Ok(())
        }
    }
}

/// A bootstrapped agent running behind an SSH session.
pub struct SshTransport {
    agent: CommandAgent,
    handle: Handle<ClientHandler>,
    pump: JoinHandle<Option<u32>>,
    span: Span,
}

impl SshTransport {
    pub async fn connect(options: &SshOptions, span: Span) -> Result<Self, TransportError> {
        ensure_supported_version(options.version)?;

        let config = Arc::new(client::Config::default());
        let handler = ClientHandler {
            host: options.host.clone(),
            expected_fingerprint: options.host_key_fingerprint.clone(),
        };
        info!(
            parent: &span,
            "[ascmd-ssh] connecting to {}@{}:{}", options.username, options.host, options.port
        );
        let mut handle =
            client::connect(config, (options.host.as_str(), options.port), handler).await?;

        let auth = handle
            .authenticate_password(options.username.clone(), options.password.clone())
            .await?;
        if !auth.success() {
            return Err(TransportError::AuthRejected(options.username.clone()));
        }

        let channel = handle.channel_open_session().await?;
        let command = options.remote_command();
        debug!(parent: &span, "[ascmd-ssh] exec {}", command);
        channel.exec(true, command.as_str()).await?;

        let (read_half, write_half) = channel.split();
        let (sink, read) = tokio::io::duplex(PUMP_BUFFER_SIZE);
        let pump = tokio::spawn(pump_channel(read_half, sink).instrument(span.clone()));
        let write = write_half.make_writer();

        let agent_options = AgentOptions::new(options.version)
            .with_host(options.host.clone())
            .with_span(span.clone());
        let agent = match CommandAgent::open(write, read, agent_options).await {
            Ok(agent) => agent,
            Err(e) => {
                pump.abort();
                return Err(e.into());
            }
        };

        Ok(Self {
            agent,
            handle,
            pump,
            span,
        })
    }
}

#[async_trait]
impl AgentTransport for SshTransport {
    fn agent(&mut self) -> &mut CommandAgent {
        &mut self.agent
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        let SshTransport {
            mut agent,
            handle,
            pump,
            span,
        } = *self;

        let sent = agent.terminate().await;
        drop(agent);

        let exited = match &sent {
            // The pump ends once the agent has exited and the channel closed
            Ok(()) => match pump.await {
                Ok(status) => check_exit_status(status),
                Err(e) => {
                    warn!(parent: &span, "[ascmd-ssh] channel pump failed: {}", e);
                    Ok(())
                }
            },
            Err(e) => {
                warn!(parent: &span, "[ascmd-ssh] failed to send exit: {}", e);
                pump.abort();
                Ok(())
            }
        };

        handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        info!(parent: &span, "[ascmd-ssh] session closed");
        sent.map_err(TransportError::from)?;
        exited
    }
}
