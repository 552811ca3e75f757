//! Local transport — ascmd as a child process
//!
//! The agent runs with its stdin/stdout piped to the [`CommandAgent`].
//! `SSH_CLIENT` is forced to an empty value so the agent does not behave as
//! if it had been started by a remote SSH login.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{info, warn, Span};

use super::error::TransportError;
use super::{version_flag, AgentTransport};
use crate::agent::{ensure_supported_version, AgentOptions, CommandAgent};

/// Default agent executable
pub const AGENT_PROGRAM: &str = "ascmd";

/// How to start the local agent.
#[derive(Debug, Clone)]
pub struct LocalOptions {
    pub program: String,
    /// Arguments placed before the version flag
    pub args: Vec<String>,
    pub version: u32,
}

impl LocalOptions {
    pub fn new(version: u32) -> Self {
        Self {
            program: AGENT_PROGRAM.to_string(),
            args: Vec::new(),
            version,
        }
    }
}

/// A bootstrapped agent running as a local child process.
pub struct LocalTransport {
    agent: CommandAgent,
    child: Child,
    span: Span,
}

impl LocalTransport {
    /// Start the agent and complete the session bootstrap.
    pub async fn spawn(options: &LocalOptions, span: Span) -> Result<Self, TransportError> {
        ensure_supported_version(options.version)?;

        let mut command = Command::new(&options.program);
        command
            .args(&options.args)
            .env("SSH_CLIENT", "")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(flag) = version_flag(options.version) {
            command.arg(flag);
        }

        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            program: options.program.clone(),
            source,
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or(TransportError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(TransportError::MissingPipe("stdout"))?;
        info!(
            parent: &span,
            "[ascmd-local] started {} (pid {:?})",
            options.program,
            child.id()
        );

        let agent_options = AgentOptions::new(options.version).with_span(span.clone());
        let agent = match CommandAgent::open(stdin, stdout, agent_options).await {
            Ok(agent) => agent,
            Err(e) => {
                if let Err(kill_err) = child.kill().await {
                    warn!(parent: &span, "[ascmd-local] failed to kill agent: {}", kill_err);
                }
                return Err(e.into());
            }
        };

        Ok(Self { agent, child, span })
    }
}

#[async_trait]
impl AgentTransport for LocalTransport {
    fn agent(&mut self) -> &mut CommandAgent {
        &mut self.agent
    }

    /// Send `exit`, close stdin and wait for the process. A nonzero exit
    /// status is an error.
    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        let LocalTransport {
            mut agent,
            mut child,
            span,
        } = *self;

        let sent = agent.terminate().await;
        if let Err(e) = &sent {
            warn!(parent: &span, "[ascmd-local] failed to send exit: {}", e);
        }
        // Dropping the agent closes the child's stdin
        drop(agent);

        let status = child.wait().await.map_err(TransportError::Wait)?;
        if !status.success() {
            return Err(TransportError::Exited(status));
        }
        info!(parent: &span, "[ascmd-local] agent exited successfully");
        sent.map_err(TransportError::from)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;

    /// Minimal protocol-1 agent: banner, then answers mkdir with success and
    /// everything else with an empty command error.
    const FAKE_AGENT: &str = r#"
printf '\005\000\000\000\000'
while read line; do
  case "$line" in
    as_exit) exit ${FAKE_EXIT_CODE:-0} ;;
    as_mkdir*) printf '\006\000\000\000\000' ;;
    *) printf '\004\000\000\000\000' ;;
  esac
done
"#;

    fn fake_agent(dir: &Path, exit_code: u8) -> LocalOptions {
        let script = dir.join("fake_ascmd.sh");
        let body = format!("FAKE_EXIT_CODE={}\n{}", exit_code, FAKE_AGENT);
        std::fs::write(&script, body).unwrap();
        LocalOptions {
            program: "sh".to_string(),
            args: vec![script.display().to_string()],
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_local_session_lifecycle() {
        let dir = TempDir::new().unwrap();
        let options = fake_agent(dir.path(), 0);

        let mut transport = LocalTransport::spawn(&options, Span::none()).await.unwrap();
        transport.agent().make_directory("/tmp/x").await.unwrap();

        let err = transport.agent().remove("/tmp/x").await.unwrap_err();
        assert!(err.remote().is_some());

        Box::new(transport).close().await.unwrap();
    }

    #[tokio::test]
    async fn test_local_nonzero_exit_is_error() {
        let dir = TempDir::new().unwrap();
        let options = fake_agent(dir.path(), 3);

        let transport = LocalTransport::spawn(&options, Span::none()).await.unwrap();
        let err = Box::new(transport).close().await.unwrap_err();
        assert!(matches!(err, TransportError::Exited(status) if status.code() == Some(3)));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let options = LocalOptions {
            program: "/nonexistent/ascmd".to_string(),
            args: Vec::new(),
            version: 1,
        };
        let err = LocalTransport::spawn(&options, Span::none()).await.err().unwrap();
        assert!(matches!(err, TransportError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_version_does_not_spawn() {
        let options = LocalOptions {
            program: "/nonexistent/ascmd".to_string(),
            args: Vec::new(),
            version: 7,
        };
        let err = LocalTransport::spawn(&options, Span::none()).await.err().unwrap();
        assert!(matches!(
            err,
            TransportError::Agent(crate::agent::AgentError::UnsupportedVersion(7))
        ));
    }
}
