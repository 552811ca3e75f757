//! Command Agent — request/response over a duplex byte channel
//!
//! ```text
//! ┌──────────────┐   as_<cmd> lines   ┌─────────────┐
//! │ CommandAgent │ ───writer──────▸   │   ascmd     │
//! │              │ ◂──reader─────     │   process   │
//! └──────────────┘    TLV records     └─────────────┘
//! ```
//!
//! One command is in flight at a time: every operation writes one line and
//! reads exactly one record before returning.

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, Instrument, Span};

use super::error::AgentError;
use crate::protocol::{
    read_record, tag, write_command, CommandResult, MountList, PlatformInfo, SizeSummary, Stat,
};

/// Write side of the channel
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Read side of the channel, buffered for the lifetime of the agent
pub type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

/// Session bootstrap options.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Protocol version, 1 or 2
    pub version: u32,
    /// Target host announced in the v2 session init
    pub host: Option<String>,
    /// Span every command is traced under
    pub span: Span,
}

impl AgentOptions {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            host: None,
            span: Span::none(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

/// Client side of the ascmd protocol.
pub struct CommandAgent {
    writer: BoxedWriter,
    reader: BoxedReader,
    version: u32,
    span: Span,
    initial_info: PlatformInfo,
}

impl CommandAgent {
    /// Bootstrap a session on an established channel.
    ///
    /// Version 2 sends `session_init` first. Both versions then require the
    /// agent's platform info banner. An unsupported version fails before any
    /// byte is written or read.
    pub async fn open<W, R>(writer: W, reader: R, options: AgentOptions) -> Result<Self, AgentError>
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let AgentOptions {
            version,
            host,
            span,
        } = options;
        ensure_supported_version(version)?;

        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        let mut agent = Self {
            writer: Box::new(writer),
            reader: BufReader::new(reader),
            version,
            span: span.clone(),
            initial_info: PlatformInfo::default(),
        };
        agent.bootstrap(host.as_deref()).instrument(span).await?;
        Ok(agent)
    }

    async fn bootstrap(&mut self, host: Option<&str>) -> Result<(), AgentError> {
        if self.version == 2 {
            let mut command = format!("session_init --protocol={}", self.version);
            if let Some(host) = host.filter(|h| !h.is_empty()) {
                command.push_str(&format!(" --host={}", host));
            }
            debug!("[ascmd] -> {}", command);
            write_command(&mut self.writer, &command).await?;
        }

        let record = read_record(&mut self.reader).await?;
        if record.tag != tag::INFO {
            return Err(AgentError::Handshake { tag: record.tag });
        }
        self.initial_info = PlatformInfo::decode(record.value)?;
        debug!(
            "[ascmd] session ready: {} {} (protocol {})",
            self.initial_info.platform, self.initial_info.version, self.initial_info.protocol
        );
        Ok(())
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Platform info received during the handshake.
    pub fn initial_info(&self) -> &PlatformInfo {
        &self.initial_info
    }

    /// Send `command` with quoted `args` and decode the single response.
    pub async fn execute(
        &mut self,
        command: &str,
        args: &[&str],
    ) -> Result<CommandResult, AgentError> {
        let line = command_line(command, args);
        let span = self.span.clone();
        async {
            debug!("[ascmd] -> {}", line);
            write_command(&mut self.writer, &line).await?;
            let record = read_record(&mut self.reader).await?;
            let result = CommandResult::decode(record)?;
            debug!("[ascmd] <- {}", result.kind());
            Ok::<_, AgentError>(result)
        }
        .instrument(span)
        .await
    }

    /// Run a command whose only successful answer is the success marker.
    pub async fn execute_success(
        &mut self,
        command: &'static str,
        args: &[&str],
    ) -> Result<(), AgentError> {
        match self.execute(command, args).await? {
            CommandResult::Success => Ok(()),
            other => Err(unexpected(command, other)),
        }
    }

    /// Platform information.
    pub async fn info(&mut self) -> Result<PlatformInfo, AgentError> {
        match self.execute("info", &[]).await? {
            CommandResult::Info(info) => Ok(info),
            other => Err(unexpected("info", other)),
        }
    }

    /// Entries of a directory, or the single entry when `path` is a file.
    pub async fn list(&mut self, path: &str) -> Result<Vec<Stat>, AgentError> {
        match self.execute("ls", &[path]).await? {
            CommandResult::Listing(entries) => Ok(entries),
            CommandResult::Stat(entry) => Ok(vec![entry]),
            other => Err(unexpected("ls", other)),
        }
    }

    /// Remove a file or an empty directory.
    pub async fn remove(&mut self, path: &str) -> Result<(), AgentError> {
        self.execute_success("rm", &[path]).await
    }

    pub async fn disk_usage(&mut self, path: &str) -> Result<SizeSummary, AgentError> {
        match self.execute("du", &[path]).await? {
            CommandResult::Size(size) => Ok(size),
            other => Err(unexpected("du", other)),
        }
    }

    pub async fn make_directory(&mut self, path: &str) -> Result<(), AgentError> {
        self.execute_success("mkdir", &[path]).await
    }

    pub async fn copy(&mut self, source: &str, destination: &str) -> Result<(), AgentError> {
        self.execute_success("cp", &[source, destination]).await
    }

    /// Move or rename (`mv`).
    pub async fn rename(&mut self, source: &str, destination: &str) -> Result<(), AgentError> {
        self.execute_success("mv", &[source, destination]).await
    }

    /// Mounted filesystems and their usage.
    pub async fn disk_free(&mut self) -> Result<MountList, AgentError> {
        match self.execute("df", &[]).await? {
            CommandResult::Mounts(mounts) => Ok(mounts),
            other => Err(unexpected("df", other)),
        }
    }

    /// MD5 hex digest of a file.
    pub async fn checksum(&mut self, path: &str) -> Result<String, AgentError> {
        match self.execute("md5sum", &[path]).await? {
            CommandResult::Checksum(digest) => Ok(digest),
            other => Err(unexpected("md5sum", other)),
        }
    }

    /// Ask the agent to exit. No response is read; the transport still has
    /// to be reclaimed by the caller.
    pub async fn terminate(&mut self) -> Result<(), AgentError> {
        let span = self.span.clone();
        async {
            debug!("[ascmd] -> exit");
            write_command(&mut self.writer, "exit").await?;
            Ok::<_, AgentError>(())
        }
        .instrument(span)
        .await
    }

    /// Give the channel back, e.g. to close it or drain it.
    pub fn into_parts(self) -> (BoxedWriter, BoxedReader) {
        (self.writer, self.reader)
    }
}

/// Fail unless `version` is a protocol version this client speaks.
pub fn ensure_supported_version(version: u32) -> Result<(), AgentError> {
    match version {
        1 | 2 => Ok(()),
        other => Err(AgentError::UnsupportedVersion(other)),
    }
}

/// Map a result an operation did not ask for to the right error.
fn unexpected(operation: &'static str, result: CommandResult) -> AgentError {
    match result {
        CommandResult::Error(error) => AgentError::Remote(error),
        other => AgentError::UnexpectedResult {
            operation,
            got: other.kind(),
        },
    }
}

/// Command verb followed by its quoted arguments.
fn command_line(command: &str, args: &[&str]) -> String {
    let mut line = command.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&quote_arg(arg));
    }
    line
}

/// Double-quote an argument, escaping `\` and `"`.
pub fn quote_arg(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '\\' || c == '"' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
