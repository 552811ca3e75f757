//! Logging setup
//!
//! Components log through `tracing`; the subscriber is installed once by
//! the application. Each agent session gets its own span so records from
//! concurrent sessions can be told apart.

use tracing::{debug, info_span, Span};
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` wins over `default_level`.
///
/// Returns false when a global subscriber was already installed.
pub fn init(default_level: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    match tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        Ok(()) => true,
        Err(e) => {
            debug!("[logging] subscriber already installed: {}", e);
            false
        }
    }
}

/// Span for one agent session.
pub fn session_span(peer: &str) -> Span {
    info_span!("ascmd", peer = %peer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_installs_once() {
        init("debug");
        assert!(!init("debug"));
    }

    #[test]
    fn test_session_span_is_named() {
        let span = session_span("hsts.example.com");
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "ascmd");
        }
    }
}
