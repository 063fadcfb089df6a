//! Domain-specific error types for the stereolink protocol.
//!
//! All fallible operations return `Result<T, StreamError>`.
//! No panics on invalid input; every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the stereolink server.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// Received bytes that do not start with the control sentinel.
    #[error("invalid control sentinel")]
    InvalidSentinel,

    /// The peer closed the connection mid-exchange.
    #[error("peer closed connection")]
    PeerClosed,

    /// A telemetry record was shorter than the fixed wire layout.
    #[error("truncated record: expected {expected} bytes, got {actual}")]
    TruncatedRecord { expected: usize, actual: usize },

    /// A protocol rule was violated.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Payload Errors ───────────────────────────────────────────
    /// The combined compressed payload exceeds the send capacity.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Frame dimensions were zero or otherwise unusable.
    #[error("invalid frame size: {width}x{height}x{depth}")]
    InvalidFrameSize { width: u32, height: u32, depth: u32 },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Encoding Errors ──────────────────────────────────────────
    /// Frame compression failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// A worker task did not report `Running` within the grace period.
    #[error("worker task failed to start within {0:?}")]
    StartTimeout(Duration),

    /// A worker task did not self-terminate within the grace period.
    /// Non-fatal: the task is aborted as a best-effort fallback.
    #[error("worker task did not terminate within {0:?}")]
    ShutdownTimeout(Duration),

    /// Adapter enumeration failed.
    #[error("adapter enumeration failed: {0}")]
    Adapters(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for StreamError {
    fn from(s: String) -> Self {
        StreamError::Other(s)
    }
}

impl From<&str> for StreamError {
    fn from(s: &str) -> Self {
        StreamError::Other(s.to_string())
    }
}
