//! Framed wire protocol shared by both directions of the stream.
//!
//! Every message begins with a fixed 4-byte control sentinel.
//!
//! ## Wire format
//!
//! **Client → server** (fixed length):
//! ```text
//! sentinel:   [u8; 4]
//! telemetry:  [u8; TelemetryRecord::SIZE]
//! ```
//!
//! **Server → client** (image streaming enabled):
//! ```text
//! sentinel:   [u8; 4]
//! left_size:  u32  (4, little-endian)
//! right_size: u32  (4, little-endian)
//! payload:    [u8] (left_size + right_size compressed bytes)
//! ```
//!
//! With streaming disabled the sentinel alone is the whole response.
//!
//! All reads and writes go through partial-I/O loops: a single socket
//! operation may move fewer bytes than requested, and each field must
//! complete within [`EXCHANGE_DEADLINE`] of wall-clock time or the cycle
//! fails with [`StreamError::Timeout`].

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::StreamError;

/// Fixed 4-byte marker prefixing every protocol message.
pub const CONTROL_SENTINEL: [u8; 4] = [0xFF, 0x00, 0xFF, 0x00];

/// Wall-clock budget for completing one framed field group.
pub const EXCHANGE_DEADLINE: Duration = Duration::from_secs(1);

/// Byte length of the two little-endian compressed-size fields.
pub const SIZE_FIELDS_LEN: usize = 8;

/// Encode the left/right compressed-size fields.
pub fn encode_size_fields(left: u32, right: u32) -> [u8; SIZE_FIELDS_LEN] {
    let mut buf = [0u8; SIZE_FIELDS_LEN];
    buf[0..4].copy_from_slice(&left.to_le_bytes());
    buf[4..8].copy_from_slice(&right.to_le_bytes());
    buf
}

/// Decode the left/right compressed-size fields.
pub fn decode_size_fields(buf: &[u8]) -> Result<(u32, u32), StreamError> {
    if buf.len() < SIZE_FIELDS_LEN {
        return Err(StreamError::TruncatedRecord {
            expected: SIZE_FIELDS_LEN,
            actual: buf.len(),
        });
    }
    let left = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let right = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    Ok((left, right))
}

// ── Partial-I/O loops ────────────────────────────────────────────

/// Fill `buf` completely before `deadline` elapses.
///
/// Short reads keep looping; 0 bytes means the peer closed;
/// interruption-class errors are retried without counting against the
/// byte budget; anything else is fatal to the cycle.
pub async fn read_full_deadline<S>(
    stream: &mut S,
    buf: &mut [u8],
    deadline: Instant,
) -> Result<(), StreamError>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or(StreamError::Timeout(EXCHANGE_DEADLINE))?;

        match tokio::time::timeout(remaining, stream.read(&mut buf[filled..])).await {
            Err(_) => return Err(StreamError::Timeout(EXCHANGE_DEADLINE)),
            Ok(Ok(0)) => return Err(StreamError::PeerClosed),
            Ok(Ok(n)) => filled += n,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Ok(Err(e)) => return Err(StreamError::Connection(e)),
        }
    }
    Ok(())
}

/// Drain `buf` completely before `deadline` elapses.
///
/// Same retry/timeout discipline as [`read_full_deadline`].
pub async fn write_full_deadline<S>(
    stream: &mut S,
    buf: &[u8],
    deadline: Instant,
) -> Result<(), StreamError>
where
    S: AsyncWrite + Unpin,
{
    let mut sent = 0;
    while sent < buf.len() {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or(StreamError::Timeout(EXCHANGE_DEADLINE))?;

        match tokio::time::timeout(remaining, stream.write(&buf[sent..])).await {
            Err(_) => return Err(StreamError::Timeout(EXCHANGE_DEADLINE)),
            Ok(Ok(0)) => return Err(StreamError::PeerClosed),
            Ok(Ok(n)) => sent += n,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Ok(Err(e)) => return Err(StreamError::Connection(e)),
        }
    }
    Ok(())
}

/// Read and validate the control sentinel.
pub async fn read_sentinel<S>(stream: &mut S, deadline: Instant) -> Result<(), StreamError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; CONTROL_SENTINEL.len()];
    read_full_deadline(stream, &mut buf, deadline).await?;
    if buf != CONTROL_SENTINEL {
        return Err(StreamError::InvalidSentinel);
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
