//! Stereo frame encoder: drains the frame buffer pair and publishes
//! compressed payloads into the shared send buffer.
//!
//! The encoder task sits between the external render producer and the
//! streaming I/O task. Each iteration it takes a snapshot of both eye
//! buffers under the frame mutex, compresses the two eyes in parallel
//! with zstd, and, if the previous payload has been consumed, stages
//! the concatenated result plus both sizes and raises the frame-ready
//! signal. Frames whose compressed pair would not fit the fixed send
//! capacity are discarded; the previous payload stays staged so the
//! client keeps receiving (possibly stale) valid data.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use crate::error::StreamError;
use crate::frame::{Eye, MAX_EYE_BYTES, MAX_PAYLOAD_BYTES};
use crate::server::ServerShared;
use crate::sync::Runlevel;

/// Bound for one wait on the new-image signal. The loop re-checks the
/// runlevel after every timeout so shutdown latency stays below this.
const NEW_IMAGE_WAIT: Duration = Duration::from_millis(100);

// ── SendPayload ──────────────────────────────────────────────────

/// The shared buffer holding the most recently compressed stereo frame.
///
/// Left-eye bytes followed back-to-back by right-eye bytes; the split is
/// recorded in `left_size` / `right_size`.
#[derive(Debug)]
pub struct SendPayload {
    data: BytesMut,
    left_size: usize,
    right_size: usize,
}

impl SendPayload {
    pub fn new() -> Self {
        Self {
            data: BytesMut::with_capacity(MAX_PAYLOAD_BYTES),
            left_size: 0,
            right_size: 0,
        }
    }

    /// Replace the staged payload with a freshly compressed pair.
    pub fn stage(&mut self, left: &[u8], right: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(left);
        self.data.extend_from_slice(right);
        self.left_size = left.len();
        self.right_size = right.len();
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn left_size(&self) -> usize {
        self.left_size
    }

    pub fn right_size(&self) -> usize {
        self.right_size
    }

    /// Whether anything has ever been staged.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for SendPayload {
    fn default() -> Self {
        Self::new()
    }
}

// ── Compression ──────────────────────────────────────────────────

/// Map the 0..=100 quality knob onto a zstd compression level.
///
/// High quality favours speed (level 1); lowering it buys smaller
/// payloads at higher CPU cost, mirroring the quality/level pairing of
/// the adaptive path.
pub fn level_for_quality(quality: u8) -> i32 {
    (1 + (100 - i32::from(quality.min(100))) / 12).clamp(1, 9)
}

/// Compress one eye's raw pixels.
pub fn compress_eye(data: &[u8], quality: u8) -> Result<Vec<u8>, StreamError> {
    zstd::encode_all(data, level_for_quality(quality))
        .map_err(|e| StreamError::Encoding(format!("zstd encode failed: {e}")))
}

/// Compress both eyes in parallel on the blocking pool.
pub async fn compress_pair(
    left: Vec<u8>,
    left_quality: u8,
    right: Vec<u8>,
    right_quality: u8,
) -> Result<(Vec<u8>, Vec<u8>), StreamError> {
    let l = tokio::task::spawn_blocking(move || compress_eye(&left, left_quality));
    let r = tokio::task::spawn_blocking(move || compress_eye(&right, right_quality));
    let (l, r) = tokio::join!(l, r);
    let l = l.map_err(|e| StreamError::Encoding(format!("encoder task panicked: {e}")))??;
    let r = r.map_err(|e| StreamError::Encoding(format!("encoder task panicked: {e}")))??;
    Ok((l, r))
}

// ── Encoder task ─────────────────────────────────────────────────

/// Encoder task loop. Runs until the runlevel leaves `Running`.
pub(crate) async fn run_encoder(shared: Arc<ServerShared>) {
    shared.encoder_runlevel.set(Runlevel::Running);
    trace!("encoder task running");

    while shared.encoder_runlevel.is_running() {
        if !shared.new_image.wait_timeout(NEW_IMAGE_WAIT).await {
            continue;
        }

        // Snapshot both eyes under the frame mutex so the producer can
        // keep rendering while we compress.
        let snapshot = {
            let stage = shared.frames.lock().await;
            if !stage.pair.is_initialized() {
                None
            } else {
                let l = stage.pair.eye(Eye::Left);
                let r = stage.pair.eye(Eye::Right);
                Some((l.data.clone(), l.quality, r.data.clone(), r.quality))
            }
        };

        if let Some((left, lq, right, rq)) = snapshot {
            match compress_pair(left, lq, right, rq).await {
                Err(e) => debug!("frame discarded: {e}"),
                Ok((l, r)) => {
                    let combined = l.len() + r.len();
                    if l.len() > MAX_EYE_BYTES
                        || r.len() > MAX_EYE_BYTES
                        || combined > MAX_PAYLOAD_BYTES
                    {
                        let e = StreamError::PayloadTooLarge {
                            size: combined,
                            max: MAX_PAYLOAD_BYTES,
                        };
                        warn!("frame discarded: {e}");
                    } else if !shared.frame_ready.is_raised() {
                        // Previous payload consumed; publish this one.
                        {
                            let mut payload = shared.payload.lock().await;
                            payload.stage(&l, &r);
                        }
                        {
                            let mut stage = shared.frames.lock().await;
                            stage.pair.eye_mut(Eye::Left).compressed_size = l.len();
                            stage.pair.eye_mut(Eye::Right).compressed_size = r.len();
                        }
                        shared.frame_ready.raise();
                        trace!(left = l.len(), right = r.len(), "payload staged");
                    }
                }
            }
        }

        // Always clear, even on discard, so a stale frame is never
        // re-processed.
        shared.new_image.clear();
    }

    shared.encoder_runlevel.set(Runlevel::Terminated);
    trace!("encoder task terminated");
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_maps_to_levels() {
        assert_eq!(level_for_quality(100), 1);
        assert_eq!(level_for_quality(0), 9);
        assert!(level_for_quality(50) > level_for_quality(100));
        // Out-of-range input is clamped.
        assert_eq!(level_for_quality(255), 1);
    }

    #[test]
    fn compress_eye_shrinks_repetitive_data() {
        let raw = vec![0xABu8; 320 * 240 * 4];
        let out = compress_eye(&raw, 100).unwrap();
        assert!(out.len() < raw.len());
        // And it must round-trip.
        let back = zstd::decode_all(&out[..]).unwrap();
        assert_eq!(back, raw);
    }

    #[tokio::test]
    async fn compress_pair_keeps_eye_order() {
        let left = vec![0x11u8; 4096];
        let right = vec![0x22u8; 4096];
        let (l, r) = compress_pair(left.clone(), 100, right.clone(), 100)
            .await
            .unwrap();
        assert_eq!(zstd::decode_all(&l[..]).unwrap(), left);
        assert_eq!(zstd::decode_all(&r[..]).unwrap(), right);
    }

    #[test]
    fn payload_staging() {
        let mut p = SendPayload::new();
        assert!(p.is_empty());
        p.stage(&[1, 2, 3], &[4, 5]);
        assert_eq!(p.bytes(), &[1, 2, 3, 4, 5]);
        assert_eq!(p.left_size(), 3);
        assert_eq!(p.right_size(), 2);

        // Restaging replaces, never appends.
        p.stage(&[9], &[8]);
        assert_eq!(p.bytes(), &[9, 8]);
    }
}
