//! Per-eye raw frame buffers awaiting compression.
//!
//! The host application renders into these buffers via the producer
//! interface on [`StreamingServer`](crate::server::StreamingServer); the
//! encoder task drains them. Dimensions are changed through
//! [`FramePair::set_size`], which either reallocates both eye buffers or
//! leaves the pair untouched.

pub mod resample;

use crate::error::StreamError;

/// Fixed capacity of the shared send payload in bytes.
///
/// Sized for two uncompressed 320x240 RGBA eyes; a compressed pair that
/// somehow exceeds this is discarded rather than truncated.
pub const MAX_PAYLOAD_BYTES: usize = 614_400;

/// Per-eye ceiling: a single compressed eye may use at most half the
/// send capacity.
pub const MAX_EYE_BYTES: usize = MAX_PAYLOAD_BYTES / 2;

/// Default stream dimensions installed by `start()`.
pub const DEFAULT_WIDTH: u32 = 320;
pub const DEFAULT_HEIGHT: u32 = 240;
pub const DEFAULT_DEPTH: u32 = 4;

/// Default compression quality (0..=100, 100 = best).
pub const DEFAULT_QUALITY: u8 = 100;

// ── Eye ──────────────────────────────────────────────────────────

/// Which eye of the stereo pair a buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    /// Both eyes, in wire order (left first).
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    /// Array index of this eye.
    pub const fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

// ── EyeFrame ─────────────────────────────────────────────────────

/// One eye's raw pixel buffer plus its compression bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct EyeFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per pixel.
    pub depth: u32,
    /// Owned raw pixel data, `width * height * depth` bytes.
    pub data: Vec<u8>,
    /// Compression quality for this eye (0..=100).
    pub quality: u8,
    /// Size in bytes of the last compression result.
    pub compressed_size: usize,
}

impl EyeFrame {
    /// Total byte size of the raw bitmap.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }
}

// ── FramePair ────────────────────────────────────────────────────

/// The two per-eye raw frame buffers.
#[derive(Debug, Default)]
pub struct FramePair {
    eyes: [EyeFrame; 2],
    initialized: bool,
}

impl FramePair {
    /// An empty, uninitialized pair. Buffers exist only after the first
    /// successful [`set_size`](Self::set_size).
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the buffers have been allocated.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Resize both eye buffers to `width x height x depth`.
    ///
    /// Fails atomically: both replacement buffers are allocated and
    /// zeroed before either is installed, so on error any prior buffers
    /// are left untouched.
    pub fn set_size(&mut self, width: u32, height: u32, depth: u32) -> Result<(), StreamError> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(StreamError::InvalidFrameSize {
                width,
                height,
                depth,
            });
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(depth as usize))
            .ok_or(StreamError::InvalidFrameSize {
                width,
                height,
                depth,
            })?;

        let mut fresh: [Vec<u8>; 2] = [Vec::new(), Vec::new()];
        for buf in &mut fresh {
            buf.try_reserve_exact(len)
                .map_err(|e| StreamError::Other(format!("frame buffer allocation failed: {e}")))?;
            buf.resize(len, 0);
        }

        let [left, right] = fresh;
        for (eye, data) in self.eyes.iter_mut().zip([left, right]) {
            eye.width = width;
            eye.height = height;
            eye.depth = depth;
            eye.data = data;
            eye.compressed_size = 0;
            if eye.quality == 0 {
                eye.quality = DEFAULT_QUALITY;
            }
        }
        self.initialized = true;
        Ok(())
    }

    /// Set the compression quality for both eyes.
    pub fn set_quality(&mut self, quality: u8) {
        for eye in &mut self.eyes {
            eye.quality = quality.min(100);
        }
    }

    /// Immutable access to one eye's frame.
    pub fn eye(&self, eye: Eye) -> &EyeFrame {
        &self.eyes[eye.index()]
    }

    /// Mutable access to one eye's frame.
    pub fn eye_mut(&mut self, eye: Eye) -> &mut EyeFrame {
        &mut self.eyes[eye.index()]
    }
}

// ── Tests ────────────────────────────────────────────────────────
