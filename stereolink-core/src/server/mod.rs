//! Streaming server lifecycle.
//!
//! [`StreamingServer`] owns every piece of shared state and the two
//! background tasks that act on it:
//!
//! 1. The I/O task ([`io`]) accepts a single TCP client and runs the
//!    telemetry/frame exchange.
//! 2. The encoder task ([`crate::encoder`]) compresses submitted frame
//!    pairs into the shared send payload.
//!
//! Both tasks poll their [`RunlevelCell`] with bounded waits, so
//! [`stop`](StreamingServer::stop) converges within a tenth of a second
//! in the cooperative case and falls back to aborting the task handles
//! when it does not.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::encoder::{self, SendPayload};
use crate::error::StreamError;
use crate::frame::{
    DEFAULT_DEPTH, DEFAULT_HEIGHT, DEFAULT_QUALITY, DEFAULT_WIDTH, Eye, FramePair,
};
use crate::status::{ConnectionStatus, StatusCell};
use crate::sync::{Runlevel, RunlevelCell, Signal};
use crate::telemetry::TelemetryRecord;

pub mod io;

/// Default TCP port the remote client dials.
pub const DEFAULT_PORT: u16 = 27010;

/// How long `start()` / `stop()` wait for a task to change runlevel.
const LIFECYCLE_GRACE: Duration = Duration::from_millis(100);

// ── StreamConfig ─────────────────────────────────────────────────

/// Startup configuration for [`StreamingServer`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Local address to listen on. An empty string parks the I/O task
    /// in `NotConnected` until an address is supplied at runtime.
    pub bind_addr: String,
    /// TCP port to listen on.
    pub port: u16,
    /// Initial per-eye frame width in pixels.
    pub width: u32,
    /// Initial per-eye frame height in pixels.
    pub height: u32,
    /// Initial bytes per pixel.
    pub depth: u32,
    /// Initial compression quality (0..=100).
    pub quality: u8,
    /// Whether frame payloads are sent at all. When off, every exchange
    /// answers with a bare sentinel.
    pub image_streaming: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind_addr: String::new(),
            port: DEFAULT_PORT,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            depth: DEFAULT_DEPTH,
            quality: DEFAULT_QUALITY,
            image_streaming: true,
        }
    }
}

// ── Shared state ─────────────────────────────────────────────────

/// Frame-side shared state: the stereo pixel buffers plus the latest
/// telemetry record, guarded together so a telemetry snapshot and the
/// frame it belongs to never tear.
#[derive(Debug, Default)]
pub(crate) struct FrameStage {
    pub pair: FramePair,
    pub telemetry: TelemetryRecord,
}

/// Everything the background tasks and the public handle share.
pub(crate) struct ServerShared {
    pub frames: Mutex<FrameStage>,
    pub new_image: Signal,
    pub payload: Mutex<SendPayload>,
    pub frame_ready: Signal,
    /// Latched once the first valid telemetry record arrives.
    pub initialized: AtomicBool,
    pub status: StatusCell,
    pub io_runlevel: RunlevelCell,
    pub encoder_runlevel: RunlevelCell,
    pub streaming: AtomicBool,
    /// Current (address, port) target; the I/O task rebinds on change.
    pub bind: watch::Sender<(String, u16)>,
}

struct Tasks {
    io: JoinHandle<()>,
    encoder: JoinHandle<()>,
}

// ── FrameGuard ───────────────────────────────────────────────────

/// Exclusive access to the stereo frame buffers for a producer.
///
/// Held across the render copy; drop it before calling
/// [`StreamingServer::notify_new_frame`] so the encoder can take its
/// snapshot.
pub struct FrameGuard<'a> {
    inner: MutexGuard<'a, FrameStage>,
}

impl FrameGuard<'_> {
    /// Raw RGBA pixels of one eye, for in-place writing.
    pub fn eye_pixels_mut(&mut self, eye: Eye) -> &mut [u8] {
        &mut self.inner.pair.eye_mut(eye).data
    }

    /// Current per-eye byte length (0 until a size has been set).
    pub fn eye_len(&self, eye: Eye) -> usize {
        self.inner.pair.eye(eye).byte_len()
    }

    /// Whether the buffers have been sized yet.
    pub fn is_sized(&self) -> bool {
        self.inner.pair.is_initialized()
    }
}

// ── StreamingServer ──────────────────────────────────────────────

/// Bidirectional remote-display streaming server.
///
/// One instance per stream. Cheap to share behind an [`Arc`]; all
/// methods take `&self`.
pub struct StreamingServer {
    shared: Arc<ServerShared>,
    tasks: Mutex<Option<Tasks>>,
    config: StreamConfig,
}

impl StreamingServer {
    /// Create a server with default configuration (unbound, streaming).
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    /// Create a server with explicit configuration.
    pub fn with_config(config: StreamConfig) -> Self {
        let (bind, _) = watch::channel((config.bind_addr.clone(), config.port));
        let shared = Arc::new(ServerShared {
            frames: Mutex::new(FrameStage::default()),
            new_image: Signal::default(),
            payload: Mutex::new(SendPayload::new()),
            frame_ready: Signal::default(),
            initialized: AtomicBool::new(false),
            status: StatusCell::new(ConnectionStatus::Inactive),
            io_runlevel: RunlevelCell::default(),
            encoder_runlevel: RunlevelCell::default(),
            streaming: AtomicBool::new(config.image_streaming),
            bind,
        });
        Self {
            shared,
            tasks: Mutex::new(None),
            config,
        }
    }

    /// Start the I/O and encoder tasks.
    ///
    /// Idempotent: calling it while already running is a no-op. Errors
    /// with [`StreamError::StartTimeout`] if either task fails to report
    /// `Running` within the grace period; no task is leaked in that
    /// case.
    pub async fn start(&self) -> Result<(), StreamError> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() && self.shared.io_runlevel.is_running() {
            debug!("start ignored, already running");
            return Ok(());
        }

        {
            let mut stage = self.shared.frames.lock().await;
            if !stage.pair.is_initialized() {
                stage
                    .pair
                    .set_size(self.config.width, self.config.height, self.config.depth)?;
            }
            stage.pair.set_quality(self.config.quality);
        }

        self.shared.initialized.store(false, Ordering::SeqCst);
        self.shared.new_image.clear();
        self.shared.frame_ready.clear();
        self.shared.io_runlevel.set(Runlevel::Unstarted);
        self.shared.encoder_runlevel.set(Runlevel::Unstarted);

        let io = tokio::spawn(io::run_io(Arc::clone(&self.shared)));
        let enc = tokio::spawn(encoder::run_encoder(Arc::clone(&self.shared)));

        let io_up = self
            .shared
            .io_runlevel
            .wait_for(Runlevel::Running, LIFECYCLE_GRACE)
            .await;
        let enc_up = self
            .shared
            .encoder_runlevel
            .wait_for(Runlevel::Running, LIFECYCLE_GRACE)
            .await;
        if !io_up || !enc_up {
            io.abort();
            enc.abort();
            self.shared.status.set(ConnectionStatus::Inactive);
            return Err(StreamError::StartTimeout(LIFECYCLE_GRACE));
        }

        *tasks = Some(Tasks { io, encoder: enc });
        info!("streaming server started");
        Ok(())
    }

    /// Stop both tasks and drop the client session, if any.
    ///
    /// Safe to call before `start()` or more than once. Tasks that do
    /// not terminate cooperatively within the grace period are aborted.
    pub async fn stop(&self) -> Result<(), StreamError> {
        let mut tasks = self.tasks.lock().await;
        let Some(Tasks { io, encoder }) = tasks.take() else {
            return Ok(());
        };

        self.shared.status.set(ConnectionStatus::ShuttingDown);
        self.shared.io_runlevel.set(Runlevel::Terminating);
        self.shared.encoder_runlevel.set(Runlevel::Terminating);
        // Bounded waits inside the tasks mean a wake is enough.
        self.shared.new_image.wake();
        self.shared.frame_ready.wake();

        let io_down = self
            .shared
            .io_runlevel
            .wait_for(Runlevel::Terminated, LIFECYCLE_GRACE)
            .await;
        if !io_down {
            warn!(
                "streaming task: {}, aborting",
                StreamError::ShutdownTimeout(LIFECYCLE_GRACE)
            );
            io.abort();
        }
        let enc_down = self
            .shared
            .encoder_runlevel
            .wait_for(Runlevel::Terminated, LIFECYCLE_GRACE)
            .await;
        if !enc_down {
            warn!(
                "encoder task: {}, aborting",
                StreamError::ShutdownTimeout(LIFECYCLE_GRACE)
            );
            encoder.abort();
        }

        self.shared.initialized.store(false, Ordering::SeqCst);
        self.shared.status.set(ConnectionStatus::Inactive);
        info!("streaming server stopped");
        Ok(())
    }

    // ── Producer interface ───────────────────────────────────────

    /// Resize both eye buffers. Contents are zeroed; compressed sizes
    /// reset.
    pub async fn set_frame_size(
        &self,
        width: u32,
        height: u32,
        depth: u32,
    ) -> Result<(), StreamError> {
        let mut stage = self.shared.frames.lock().await;
        stage.pair.set_size(width, height, depth)
    }

    /// Set the compression quality for subsequent frames (clamped to
    /// 0..=100).
    pub async fn set_quality(&self, quality: u8) {
        let mut stage = self.shared.frames.lock().await;
        stage.pair.set_quality(quality);
    }

    /// Lock the frame buffers for writing.
    pub async fn frames(&self) -> FrameGuard<'_> {
        FrameGuard {
            inner: self.shared.frames.lock().await,
        }
    }

    /// Copy fully rendered pixels into one eye buffer.
    ///
    /// `data` must match the configured eye byte length exactly.
    pub async fn fill_frame(&self, eye: Eye, data: &[u8]) -> Result<(), StreamError> {
        let mut stage = self.shared.frames.lock().await;
        let frame = stage.pair.eye_mut(eye);
        if data.len() != frame.byte_len() {
            return Err(StreamError::ProtocolViolation(
                "frame submission does not match configured size",
            ));
        }
        frame.data.copy_from_slice(data);
        Ok(())
    }

    /// Tell the encoder a new stereo frame is ready for compression.
    pub fn notify_new_frame(&self) {
        self.shared.new_image.raise();
    }

    // ── Consumer interface ───────────────────────────────────────

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.get()
    }

    /// Whether at least one valid telemetry record has been received
    /// since the last `start()`.
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    /// Snapshot of the most recent telemetry record.
    pub async fn latest_telemetry(&self) -> TelemetryRecord {
        self.shared.frames.lock().await.telemetry.clone()
    }

    /// Change the listen target at runtime. The I/O task drops its
    /// current listener (and session) and rebinds.
    pub fn set_bind_addr(&self, addr: impl Into<String>, port: u16) {
        self.shared.bind.send_replace((addr.into(), port));
    }

    /// Toggle frame streaming. When off, exchanges answer with a bare
    /// sentinel and no payload.
    pub fn set_image_streaming(&self, enabled: bool) {
        self.shared.streaming.store(enabled, Ordering::SeqCst);
    }
}

impl Default for StreamingServer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
