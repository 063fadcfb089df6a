//! Streaming I/O task: listener lifecycle and the per-client exchange.
//!
//! The task walks a small state machine driven by the bind-address
//! watch channel and the runlevel cell:
//!
//! ```text
//! parked (empty address) ──► binding ──► listening ──► session
//!        ▲                      │ retry        │            │
//!        └──────────────────────┴──────────────┴────────────┘
//! ```
//!
//! Exactly one client at a time: the listener is dropped as soon as a
//! client is accepted and re-created after the session ends. Every wait
//! in the task is bounded so a runlevel change is observed within a
//! tenth of a second.
//!
//! Each exchange cycle is client-clocked. The client sends a sentinel
//! plus one telemetry record; the server answers with a bare sentinel
//! (streaming off) or sentinel, two size fields and the compressed
//! stereo payload. When no fresh payload arrived within the frame wait
//! the previous one is resent from the task-private transmit buffer, so
//! a slow encoder shows up as repeated frames rather than a stall.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, trace};

use crate::error::StreamError;
use crate::frame::MAX_PAYLOAD_BYTES;
use crate::server::ServerShared;
use crate::status::ConnectionStatus;
use crate::sync::Runlevel;
use crate::telemetry::TelemetryRecord;
use crate::wire::{self, CONTROL_SENTINEL, EXCHANGE_DEADLINE};

/// How long one slice of waiting (parked, accepting) lasts before the
/// runlevel and bind address are re-checked.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Delay before retrying a failed bind.
const BIND_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Bound for waiting on a freshly encoded payload inside a cycle.
const FRAME_WAIT: Duration = Duration::from_millis(100);

/// Task-private transmit buffer. Survives across cycles and sessions so
/// a stale payload can be resent without holding the payload mutex
/// during the socket write.
struct Transmit {
    buf: Vec<u8>,
    left: usize,
    right: usize,
}

impl Transmit {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_PAYLOAD_BYTES),
            left: 0,
            right: 0,
        }
    }
}

/// I/O task loop. Runs until the runlevel leaves `Running`.
pub(crate) async fn run_io(shared: Arc<ServerShared>) {
    let mut bind_rx = shared.bind.subscribe();
    let mut tx = Transmit::new();

    shared.io_runlevel.set(Runlevel::Running);
    shared.status.set(ConnectionStatus::StartingNetwork);
    trace!("streaming task running");

    while shared.io_runlevel.is_running() {
        let (addr, port) = bind_rx.borrow_and_update().clone();

        if addr.is_empty() {
            shared.status.set(ConnectionStatus::NotConnected);
            let _ = timeout(POLL_SLICE, bind_rx.changed()).await;
            continue;
        }

        shared.status.set(ConnectionStatus::StartingNetwork);
        let listener = match TcpListener::bind((addr.as_str(), port)).await {
            Ok(l) => l,
            Err(e) => {
                debug!(%addr, port, "bind failed: {e}");
                sleep_responsive(&shared, BIND_RETRY_DELAY).await;
                continue;
            }
        };
        shared.status.set(ConnectionStatus::WaitingForClient);
        info!(%addr, port, "listening for a client");

        let Some(stream) = accept_client(&shared, &listener, &mut bind_rx).await else {
            // Runlevel or address changed while listening.
            continue;
        };
        // One client at a time.
        drop(listener);

        shared.status.set(ConnectionStatus::Connected);
        if let Err(e) = run_session(&shared, stream, &mut tx, &mut bind_rx).await {
            debug!("session ended: {e}");
        }
        shared.status.set(ConnectionStatus::Disconnecting);
    }

    shared.io_runlevel.set(Runlevel::Terminated);
    trace!("streaming task terminated");
}

/// Accept in bounded slices so runlevel and rebind requests are
/// observed promptly. Returns `None` when the loop should restart from
/// the top of the state machine.
async fn accept_client(
    shared: &ServerShared,
    listener: &TcpListener,
    bind_rx: &mut watch::Receiver<(String, u16)>,
) -> Option<TcpStream> {
    while shared.io_runlevel.is_running() {
        if bind_rx.has_changed().unwrap_or(false) {
            debug!("bind address changed, dropping listener");
            return None;
        }
        match timeout(POLL_SLICE, listener.accept()).await {
            Err(_) => continue,
            Ok(Ok((stream, peer))) => {
                info!(%peer, "client connected");
                let _ = stream.set_nodelay(true);
                return Some(stream);
            }
            Ok(Err(e)) => {
                debug!("accept failed: {e}");
                sleep_responsive(shared, POLL_SLICE).await;
            }
        }
    }
    None
}

/// Run exchange cycles until the client misbehaves, disconnects, or the
/// task is told to terminate.
async fn run_session(
    shared: &ServerShared,
    mut stream: TcpStream,
    tx: &mut Transmit,
    bind_rx: &mut watch::Receiver<(String, u16)>,
) -> Result<(), StreamError> {
    let mut record_buf = [0u8; TelemetryRecord::SIZE];

    while shared.io_runlevel.is_running() {
        // An address change pulls the connection out from under the
        // client; the state machine rebinds to the new target.
        if bind_rx.has_changed().unwrap_or(false) {
            return Err(StreamError::from("bind address changed during session"));
        }

        // Receive: sentinel plus one fixed-size telemetry record.
        let deadline = Instant::now() + EXCHANGE_DEADLINE;
        wire::read_sentinel(&mut stream, deadline).await?;
        wire::read_full_deadline(&mut stream, &mut record_buf, deadline).await?;
        let record = TelemetryRecord::decode(&record_buf)?;
        {
            let mut stage = shared.frames.lock().await;
            stage.telemetry = record;
        }
        shared.initialized.store(true, Ordering::SeqCst);

        // Respond.
        let deadline = Instant::now() + EXCHANGE_DEADLINE;
        if !shared.streaming.load(Ordering::SeqCst) {
            wire::write_full_deadline(&mut stream, &CONTROL_SENTINEL, deadline).await?;
            continue;
        }

        if shared.frame_ready.wait_timeout(FRAME_WAIT).await {
            let payload = shared.payload.lock().await;
            tx.buf.clear();
            tx.buf.extend_from_slice(payload.bytes());
            tx.left = payload.left_size();
            tx.right = payload.right_size();
            drop(payload);
            // Consumed; the encoder may stage the next frame.
            shared.frame_ready.clear();
        }

        // Sizes may both be zero before the first frame is encoded; the
        // framing stays uniform either way.
        wire::write_full_deadline(&mut stream, &CONTROL_SENTINEL, deadline).await?;
        let sizes = wire::encode_size_fields(tx.left as u32, tx.right as u32);
        wire::write_full_deadline(&mut stream, &sizes, deadline).await?;
        wire::write_full_deadline(&mut stream, &tx.buf, deadline).await?;
    }
    Ok(())
}

/// Sleep `total` in short slices, returning early on a runlevel change.
async fn sleep_responsive(shared: &ServerShared, total: Duration) {
    let deadline = Instant::now() + total;
    while shared.io_runlevel.is_running() {
        let remaining = match deadline.checked_duration_since(Instant::now()) {
            Some(r) if !r.is_zero() => r,
            _ => return,
        };
        tokio::time::sleep(remaining.min(Duration::from_millis(50))).await;
    }
}
