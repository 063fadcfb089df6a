//! # stereolink-core
//!
//! Core library for the stereolink remote-display streaming server: a
//! single headset client uploads fixed-size telemetry records over TCP
//! and receives zstd-compressed stereo frame pairs in return.
//!
//! This crate contains:
//! - **Telemetry**: `TelemetryRecord` / `ControllerState` with a fixed
//!   little-endian wire layout
//! - **Wire**: sentinel framing plus deadline-bounded partial I/O loops
//! - **Frame**: `FramePair` stereo pixel buffers and the depth-matted
//!   nearest-neighbor resampler
//! - **Encoder**: quality-mapped zstd compression of both eyes into the
//!   shared send payload
//! - **Server**: `StreamingServer` lifecycle, the single-client
//!   streaming I/O task, and runtime rebinding
//! - **Status / Sync**: connection status, runlevels, and bounded-wait
//!   signals shared by the tasks
//! - **Adapters**: local interface enumeration for diagnostics
//! - **Error**: `StreamError` — typed, `thiserror`-based error hierarchy

pub mod adapters;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod server;
pub mod status;
pub mod sync;
pub mod telemetry;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use adapters::{NetworkAdapter, list_adapters};
pub use encoder::SendPayload;
pub use error::StreamError;
pub use frame::{
    Eye, EyeFrame, FramePair, MAX_EYE_BYTES, MAX_PAYLOAD_BYTES, resample::resample_rgba,
};
pub use server::{DEFAULT_PORT, FrameGuard, StreamConfig, StreamingServer};
pub use status::ConnectionStatus;
pub use telemetry::{ControllerState, MAX_CONTROLLERS, TelemetryRecord};
pub use wire::{CONTROL_SENTINEL, EXCHANGE_DEADLINE};
