//! Connection lifecycle status, owned by the streaming I/O task.
//!
//! The status is written exclusively by the I/O task and read from
//! anywhere through an atomic cell, so the embedding application can
//! poll it without touching either protocol mutex.

use std::sync::atomic::{AtomicU8, Ordering};

/// The lifecycle state of the network session.
///
/// ```text
///  NotConnected ──► StartingNetwork ──► WaitingForClient ──► Connected
///       ▲                  ▲                                     │
///       │                  └──────────── Disconnecting ◄─────────┘
///       │                                      │
///  Inactive ◄───────── ShuttingDown ◄──────────┘ (only on stop)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionStatus {
    /// The streaming I/O task is not running.
    #[default]
    Inactive = 0,
    /// Running, but no bind address has been configured yet.
    NotConnected = 1,
    /// Creating and binding the listening socket.
    StartingNetwork = 2,
    /// Listening; no client has connected yet.
    WaitingForClient = 3,
    /// A client is connected and the telemetry/frame exchange is live.
    Connected = 4,
    /// The client session is being torn down.
    Disconnecting = 5,
    /// The I/O task is shutting down for good.
    ShuttingDown = 6,
}

impl ConnectionStatus {
    /// Whether a client is currently connected.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::NotConnected,
            2 => Self::StartingNetwork,
            3 => Self::WaitingForClient,
            4 => Self::Connected,
            5 => Self::Disconnecting,
            6 => Self::ShuttingDown,
            _ => Self::Inactive,
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Inactive => "Inactive",
            Self::NotConnected => "NotConnected",
            Self::StartingNetwork => "StartingNetwork",
            Self::WaitingForClient => "WaitingForClient",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
            Self::ShuttingDown => "ShuttingDown",
        };
        write!(f, "{s}")
    }
}

// ── StatusCell ───────────────────────────────────────────────────

/// Lock-free holder for the current [`ConnectionStatus`].
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: ConnectionStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn set(&self, status: ConnectionStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }

    pub fn get(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.0.load(Ordering::SeqCst))
    }
}

// ── Tests ────────────────────────────────────────────────────────
