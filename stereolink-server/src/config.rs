//! Configuration for the standalone streaming server.

use std::path::Path;

use serde::{Deserialize, Serialize};
use stereolink_core::StreamConfig;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Stream settings.
    pub stream: StreamSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to listen on. Empty keeps the server parked until an
    /// address is set at runtime.
    pub bind_addr: String,
    /// TCP port the headset client dials.
    pub port: u16,
}

/// Stereo stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Per-eye frame width in pixels.
    pub width: u32,
    /// Per-eye frame height in pixels.
    pub height: u32,
    /// Bytes per pixel (RGBA = 4).
    pub depth: u32,
    /// Compression quality, 0..=100.
    pub quality: u8,
    /// Whether frame payloads are sent at all.
    pub image_streaming: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            stream: StreamSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: stereolink_core::DEFAULT_PORT,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            depth: 4,
            quality: 100,
            image_streaming: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, text)
    }

    /// Convert into the core stream configuration.
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            bind_addr: self.network.bind_addr.clone(),
            port: self.network.port,
            width: self.stream.width,
            height: self.stream.height,
            depth: self.stream.depth,
            quality: self.stream.quality.min(100),
            image_streaming: self.stream.image_streaming,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
