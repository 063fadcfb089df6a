//! # stereolink-server — standalone streaming server
//!
//! Foreground binary around [`stereolink_core::StreamingServer`]: loads
//! a TOML configuration, starts the TCP streaming endpoint and feeds it
//! a synthetic moving test pattern so a headset client has something to
//! display without a host renderer attached.

pub mod config;
pub mod pattern;
