//! Fixed-layout telemetry record uploaded by the remote device.
//!
//! Every request cycle the client sends exactly one record describing its
//! tracking and camera state: per-eye intrinsics, default texture size,
//! aperture fractions, head/eye pose matrices, and up to
//! [`MAX_CONTROLLERS`] controller states with their pose matrices.
//!
//! The layout is a fixed little-endian binary format of
//! [`TelemetryRecord::SIZE`] bytes; [`encode`](TelemetryRecord::encode) and
//! [`decode`](TelemetryRecord::decode) pack it by hand so the wire bytes
//! are independent of Rust struct layout.

use crate::error::StreamError;

/// Maximum number of simultaneously tracked controllers.
pub const MAX_CONTROLLERS: usize = 3;

/// A 4×4 transform matrix, row-major.
pub type Mat4 = [[f32; 4]; 4];

const MAT4_SIZE: usize = 64;

// ── ControllerState ──────────────────────────────────────────────

/// Per-controller input state as reported by the remote device.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    /// Which hand the controller is assigned to (device-defined tag).
    pub side: i32,
    /// Whether the controller is currently tracked.
    pub available: i32,
    /// Bitmask of pressed buttons.
    pub buttons: u64,
    /// Bitmask of touched buttons.
    pub buttons_touched: u64,
    /// Dpad / touchpad position (u, v).
    pub dpad: [f32; 2],
    /// Thumbstick position (u, v).
    pub stick: [f32; 2],
    /// Analog trigger pressure (0..=1).
    pub trigger: f32,
    /// Analog grip pressure (0..=1).
    pub grip: f32,
}

impl ControllerState {
    /// Encoded size on the wire.
    pub const SIZE: usize = 48;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.side.to_le_bytes());
        buf[4..8].copy_from_slice(&self.available.to_le_bytes());
        buf[8..16].copy_from_slice(&self.buttons.to_le_bytes());
        buf[16..24].copy_from_slice(&self.buttons_touched.to_le_bytes());
        buf[24..28].copy_from_slice(&self.dpad[0].to_le_bytes());
        buf[28..32].copy_from_slice(&self.dpad[1].to_le_bytes());
        buf[32..36].copy_from_slice(&self.stick[0].to_le_bytes());
        buf[36..40].copy_from_slice(&self.stick[1].to_le_bytes());
        buf[40..44].copy_from_slice(&self.trigger.to_le_bytes());
        buf[44..48].copy_from_slice(&self.grip.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            side: i32::from_le_bytes(buf[0..4].try_into().unwrap()),
            available: i32::from_le_bytes(buf[4..8].try_into().unwrap()),
            buttons: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            buttons_touched: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            dpad: [read_f32(buf, 24), read_f32(buf, 28)],
            stick: [read_f32(buf, 32), read_f32(buf, 36)],
            trigger: read_f32(buf, 40),
            grip: read_f32(buf, 44),
        }
    }
}

// ── TelemetryRecord ──────────────────────────────────────────────

/// The telemetry record a client uploads each cycle.
///
/// Intrinsics are normalized to image dimensions: a focal length of 1.0
/// equals the full image width/height and a principal point of 0.5 is the
/// image center.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Device-type tag of the remote headset.
    pub device_type: i32,
    /// Whether the tracking state is currently valid.
    pub tracking: i32,
    /// Per-eye horizontal focal length, in image-width units.
    pub fx: [f32; 2],
    /// Per-eye vertical focal length, in image-height units.
    pub fy: [f32; 2],
    /// Per-eye horizontal principal point (0.5 = image center).
    pub cx: [f32; 2],
    /// Per-eye vertical principal point (0.5 = image center).
    pub cy: [f32; 2],
    /// Default eye texture width in pixels.
    pub tex_width: i32,
    /// Default eye texture height in pixels.
    pub tex_height: i32,
    /// Horizontal aperture fraction of the texture containing the render.
    pub aperture_u: f32,
    /// Vertical aperture fraction of the texture containing the render.
    pub aperture_v: f32,
    /// Last tracked head pose.
    pub head_pose: Mat4,
    /// Last tracked per-eye poses.
    pub eye_pose: [Mat4; 2],
    /// Controller input states.
    pub controllers: [ControllerState; MAX_CONTROLLERS],
    /// Last tracked controller poses.
    pub controller_pose: [Mat4; MAX_CONTROLLERS],
}

impl Default for TelemetryRecord {
    fn default() -> Self {
        Self {
            device_type: 0,
            tracking: 0,
            fx: [0.0; 2],
            fy: [0.0; 2],
            cx: [0.0; 2],
            cy: [0.0; 2],
            tex_width: 0,
            tex_height: 0,
            aperture_u: 0.0,
            aperture_v: 0.0,
            head_pose: [[0.0; 4]; 4],
            eye_pose: [[[0.0; 4]; 4]; 2],
            controllers: [ControllerState::default(); MAX_CONTROLLERS],
            controller_pose: [[[0.0; 4]; 4]; MAX_CONTROLLERS],
        }
    }
}

impl TelemetryRecord {
    /// Encoded size on the wire.
    pub const SIZE: usize = 584;

    /// Serialize to the fixed little-endian wire layout.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.device_type.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tracking.to_le_bytes());
        write_f32_pair(&mut buf, 8, &self.fx);
        write_f32_pair(&mut buf, 16, &self.fy);
        write_f32_pair(&mut buf, 24, &self.cx);
        write_f32_pair(&mut buf, 32, &self.cy);
        buf[40..44].copy_from_slice(&self.tex_width.to_le_bytes());
        buf[44..48].copy_from_slice(&self.tex_height.to_le_bytes());
        buf[48..52].copy_from_slice(&self.aperture_u.to_le_bytes());
        buf[52..56].copy_from_slice(&self.aperture_v.to_le_bytes());
        write_mat4(&mut buf, 56, &self.head_pose);
        write_mat4(&mut buf, 120, &self.eye_pose[0]);
        write_mat4(&mut buf, 184, &self.eye_pose[1]);
        for (i, c) in self.controllers.iter().enumerate() {
            let off = 248 + i * ControllerState::SIZE;
            c.write_to(&mut buf[off..off + ControllerState::SIZE]);
        }
        for (i, m) in self.controller_pose.iter().enumerate() {
            write_mat4(&mut buf, 392 + i * MAT4_SIZE, m);
        }
        buf
    }

    /// Deserialize from the fixed little-endian wire layout.
    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        if data.len() < Self::SIZE {
            return Err(StreamError::TruncatedRecord {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        let mut controllers = [ControllerState::default(); MAX_CONTROLLERS];
        for (i, c) in controllers.iter_mut().enumerate() {
            let off = 248 + i * ControllerState::SIZE;
            *c = ControllerState::read_from(&data[off..off + ControllerState::SIZE]);
        }
        let mut controller_pose = [[[0.0; 4]; 4]; MAX_CONTROLLERS];
        for (i, m) in controller_pose.iter_mut().enumerate() {
            *m = read_mat4(data, 392 + i * MAT4_SIZE);
        }

        Ok(Self {
            device_type: i32::from_le_bytes(data[0..4].try_into().unwrap()),
            tracking: i32::from_le_bytes(data[4..8].try_into().unwrap()),
            fx: [read_f32(data, 8), read_f32(data, 12)],
            fy: [read_f32(data, 16), read_f32(data, 20)],
            cx: [read_f32(data, 24), read_f32(data, 28)],
            cy: [read_f32(data, 32), read_f32(data, 36)],
            tex_width: i32::from_le_bytes(data[40..44].try_into().unwrap()),
            tex_height: i32::from_le_bytes(data[44..48].try_into().unwrap()),
            aperture_u: read_f32(data, 48),
            aperture_v: read_f32(data, 52),
            head_pose: read_mat4(data, 56),
            eye_pose: [read_mat4(data, 120), read_mat4(data, 184)],
            controllers,
            controller_pose,
        })
    }
}

// ── Field helpers ────────────────────────────────────────────────

fn read_f32(buf: &[u8], off: usize) -> f32 {
    f32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn write_f32_pair(buf: &mut [u8], off: usize, pair: &[f32; 2]) {
    buf[off..off + 4].copy_from_slice(&pair[0].to_le_bytes());
    buf[off + 4..off + 8].copy_from_slice(&pair[1].to_le_bytes());
}

fn write_mat4(buf: &mut [u8], off: usize, m: &Mat4) {
    for (r, row) in m.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            let o = off + (r * 4 + c) * 4;
            buf[o..o + 4].copy_from_slice(&v.to_le_bytes());
        }
    }
}

fn read_mat4(buf: &[u8], off: usize) -> Mat4 {
    let mut m = [[0.0f32; 4]; 4];
    for (r, row) in m.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = read_f32(buf, off + (r * 4 + c) * 4);
        }
    }
    m
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> TelemetryRecord {
        let mut rec = TelemetryRecord {
            device_type: 7,
            tracking: 1,
            fx: [1.2, 1.3],
            fy: [1.4, 1.5],
            cx: [0.5, 0.51],
            cy: [0.49, 0.5],
            tex_width: 1440,
            tex_height: 1600,
            aperture_u: 0.9,
            aperture_v: 0.95,
            ..Default::default()
        };
        for r in 0..4 {
            for c in 0..4 {
                rec.head_pose[r][c] = (r * 4 + c) as f32 * 0.25;
                rec.eye_pose[0][r][c] = 1.0 + (r * 4 + c) as f32;
                rec.eye_pose[1][r][c] = 2.0 + (r * 4 + c) as f32;
            }
        }
        rec.controllers[0] = ControllerState {
            side: 1,
            available: 1,
            buttons: 0b1010,
            buttons_touched: 0b0110,
            dpad: [0.1, -0.2],
            stick: [-0.5, 0.75],
            trigger: 0.8,
            grip: 0.3,
        };
        rec.controller_pose[2][3][3] = 1.0;
        rec
    }

    #[test]
    fn record_roundtrip() {
        let rec = sample_record();
        let bytes = rec.encode();
        let decoded = TelemetryRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn zeroed_record_decodes() {
        let bytes = [0u8; TelemetryRecord::SIZE];
        let decoded = TelemetryRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, TelemetryRecord::default());
    }

    #[test]
    fn record_too_short() {
        let short = [0u8; TelemetryRecord::SIZE - 1];
        let err = TelemetryRecord::decode(&short).unwrap_err();
        assert!(matches!(
            err,
            StreamError::TruncatedRecord {
                expected: TelemetryRecord::SIZE,
                actual,
            } if actual == TelemetryRecord::SIZE - 1
        ));
    }

    #[test]
    fn layout_offsets_are_stable() {
        let mut rec = TelemetryRecord::default();
        rec.tex_width = 0x0102_0304;
        rec.controllers[0].buttons = 0xDEAD_BEEF;
        let bytes = rec.encode();
        // tex_width at byte 40, little-endian.
        assert_eq!(&bytes[40..44], &[0x04, 0x03, 0x02, 0x01]);
        // first controller's button word at 248 + 8.
        assert_eq!(&bytes[256..260], &[0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn controller_state_roundtrip() {
        let c = ControllerState {
            side: -1,
            available: 1,
            buttons: u64::MAX,
            buttons_touched: 1,
            dpad: [0.0, 1.0],
            stick: [-1.0, 0.0],
            trigger: 0.5,
            grip: 1.0,
        };
        let mut buf = [0u8; ControllerState::SIZE];
        c.write_to(&mut buf);
        assert_eq!(ControllerState::read_from(&buf), c);
    }
}
