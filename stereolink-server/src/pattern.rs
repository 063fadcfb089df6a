//! Synthetic moving test pattern, the frame source when no host
//! renderer is attached.

use std::sync::Arc;
use std::time::Duration;

use stereolink_core::{Eye, StreamingServer};
use tokio::time::MissedTickBehavior;

/// Frame interval for the pattern producer (~30 fps).
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Horizontal offset between the eyes, for a visible stereo cue.
const EYE_SHIFT: u32 = 8;

/// Paint one RGBA eye buffer with a scrolling diagonal gradient.
pub fn paint(buf: &mut [u8], width: u32, height: u32, phase: u32, eye: Eye) {
    let shift = match eye {
        Eye::Left => 0,
        Eye::Right => EYE_SHIFT,
    };
    for y in 0..height {
        for x in 0..width {
            let i = ((y * width + x) * 4) as usize;
            if i + 3 >= buf.len() {
                return;
            }
            buf[i] = ((x + phase + shift) % 256) as u8;
            buf[i + 1] = ((y + phase) % 256) as u8;
            buf[i + 2] = ((x + y) % 256) as u8;
            buf[i + 3] = 255;
        }
    }
}

/// Drive the pattern into the server's frame pair until aborted.
pub async fn run(server: Arc<StreamingServer>, width: u32, height: u32) {
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut phase: u32 = 0;

    loop {
        ticker.tick().await;
        {
            let mut guard = server.frames().await;
            if !guard.is_sized() {
                continue;
            }
            for eye in Eye::BOTH {
                paint(guard.eye_pixels_mut(eye), width, height, phase, eye);
            }
        }
        server.notify_new_frame();
        phase = phase.wrapping_add(4);
    }
}
