//! Nearest-neighbor RGBA resampler with flip and alpha matting.
//!
//! The host viewport and the remote display use opposite raster
//! conventions, so every resample applies both a vertical and a
//! horizontal flip (a 180° rotation). When a depth buffer is supplied
//! the alpha channel is replaced with a binary matte: 0 where the pixel
//! lies on the far plane, 255 otherwise, so see-through displays can key
//! out the viewport background.

use crate::error::StreamError;

/// Bytes per RGBA pixel.
const BPP: usize = 4;

/// 24-bit depth value marking the far plane in a depth24-stencil8 word.
pub const FAR_PLANE_DEPTH: u32 = 0x00FF_FFFF;

/// Resample `src` (`src_w` x `src_h` RGBA) into `dst` (`dst_w` x `dst_h`
/// RGBA), flipping both axes.
///
/// `depth`, when present, must hold one depth24-stencil8 word per
/// source pixel; it drives the alpha matte. Without it alpha is opaque.
pub fn resample_rgba(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    dst: &mut [u8],
    dst_w: u32,
    dst_h: u32,
    depth: Option<&[u32]>,
) -> Result<(), StreamError> {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return Err(StreamError::InvalidFrameSize {
            width: src_w.min(dst_w),
            height: src_h.min(dst_h),
            depth: BPP as u32,
        });
    }

    let src_pixels = src_w as usize * src_h as usize;
    let dst_pixels = dst_w as usize * dst_h as usize;
    if src.len() < src_pixels * BPP || dst.len() < dst_pixels * BPP {
        return Err(StreamError::ProtocolViolation(
            "pixel buffer smaller than its stated dimensions",
        ));
    }
    if let Some(d) = depth {
        if d.len() < src_pixels {
            return Err(StreamError::ProtocolViolation(
                "depth buffer smaller than the source dimensions",
            ));
        }
    }

    for y in 0..dst_h as usize {
        // Nearest source row, then mirrored for the vertical flip.
        let sy = y * src_h as usize / dst_h as usize;
        let my = src_h as usize - 1 - sy;

        for x in 0..dst_w as usize {
            let sx = x * src_w as usize / dst_w as usize;
            let mx = src_w as usize - 1 - sx;

            let si = my * src_w as usize + mx;
            let di = (y * dst_w as usize + x) * BPP;
            let so = si * BPP;

            dst[di..di + 3].copy_from_slice(&src[so..so + 3]);
            dst[di + 3] = match depth {
                Some(d) if (d[si] >> 8) == FAR_PLANE_DEPTH => 0,
                _ => 255,
            };
        }
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// A small frame where every pixel's RGB encodes its coordinates.
    fn coordinate_frame(w: u32, h: u32) -> Vec<u8> {
        let mut buf = vec![0u8; (w * h) as usize * BPP];
        for y in 0..h as usize {
            for x in 0..w as usize {
                let i = (y * w as usize + x) * BPP;
                buf[i] = x as u8;
                buf[i + 1] = y as u8;
                buf[i + 2] = 0x7F;
                buf[i + 3] = 42; // deliberately non-opaque input alpha
            }
        }
        buf
    }

    #[test]
    fn same_size_resample_is_a_180_degree_rotation() {
        let (w, h) = (8u32, 6u32);
        let src = coordinate_frame(w, h);
        let mut dst = vec![0u8; src.len()];
        resample_rgba(&src, w, h, &mut dst, w, h, None).unwrap();

        for y in 0..h as usize {
            for x in 0..w as usize {
                let di = (y * w as usize + x) * BPP;
                assert_eq!(dst[di] as usize, w as usize - 1 - x);
                assert_eq!(dst[di + 1] as usize, h as usize - 1 - y);
                assert_eq!(dst[di + 3], 255);
            }
        }
    }

    #[test]
    fn double_resample_is_identity_up_to_alpha() {
        let (w, h) = (16u32, 16u32);
        let src = coordinate_frame(w, h);
        let mut once = vec![0u8; src.len()];
        let mut twice = vec![0u8; src.len()];
        resample_rgba(&src, w, h, &mut once, w, h, None).unwrap();
        resample_rgba(&once, w, h, &mut twice, w, h, None).unwrap();

        for i in (0..src.len()).step_by(BPP) {
            assert_eq!(&twice[i..i + 3], &src[i..i + 3]);
            assert_eq!(twice[i + 3], 255);
        }
    }

    #[test]
    fn all_far_depth_zeroes_alpha() {
        let (w, h) = (4u32, 4u32);
        let src = coordinate_frame(w, h);
        let mut dst = vec![0u8; src.len()];
        // Far plane in depth24-stencil8: depth bits all set.
        let depth = vec![FAR_PLANE_DEPTH << 8; (w * h) as usize];
        resample_rgba(&src, w, h, &mut dst, w, h, Some(&depth)).unwrap();

        for i in (0..dst.len()).step_by(BPP) {
            assert_eq!(dst[i + 3], 0);
        }
    }

    #[test]
    fn near_depth_keeps_alpha_opaque() {
        let (w, h) = (4u32, 4u32);
        let src = coordinate_frame(w, h);
        let mut dst = vec![0u8; src.len()];
        let depth = vec![0x1234_5600u32; (w * h) as usize];
        resample_rgba(&src, w, h, &mut dst, w, h, Some(&depth)).unwrap();

        for i in (0..dst.len()).step_by(BPP) {
            assert_eq!(dst[i + 3], 255);
        }
    }

    #[test]
    fn downscale_samples_nearest() {
        let (w, h) = (8u32, 8u32);
        let src = coordinate_frame(w, h);
        let mut dst = vec![0u8; 4 * 4 * BPP];
        resample_rgba(&src, w, h, &mut dst, 4, 4, None).unwrap();
        // Output (0,0) maps to mirrored source (7,7).
        assert_eq!(dst[0], 7);
        assert_eq!(dst[1], 7);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let src = vec![0u8; 8];
        let mut dst = vec![0u8; 64];
        assert!(resample_rgba(&src, 4, 4, &mut dst, 4, 4, None).is_err());

        let src = coordinate_frame(4, 4);
        let depth = vec![0u32; 3];
        assert!(resample_rgba(&src, 4, 4, &mut dst, 4, 4, Some(&depth)).is_err());
    }
}
