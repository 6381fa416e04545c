//! Jitter patterns for temporal anti-aliasing
//!
//! Halton(2, 3) offsets cycled over a phase count that grows with the
//! upscale ratio, so every display pixel receives enough distinct samples.

use glam::{Mat4, Vec2, Vec3};

/// Base phase count at 1:1 scale
const BASE_PHASE_COUNT: f32 = 8.0;

/// Generate a Halton number for the given index and base
///
/// # Arguments
/// * `index` - Sequence index (1-based to avoid the 0 sample)
/// * `base` - Prime number base (typically 2 or 3)
///
/// # Returns
/// A value in the range [0, 1)
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut result = 0.0;
    let mut f = 1.0 / base as f32;

    while index > 0 {
        result += f * (index % base) as f32;
        index /= base;
        f /= base as f32;
    }

    result
}

/// Number of jitter phases for a render/display width pair
///
/// `ceil(8 * (display / render)^2)`
pub fn phase_count(render_width: u32, display_width: u32) -> u32 {
    let ratio = display_width as f32 / render_width.max(1) as f32;
    (BASE_PHASE_COUNT * ratio * ratio).ceil().max(1.0) as u32
}

/// Jitter offset in render pixels for a frame index, centered on zero
///
/// Returns (x, y) in [-0.5, 0.5); the sequence repeats every `phase_count` frames.
pub fn jitter_offset(index: u32, phase_count: u32) -> Vec2 {
    let phase = index % phase_count.max(1);
    Vec2::new(halton(phase + 1, 2) - 0.5, halton(phase + 1, 3) - 0.5)
}

/// Apply jitter to a projection matrix
///
/// The pixel offset is converted to NDC and composed as a translation in
/// front of the projection, shifting the rasterized image by a sub-pixel amount.
///
/// # Arguments
/// * `proj` - Original projection matrix
/// * `jitter_pixels` - Jitter offset in render pixels (typically -0.5 to +0.5)
/// * `width` - Render width in pixels
/// * `height` - Render height in pixels
pub fn apply_jitter_to_projection(proj: Mat4, jitter_pixels: Vec2, width: u32, height: u32) -> Mat4 {
    let ndc = Vec3::new(
        (jitter_pixels.x * 2.0) / width.max(1) as f32,
        (jitter_pixels.y * 2.0) / height.max(1) as f32,
        0.0,
    );
    Mat4::from_translation(ndc) * proj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halton_base2() {
        // Base 2: 1/2, 1/4, 3/4, 1/8, ...
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
        assert_eq!(halton(3, 2), 0.75);
        assert_eq!(halton(4, 2), 0.125);
    }

    #[test]
    fn test_halton_base3() {
        let h1 = halton(1, 3);
        let h2 = halton(2, 3);
        assert!((h1 - 1.0 / 3.0).abs() < 1e-6);
        assert!((h2 - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_phase_counts() {
        assert_eq!(phase_count(1920, 1920), 8);
        assert_eq!(phase_count(960, 1920), 32);
        // 1.5x: 8 * 2.25 = 18
        assert_eq!(phase_count(1280, 1920), 18);
        assert_eq!(phase_count(640, 1920), 72);
    }

    #[test]
    fn test_jitter_cycles_every_phase_count() {
        let n = phase_count(960, 1920);
        let first: Vec<Vec2> = (0..n).map(|i| jitter_offset(i, n)).collect();
        let second: Vec<Vec2> = (n..2 * n).map(|i| jitter_offset(i, n)).collect();
        assert_eq!(first, second);

        // No repeats inside one cycle
        for i in 0..first.len() {
            for j in (i + 1)..first.len() {
                assert_ne!(first[i], first[j]);
            }
        }
    }

    #[test]
    fn test_jitter_range() {
        for n in [8, 18, 32, 72] {
            for i in 0..n {
                let j = jitter_offset(i, n);
                assert!(j.x >= -0.5 && j.x <= 0.5);
                assert!(j.y >= -0.5 && j.y <= 0.5);
            }
        }
    }

    #[test]
    fn test_apply_jitter_to_projection() {
        let proj = Mat4::IDENTITY;
        let jittered = apply_jitter_to_projection(proj, Vec2::new(0.5, 0.5), 1920, 1080);

        assert_ne!(jittered.w_axis.x, 0.0);
        assert_ne!(jittered.w_axis.y, 0.0);
        assert_eq!(jittered.x_axis, proj.x_axis);
        assert_eq!(jittered.y_axis, proj.y_axis);
        assert_eq!(jittered.z_axis, proj.z_axis);
    }

    #[test]
    fn test_jitter_ndc_conversion() {
        let jittered = apply_jitter_to_projection(Mat4::IDENTITY, Vec2::new(0.5, 0.0), 1920, 1080);
        let expected_x = (0.5 * 2.0) / 1920.0;

        assert!((jittered.w_axis.x - expected_x).abs() < 1e-6);
        assert_eq!(jittered.w_axis.y, 0.0);
    }

    #[test]
    fn test_jitter_shifts_perspective_clip_position() {
        let proj = Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, 100.0);
        let jitter = Vec2::new(0.25, -0.25);
        let jittered = apply_jitter_to_projection(proj, jitter, 1920, 1080);

        let p = glam::Vec4::new(0.3, -0.2, -5.0, 1.0);
        let a = proj * p;
        let b = jittered * p;
        let shift_x = b.x / b.w - a.x / a.w;
        let shift_y = b.y / b.w - a.y / a.w;
        assert!((shift_x - 0.5 / 1920.0).abs() < 1e-5);
        assert!((shift_y + 0.5 / 1080.0).abs() < 1e-5);
    }
}
