//! Host view: projection, viewport and stereo topology
//!
//! The pipeline reads this every frame and writes two things back: a narrowed
//! viewport while an upscaler renders below display resolution, and jittered
//! projection matrices while a temporal backend is active.

use crate::core::types::Mat4;

/// Stereo rendering topology reported by the host
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StereoMode {
    /// Single view, no stereo
    #[default]
    Mono,
    /// Both eyes drawn in one pass through instancing
    SinglePassInstanced,
    /// Each eye rendered by its own pass
    MultiPass,
    /// Both eyes side by side in one double-wide target
    SinglePassDoubleWide,
}

impl StereoMode {
    /// Number of eyes that end up on screen
    pub fn eye_count(self) -> u8 {
        match self {
            Self::Mono => 1,
            _ => 2,
        }
    }

    /// Number of times the host invokes the pipeline per displayed frame
    pub fn invocations_per_frame(self) -> u8 {
        match self {
            Self::MultiPass => 2,
            _ => 1,
        }
    }
}

/// Eye being rendered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Eye {
    #[default]
    Left,
    Right,
}

impl Eye {
    pub fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Pixel rectangle the scene is rasterized into
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    /// Scale every edge by `render / display`, keeping at least one pixel
    pub fn scaled(&self, render: (u32, u32), display: (u32, u32)) -> Self {
        let sx = render.0 as f32 / display.0.max(1) as f32;
        let sy = render.1 as f32 / display.1.max(1) as f32;
        Self {
            x: (self.x as f32 * sx).round() as u32,
            y: (self.y as f32 * sy).round() as u32,
            width: ((self.width as f32 * sx).round() as u32).max(1),
            height: ((self.height as f32 * sy).round() as u32).max(1),
        }
    }
}

/// Camera view handed to the pipeline by the host
#[derive(Clone, Debug)]
pub struct View {
    /// Full output resolution
    pub display_width: u32,
    pub display_height: u32,
    /// Drawable rectangle; narrowed while an upscaler is active
    pub viewport: Viewport,
    /// Projection actually used for rasterization, per eye
    pub projection: [Mat4; 2],
    /// Projection without jitter, per eye
    pub non_jittered_projection: [Mat4; 2],
    /// Color target format
    pub format: wgpu::TextureFormat,
    pub hdr: bool,
    pub stereo: StereoMode,
    /// Editor preview view; some effects refuse to render here
    pub is_scene_view: bool,
    /// Destination uses a top-down texture convention and needs a vertical flip
    pub flip_destination: bool,
    /// Host produced a depth texture this frame
    pub has_depth: bool,
    /// Host produced motion vectors this frame
    pub has_motion_vectors: bool,
    /// Camera teleported or cut this frame
    pub camera_cut: bool,
}

impl View {
    /// Create a mono perspective view
    pub fn new(width: u32, height: u32, fov_y_degrees: f32) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        let projection = Mat4::perspective_rh(fov_y_degrees.to_radians(), aspect, 0.01, 1000.0);
        Self {
            display_width: width,
            display_height: height,
            viewport: Viewport::full(width, height),
            projection: [projection; 2],
            non_jittered_projection: [projection; 2],
            format: wgpu::TextureFormat::Rgba16Float,
            hdr: true,
            stereo: StereoMode::Mono,
            is_scene_view: false,
            flip_destination: false,
            has_depth: true,
            has_motion_vectors: true,
            camera_cut: false,
        }
    }

    /// Create a stereo view with the given topology
    pub fn stereo(width: u32, height: u32, fov_y_degrees: f32, mode: StereoMode) -> Self {
        let mut view = Self::new(width, height, fov_y_degrees);
        view.stereo = mode;
        view
    }

    pub fn display_size(&self) -> (u32, u32) {
        (self.display_width, self.display_height)
    }

    pub fn eye_count(&self) -> u8 {
        self.stereo.eye_count()
    }

    /// Change output resolution (window resize)
    pub fn resize(&mut self, width: u32, height: u32) {
        self.display_width = width.max(1);
        self.display_height = height.max(1);
        self.viewport = Viewport::full(self.display_width, self.display_height);
        let aspect = self.display_width as f32 / self.display_height as f32;
        for proj in &mut self.non_jittered_projection {
            // Rebuild the x scale from the y scale so fov_y is kept
            proj.x_axis.x = proj.y_axis.y / aspect;
        }
        self.projection = self.non_jittered_projection;
    }
}

impl Default for View {
    fn default() -> Self {
        Self::new(1920, 1080, 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eye_counts() {
        assert_eq!(StereoMode::Mono.eye_count(), 1);
        assert_eq!(StereoMode::SinglePassInstanced.eye_count(), 2);
        assert_eq!(StereoMode::SinglePassInstanced.invocations_per_frame(), 1);
        assert_eq!(StereoMode::MultiPass.invocations_per_frame(), 2);
    }

    #[test]
    fn test_viewport_scaling() {
        let vp = Viewport::full(1920, 1080);
        let scaled = vp.scaled((960, 540), (1920, 1080));
        assert_eq!(scaled, Viewport { x: 0, y: 0, width: 960, height: 540 });

        let inset = Viewport { x: 100, y: 50, width: 800, height: 600 };
        let scaled = inset.scaled((960, 540), (1920, 1080));
        assert_eq!(scaled.x, 50);
        assert_eq!(scaled.y, 25);
    }

    #[test]
    fn test_resize_keeps_vertical_fov() {
        let mut view = View::new(1920, 1080, 60.0);
        let y_scale = view.non_jittered_projection[0].y_axis.y;
        view.resize(1080, 1080);
        assert_eq!(view.non_jittered_projection[0].y_axis.y, y_scale);
        assert!((view.non_jittered_projection[0].x_axis.x - y_scale).abs() < 1e-6);
        assert_eq!(view.viewport, Viewport::full(1080, 1080));
    }
}
