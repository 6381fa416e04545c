//! Bokeh depth of field
//!
//! Circle of confusion from depth, half-resolution prefilter, bokeh gather and
//! tent postfilter, then a full-resolution composite into the destination.

use crate::effect::{DepthFlags, Effect, EffectAttributes, EffectSettings};
use crate::render::command::CameraSurface;
use crate::render::context::RenderContext;

const SHADER: &str = "depth_of_field";

/// Sensor height of a 35mm film frame, in meters
const FILM_HEIGHT: f32 = 0.024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KernelSize {
    Small,
    #[default]
    Medium,
    Large,
    VeryLarge,
}

impl KernelSize {
    fn keyword(self) -> &'static str {
        match self {
            Self::Small => "KERNEL_SMALL",
            Self::Medium => "KERNEL_MEDIUM",
            Self::Large => "KERNEL_LARGE",
            Self::VeryLarge => "KERNEL_VERYLARGE",
        }
    }

    /// Bokeh radius in pixels at 1080p
    fn radius(self) -> f32 {
        match self {
            Self::Small => 2.0,
            Self::Medium => 3.0,
            Self::Large => 4.0,
            Self::VeryLarge => 5.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthOfFieldSettings {
    pub enabled: bool,
    /// Meters
    pub focus_distance: f32,
    /// f-stop
    pub aperture: f32,
    /// Millimeters
    pub focal_length: f32,
    pub kernel_size: KernelSize,
}

impl Default for DepthOfFieldSettings {
    fn default() -> Self {
        Self { enabled: false, focus_distance: 10.0, aperture: 5.6, focal_length: 50.0, kernel_size: KernelSize::Medium }
    }
}

impl EffectSettings for DepthOfFieldSettings {
    fn enabled(&self) -> bool {
        self.enabled
    }
}

impl DepthOfFieldSettings {
    /// Lens coefficient: `f^2 / (N * (s - f) * film_height * 2)`
    pub fn lens_coefficient(&self) -> f32 {
        let f = self.focal_length / 1000.0;
        let s = self.focus_distance.max(f);
        f * f / (self.aperture.max(0.1) * (s - f).max(1e-4) * FILM_HEIGHT * 2.0)
    }
}

#[derive(Debug, Default)]
pub struct DepthOfField;

impl Effect for DepthOfField {
    type Settings = DepthOfFieldSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Depth Of Field").hidden_in_scene_view();

    fn depth_flags(&self, _settings: &DepthOfFieldSettings) -> DepthFlags {
        DepthFlags::DEPTH
    }

    fn render(&mut self, ctx: &mut RenderContext, settings: &DepthOfFieldSettings) {
        let (w, h) = ctx.scaled_size();
        let (hw, hh) = ((w / 2).max(1), (h / 2).max(1));
        let (source, destination) = (ctx.source(), ctx.destination());
        let max_coc = settings.kernel_size.radius() * h as f32 / 1080.0;

        let sheet = ctx.sheets.get(SHADER);
        sheet.clear();
        sheet.enable_keyword(settings.kernel_size.keyword());
        sheet.set_vector(
            "_DofParams",
            [settings.focus_distance, settings.lens_coefficient(), max_coc, 1.0 / max_coc.max(1e-4)],
        );
        sheet.set_texture("_CameraDepthTexture", CameraSurface::Depth.into());
        sheet.flush(&mut ctx.command);

        let coc = ctx.get_temporary_sized("dof_coc", w, h, wgpu::TextureFormat::R16Float, false);
        ctx.command.blit(CameraSurface::Depth.into(), coc.into(), SHADER, 0);

        let prefiltered = ctx.get_temporary_sized("dof_prefilter", hw, hh, wgpu::TextureFormat::Rgba16Float, false);
        ctx.sheets.get(SHADER).set_texture("_CoCTex", coc.into());
        ctx.sheets.get(SHADER).flush(&mut ctx.command);
        ctx.command.blit(source, prefiltered.into(), SHADER, 1);

        let bokeh = ctx.get_temporary_sized("dof_bokeh", hw, hh, wgpu::TextureFormat::Rgba16Float, false);
        ctx.command.blit(prefiltered.into(), bokeh.into(), SHADER, 2);
        // Postfilter back into the prefilter surface
        ctx.command.blit(bokeh.into(), prefiltered.into(), SHADER, 3);
        ctx.release_temporary(bokeh);

        let sheet = ctx.sheets.get(SHADER);
        sheet.set_texture("_DepthOfFieldTex", prefiltered.into());
        sheet.flush(&mut ctx.command);
        ctx.command.blit(source, destination, SHADER, 4);

        ctx.release_temporary(prefiltered);
        ctx.release_temporary(coc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::{Eye, View};
    use crate::render::caps::GpuCaps;

    #[test]
    fn test_lens_coefficient_grows_with_focal_length() {
        let wide = DepthOfFieldSettings { focal_length: 24.0, ..Default::default() };
        let tele = DepthOfFieldSettings { focal_length: 200.0, ..Default::default() };
        assert!(tele.lens_coefficient() > wide.lens_coefficient());
        assert!(wide.lens_coefficient() > 0.0);
    }

    #[test]
    fn test_passes_and_cleanup() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        ctx.begin_eye(&View::new(1920, 1080, 60.0), Eye::Left, 0);
        let tmp = ctx.get_temporary("stack_target");
        ctx.set_destination(tmp.into());

        DepthOfField.render(&mut ctx, &DepthOfFieldSettings { enabled: true, ..Default::default() });
        assert_eq!(ctx.command.blit_shaders().len(), 5);
        assert_eq!(ctx.pool().live_count(), 1);
        assert_eq!(ctx.command.validate(), Ok(()));
    }

    #[test]
    fn test_hidden_in_scene_view() {
        assert!(!DepthOfField::ATTRIBUTES.allow_in_scene_view);
    }
}
