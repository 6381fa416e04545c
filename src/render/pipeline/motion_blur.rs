//! Reconstruction-filter motion blur driven by camera motion vectors

use crate::effect::{DepthFlags, Effect, EffectAttributes, EffectSettings};
use crate::render::caps::GpuCaps;
use crate::render::command::CameraSurface;
use crate::render::context::RenderContext;

const SHADER: &str = "motion_blur";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionBlurSettings {
    pub enabled: bool,
    /// Degrees, 360 = full frame exposure
    pub shutter_angle: f32,
    pub sample_count: u32,
}

impl Default for MotionBlurSettings {
    fn default() -> Self {
        Self { enabled: false, shutter_angle: 270.0, sample_count: 10 }
    }
}

impl EffectSettings for MotionBlurSettings {
    fn enabled(&self) -> bool {
        self.enabled && self.shutter_angle > 0.0 && self.sample_count > 0
    }
}

#[derive(Debug, Default)]
pub struct MotionBlur;

impl Effect for MotionBlur {
    type Settings = MotionBlurSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Motion Blur").hidden_in_scene_view();

    fn is_supported(&self, caps: &GpuCaps) -> bool {
        caps.motion_vectors
    }

    fn depth_flags(&self, _settings: &MotionBlurSettings) -> DepthFlags {
        DepthFlags::MOTION_VECTORS
    }

    fn render(&mut self, ctx: &mut RenderContext, settings: &MotionBlurSettings) {
        let (w, h) = ctx.scaled_size();
        let (source, destination) = (ctx.source(), ctx.destination());
        // Max blur radius is 5% of the screen height, tiles cover it
        let max_radius = h as f32 * 0.05;
        let tile = (max_radius.ceil() as u32).next_power_of_two().max(8);
        let (tw, th) = (w.div_ceil(tile), h.div_ceil(tile));

        let sheet = ctx.sheets.get(SHADER);
        sheet.clear();
        sheet.set_vector(
            "_BlurParams",
            [settings.shutter_angle / 360.0, max_radius, settings.sample_count as f32, tile as f32],
        );
        sheet.flush(&mut ctx.command);

        let velocity = ctx.get_temporary_sized("mb_velocity", w, h, wgpu::TextureFormat::Rgb10a2Unorm, false);
        ctx.command.blit(CameraSurface::MotionVectors.into(), velocity.into(), SHADER, 0);

        let tile_max = ctx.get_temporary_sized("mb_tile_max", tw, th, wgpu::TextureFormat::Rg16Float, false);
        ctx.command.blit(velocity.into(), tile_max.into(), SHADER, 1);
        let neighbor_max = ctx.get_temporary_sized("mb_neighbor_max", tw, th, wgpu::TextureFormat::Rg16Float, false);
        ctx.command.blit(tile_max.into(), neighbor_max.into(), SHADER, 2);
        ctx.release_temporary(tile_max);

        let sheet = ctx.sheets.get(SHADER);
        sheet.set_texture("_VelocityTex", velocity.into());
        sheet.set_texture("_NeighborMaxTex", neighbor_max.into());
        sheet.flush(&mut ctx.command);
        ctx.command.blit(source, destination, SHADER, 3);

        ctx.release_temporary(neighbor_max);
        ctx.release_temporary(velocity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::{Eye, View};

    #[test]
    fn test_reconstruction_chain() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        ctx.begin_eye(&View::new(1920, 1080, 60.0), Eye::Left, 0);
        let tmp = ctx.get_temporary("stack_target");
        ctx.set_destination(tmp.into());

        MotionBlur.render(&mut ctx, &MotionBlurSettings { enabled: true, ..Default::default() });
        assert_eq!(ctx.command.blit_shaders(), vec![SHADER; 4]);
        assert_eq!(ctx.pool().live_count(), 1);
        assert_eq!(ctx.command.validate(), Ok(()));
    }

    #[test]
    fn test_zero_shutter_disables() {
        let settings = MotionBlurSettings { enabled: true, shutter_angle: 0.0, ..Default::default() };
        assert!(!settings.enabled());
        assert!(!MotionBlur.is_supported(&GpuCaps::minimal()));
    }
}
