//! Screen-space ambient occlusion (opaque-only stage)

use bytemuck::{Pod, Zeroable};

use crate::effect::{DepthFlags, Effect, EffectAttributes, EffectSettings};
use crate::render::caps::GpuCaps;
use crate::render::command::CameraSurface;
use crate::render::context::RenderContext;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmbientOcclusionSettings {
    pub enabled: bool,
    pub intensity: f32,
    /// World-space sample radius
    pub radius: f32,
    pub thickness: f32,
    pub color: [f32; 3],
    /// Only darken ambient lighting (deferred hosts)
    pub ambient_only: bool,
}

impl Default for AmbientOcclusionSettings {
    fn default() -> Self {
        Self { enabled: false, intensity: 0.5, radius: 0.25, thickness: 1.0, color: [0.0; 3], ambient_only: false }
    }
}

impl EffectSettings for AmbientOcclusionSettings {
    fn enabled(&self) -> bool {
        self.enabled && self.intensity > 0.0
    }
}

/// AO kernel parameters
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct AoParams {
    pub size: [f32; 2],
    pub intensity: f32,
    pub radius: f32,
    pub thickness: f32,
    pub _pad: [f32; 3],
}

#[derive(Debug, Default)]
pub struct AmbientOcclusion;

impl Effect for AmbientOcclusion {
    type Settings = AmbientOcclusionSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Ambient Occlusion");

    fn is_supported(&self, caps: &GpuCaps) -> bool {
        caps.compute_shaders
    }

    fn depth_flags(&self, _settings: &AmbientOcclusionSettings) -> DepthFlags {
        DepthFlags::DEPTH_NORMALS
    }

    fn render(&mut self, ctx: &mut RenderContext, settings: &AmbientOcclusionSettings) {
        let (w, h) = ctx.scaled_size();
        let (source, destination) = (ctx.source(), ctx.destination());
        let occlusion = ctx.get_temporary_sized("ao_occlusion", w, h, wgpu::TextureFormat::R8Unorm, true);

        let params = AoParams {
            size: [w as f32, h as f32],
            intensity: settings.intensity,
            radius: settings.radius,
            thickness: settings.thickness,
            _pad: [0.0; 3],
        };
        ctx.command.set_constants("ao_compute", &params);
        ctx.command.dispatch(
            "ao_compute",
            vec![CameraSurface::Depth.into()],
            vec![occlusion.into()],
            [w.div_ceil(8), h.div_ceil(8), 1],
        );

        let sheet = ctx.sheets.get("ao_composite");
        sheet.clear();
        if settings.ambient_only {
            sheet.enable_keyword("AO_AMBIENT_ONLY");
        }
        let [r, g, b] = settings.color;
        sheet.set_vector("_AOColor", [r, g, b, settings.intensity]);
        sheet.set_texture("_AOTex", occlusion.into());
        sheet.flush(&mut ctx.command);
        ctx.command.blit(source, destination, "ao_composite", 0);

        ctx.release_temporary(occlusion);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::{Eye, View};

    #[test]
    fn test_occlusion_scratch_is_released() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        ctx.begin_eye(&View::new(1280, 720, 60.0), Eye::Left, 0);
        ctx.set_destination(CameraSurface::OpaqueCopy.into());
        let settings = AmbientOcclusionSettings { enabled: true, ..Default::default() };

        AmbientOcclusion.render(&mut ctx, &settings);
        assert_eq!(ctx.command.dispatch_kernels(), vec!["ao_compute"]);
        assert_eq!(ctx.command.blit_shaders(), vec!["ao_composite"]);
        assert_eq!(ctx.pool().live_count(), 0);
        assert_eq!(ctx.command.validate(), Ok(()));
    }

    #[test]
    fn test_zero_intensity_disables() {
        let settings = AmbientOcclusionSettings { enabled: true, intensity: 0.0, ..Default::default() };
        assert!(!settings.enabled());
    }
}
