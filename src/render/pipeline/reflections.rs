//! Screen-space reflections (opaque-only stage, compute)

use bytemuck::{Pod, Zeroable};

use crate::effect::{DepthFlags, Effect, EffectAttributes, EffectSettings};
use crate::render::caps::GpuCaps;
use crate::render::command::CameraSurface;
use crate::render::context::RenderContext;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReflectionResolution {
    #[default]
    Half,
    Full,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReflectionSettings {
    pub enabled: bool,
    pub resolution: ReflectionResolution,
    pub max_march_distance: f32,
    pub thickness: f32,
    pub distance_fade: f32,
    pub vignette: f32,
}

impl Default for ReflectionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            resolution: ReflectionResolution::Half,
            max_march_distance: 100.0,
            thickness: 0.5,
            distance_fade: 0.5,
            vignette: 0.5,
        }
    }
}

impl EffectSettings for ReflectionSettings {
    fn enabled(&self) -> bool {
        self.enabled
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct TraceParams {
    pub size: [f32; 2],
    pub max_march_distance: f32,
    pub thickness: f32,
    pub distance_fade: f32,
    pub vignette: f32,
    pub _pad: [f32; 2],
}

#[derive(Debug, Default)]
pub struct ScreenSpaceReflections;

impl Effect for ScreenSpaceReflections {
    type Settings = ReflectionSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Screen-space Reflections");

    fn is_supported(&self, caps: &GpuCaps) -> bool {
        caps.compute_shaders
    }

    fn depth_flags(&self, _settings: &ReflectionSettings) -> DepthFlags {
        DepthFlags::DEPTH_NORMALS
    }

    fn render(&mut self, ctx: &mut RenderContext, settings: &ReflectionSettings) {
        let (w, h) = ctx.scaled_size();
        let (tw, th) = match settings.resolution {
            ReflectionResolution::Half => ((w / 2).max(1), (h / 2).max(1)),
            ReflectionResolution::Full => (w, h),
        };
        let (source, destination) = (ctx.source(), ctx.destination());
        let trace = ctx.get_temporary_sized("ssr_trace", tw, th, wgpu::TextureFormat::Rgba16Float, true);

        let params = TraceParams {
            size: [tw as f32, th as f32],
            max_march_distance: settings.max_march_distance,
            thickness: settings.thickness,
            distance_fade: settings.distance_fade,
            vignette: settings.vignette,
            _pad: [0.0; 2],
        };
        ctx.command.set_constants("ssr_trace", &params);
        ctx.command.dispatch(
            "ssr_trace",
            vec![source, CameraSurface::Depth.into()],
            vec![trace.into()],
            [tw.div_ceil(8), th.div_ceil(8), 1],
        );

        let sheet = ctx.sheets.get("ssr_composite");
        sheet.clear();
        sheet.set_texture("_ReflectionTex", trace.into());
        sheet.set_float("_DistanceFade", settings.distance_fade);
        sheet.flush(&mut ctx.command);
        ctx.command.blit(source, destination, "ssr_composite", 0);

        ctx.release_temporary(trace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::{Eye, View};

    #[test]
    fn test_needs_compute() {
        assert!(!ScreenSpaceReflections.is_supported(&GpuCaps::minimal()));
        assert!(ScreenSpaceReflections.is_supported(&GpuCaps::default()));
    }

    #[test]
    fn test_half_resolution_trace() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        ctx.begin_eye(&View::new(1920, 1080, 60.0), Eye::Left, 0);
        ctx.set_destination(CameraSurface::OpaqueCopy.into());
        ScreenSpaceReflections.render(&mut ctx, &ReflectionSettings { enabled: true, ..Default::default() });

        let trace = ctx
            .command
            .commands()
            .iter()
            .find_map(|c| match c {
                crate::render::command::Command::GetTemporary { desc, .. } => Some(*desc),
                _ => None,
            })
            .unwrap();
        assert_eq!((trace.width, trace.height), (960, 540));
        assert_eq!(ctx.pool().live_count(), 0);
    }
}
