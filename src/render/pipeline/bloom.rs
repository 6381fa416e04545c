//! Bloom
//!
//! Prefilter into a half-resolution surface, downsample into a mip pyramid,
//! then upsample back up additively. The top of the pyramid is handed to the
//! uber pass and released once the uber blit is recorded.

use crate::effect::{Effect, EffectAttributes, EffectSettings};
use crate::render::context::RenderContext;
use crate::render::pipeline::UBER_SHADER;
use crate::render::surface_pool::SurfaceHandle;

const SHADER: &str = "bloom";
const MAX_PYRAMID_SIZE: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomSettings {
    pub enabled: bool,
    pub intensity: f32,
    /// Gamma-space brightness threshold
    pub threshold: f32,
    pub soft_knee: f32,
    /// Clamp on source luminance to tame fireflies
    pub clamp: f32,
    /// 1..10, controls pyramid depth
    pub diffusion: f32,
    /// -1 vertical to 1 horizontal stretch
    pub anamorphic_ratio: f32,
    pub color: [f32; 3],
    /// 4-tap filters instead of 13/9-tap
    pub fast_mode: bool,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            intensity: 0.0,
            threshold: 1.0,
            soft_knee: 0.5,
            clamp: 65472.0,
            diffusion: 7.0,
            anamorphic_ratio: 0.0,
            color: [1.0; 3],
            fast_mode: false,
        }
    }
}

impl EffectSettings for BloomSettings {
    fn enabled(&self) -> bool {
        self.enabled && self.intensity > 0.0
    }
}

/// Number of pyramid levels for a half-resolution base
pub fn pyramid_levels(width: u32, height: u32, diffusion: f32) -> usize {
    let size = width.max(height).max(1) as f32;
    let log = size.log2() + diffusion.clamp(1.0, 10.0) - 10.0;
    let levels = log.floor().max(1.0) as usize;
    levels.clamp(1, MAX_PYRAMID_SIZE)
}

#[derive(Debug, Default)]
pub struct Bloom {
    last_levels: usize,
}

impl Bloom {
    /// Pyramid depth used by the last frame
    pub fn last_levels(&self) -> usize {
        self.last_levels
    }
}

impl Effect for Bloom {
    type Settings = BloomSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Bloom");

    fn render(&mut self, ctx: &mut RenderContext, settings: &BloomSettings) {
        ctx.command.begin_sample("BloomPyramid");
        let source = ctx.source();
        let (w, h) = ctx.scaled_size();

        // Anamorphic stretch shrinks one axis of the pyramid base
        let ratio = settings.anamorphic_ratio.clamp(-1.0, 1.0);
        let rw = if ratio < 0.0 { -ratio } else { 0.0 };
        let rh = if ratio > 0.0 { ratio } else { 0.0 };
        let tw = ((w as f32 / (2.0 - rw)) as u32).max(1);
        let th = ((h as f32 / (2.0 - rh)) as u32).max(1);

        let levels = pyramid_levels(tw, th, settings.diffusion);
        self.last_levels = levels;

        let lthresh = settings.threshold.max(0.0);
        let knee = lthresh * settings.soft_knee + 1e-5;
        let sheet = ctx.sheets.get(SHADER);
        sheet.clear();
        sheet.set_vector("_Threshold", [lthresh, lthresh - knee, knee * 2.0, 0.25 / knee]);
        sheet.set_vector("_Params", [settings.clamp, 0.0, 0.0, 0.0]);
        sheet.set_float("_SampleScale", 0.5 + (settings.diffusion.clamp(1.0, 10.0) - 1.0) / 9.0);
        sheet.flush(&mut ctx.command);

        let pass_offset = if settings.fast_mode { 1 } else { 0 };
        let mut down: Vec<SurfaceHandle> = Vec::with_capacity(levels);
        let mut up: Vec<SurfaceHandle> = Vec::with_capacity(levels);
        let (mut lw, mut lh) = (tw, th);
        let mut last = source;
        for i in 0..levels {
            let d = ctx.get_temporary_sized("bloom_down", lw, lh, wgpu::TextureFormat::Rgba16Float, false);
            let pass = if i == 0 { pass_offset } else { 2 + pass_offset };
            ctx.command.blit(last, d.into(), SHADER, pass);
            down.push(d);
            last = d.into();
            lw = (lw / 2).max(1);
            lh = (lh / 2).max(1);
        }

        // Upsample: each level combines the level above with the matching down level
        let mut last_handle = down[levels - 1];
        for i in (0..levels.saturating_sub(1)).rev() {
            let desc = ctx.pool().desc(down[i]).copied();
            let Some(desc) = desc else { break };
            let u = ctx.get_temporary_sized("bloom_up", desc.width, desc.height, desc.format, false);
            let sheet = ctx.sheets.get(SHADER);
            sheet.set_texture("_BloomTex", down[i].into());
            sheet.flush(&mut ctx.command);
            ctx.command.blit(last_handle.into(), u.into(), SHADER, 4 + pass_offset);
            up.push(u);
            last_handle = u;
        }

        // Everything except the pyramid top goes back now
        for handle in down.into_iter().chain(up) {
            if handle != last_handle {
                ctx.release_temporary(handle);
            }
        }
        ctx.defer_release(last_handle);

        let [r, g, b] = settings.color;
        let linear_intensity = 2f32.powf(settings.intensity / 10.0) - 1.0;
        let sheet = ctx.sheets.get(UBER_SHADER);
        sheet.enable_keyword(if settings.fast_mode { "BLOOM_LOW" } else { "BLOOM" });
        sheet.set_texture("_BloomTex", last_handle.into());
        sheet.set_vector("_Bloom_Settings", [0.5 + (settings.diffusion - 1.0) / 9.0, linear_intensity, 0.0, 0.0]);
        sheet.set_vector("_Bloom_Color", [r, g, b, 1.0]);
        ctx.command.end_sample("BloomPyramid");
    }
}
