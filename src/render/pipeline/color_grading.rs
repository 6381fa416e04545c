//! Colour grading and tonemapping through a baked lookup table
//!
//! The grading parameters are baked into a persistent LUT; the bake is only
//! re-recorded when the parameters or the HDR mode change.

use bytemuck::{Pod, Zeroable};

use crate::core::view::Eye;
use crate::effect::{Effect, EffectAttributes, EffectSettings};
use crate::render::command::{Command, CommandSequence, PersistentSurface};
use crate::render::context::RenderContext;
use crate::render::pipeline::UBER_SHADER;
use crate::render::surface_pool::SurfaceDesc;

/// LUT resolution per axis
pub const LUT_SIZE: u32 = 33;

const LUT: PersistentSurface = PersistentSurface::new("grading_lut", Eye::Left, 0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tonemapper {
    #[default]
    None,
    Neutral,
    Aces,
}

impl Tonemapper {
    fn index(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Neutral => 1,
            Self::Aces => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorGradingSettings {
    pub enabled: bool,
    pub tonemapper: Tonemapper,
    /// EV applied before the LUT
    pub post_exposure: f32,
    pub temperature: f32,
    pub tint: f32,
    pub color_filter: [f32; 3],
    pub hue_shift: f32,
    pub saturation: f32,
    pub contrast: f32,
}

impl Default for ColorGradingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            tonemapper: Tonemapper::None,
            post_exposure: 0.0,
            temperature: 0.0,
            tint: 0.0,
            color_filter: [1.0; 3],
            hue_shift: 0.0,
            saturation: 0.0,
            contrast: 0.0,
        }
    }
}

impl EffectSettings for ColorGradingSettings {
    fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Bake constants; compared against the last bake to skip redundant work
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LutParams {
    pub color_filter: [f32; 4],
    pub temperature: f32,
    pub tint: f32,
    pub hue_shift: f32,
    pub saturation: f32,
    pub contrast: f32,
    pub tonemapper: u32,
    pub hdr: u32,
    pub size: u32,
}

impl LutParams {
    fn new(settings: &ColorGradingSettings, hdr: bool) -> Self {
        let [r, g, b] = settings.color_filter;
        Self {
            color_filter: [r, g, b, 1.0],
            temperature: settings.temperature / 100.0,
            tint: settings.tint / 100.0,
            hue_shift: settings.hue_shift / 360.0,
            saturation: settings.saturation / 100.0 + 1.0,
            contrast: settings.contrast / 100.0 + 1.0,
            tonemapper: settings.tonemapper.index(),
            hdr: hdr as u32,
            size: LUT_SIZE,
        }
    }
}

#[derive(Debug, Default)]
pub struct ColorGrading {
    baked: Option<LutParams>,
    bakes: u64,
}

impl ColorGrading {
    /// Number of LUT bakes recorded so far
    pub fn bake_count(&self) -> u64 {
        self.bakes
    }
}

impl Effect for ColorGrading {
    type Settings = ColorGradingSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Color Grading");

    fn render(&mut self, ctx: &mut RenderContext, settings: &ColorGradingSettings) {
        let hdr = ctx.is_hdr();
        let params = LutParams::new(settings, hdr);

        if self.baked.is_none_or(|p| p.hdr != params.hdr) {
            // Layout differs between HDR (volume-like strip, float) and LDR (8-bit strip)
            if self.baked.is_some() {
                ctx.command.push(Command::FreePersistent { surface: LUT });
            }
            let format = if hdr { wgpu::TextureFormat::Rgba16Float } else { wgpu::TextureFormat::Rgba8Unorm };
            let mut desc = SurfaceDesc::new("grading_lut", LUT_SIZE * LUT_SIZE, LUT_SIZE, format);
            desc.random_write = ctx.caps().compute_shaders;
            ctx.command.push(Command::AllocatePersistent { surface: LUT, desc });
            self.baked = None;
        }

        if self.baked != Some(params) {
            ctx.command.begin_sample("LutBake");
            ctx.command.set_constants("lut_bake", &params);
            if ctx.caps().compute_shaders {
                ctx.command.push(Command::Dispatch {
                    kernel: "lut_bake",
                    reads: Vec::new(),
                    writes: vec![LUT.into()],
                    groups: [LUT_SIZE.div_ceil(4), LUT_SIZE.div_ceil(4), LUT_SIZE.div_ceil(4)],
                });
            } else {
                // Fragment fallback: render the strip with a fullscreen pass
                ctx.command.push(Command::Dispatch {
                    kernel: "lut_bake_fragment",
                    reads: Vec::new(),
                    writes: vec![LUT.into()],
                    groups: [1, 1, 1],
                });
            }
            ctx.command.end_sample("LutBake");
            self.baked = Some(params);
            self.bakes += 1;
        }

        let post_exposure = 2f32.powf(settings.post_exposure);
        let uber = ctx.sheets.get(UBER_SHADER);
        uber.enable_keyword(if hdr { "COLOR_GRADING_HDR" } else { "COLOR_GRADING_LDR" });
        uber.set_texture("_Lut", LUT.into());
        uber.set_vector("_Lut_Params", [1.0 / (LUT_SIZE * LUT_SIZE) as f32, 1.0 / LUT_SIZE as f32, LUT_SIZE as f32 - 1.0, post_exposure]);
    }

    fn release(&mut self, cmd: &mut CommandSequence) {
        if self.baked.take().is_some() {
            cmd.push(Command::FreePersistent { surface: LUT });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::View;
    use crate::render::caps::GpuCaps;

    fn context(hdr: bool) -> RenderContext {
        let mut view = View::new(1280, 720, 60.0);
        view.hdr = hdr;
        let mut ctx = RenderContext::new(GpuCaps::default());
        ctx.begin_eye(&view, Eye::Left, 0);
        ctx
    }

    #[test]
    fn test_rebake_only_on_change() {
        let mut ctx = context(true);
        let mut grading = ColorGrading::default();
        let mut settings = ColorGradingSettings { enabled: true, ..Default::default() };

        grading.render(&mut ctx, &settings);
        grading.render(&mut ctx, &settings);
        assert_eq!(grading.bake_count(), 1);

        settings.saturation = 20.0;
        grading.render(&mut ctx, &settings);
        assert_eq!(grading.bake_count(), 2);
        assert!(ctx.sheets.peek(UBER_SHADER).unwrap().has_keyword("COLOR_GRADING_HDR"));
    }

    #[test]
    fn test_hdr_switch_reallocates() {
        let mut grading = ColorGrading::default();
        let settings = ColorGradingSettings { enabled: true, ..Default::default() };
        let mut ctx = context(true);
        grading.render(&mut ctx, &settings);
        ctx.begin_eye(&View { hdr: false, ..View::new(1280, 720, 60.0) }, Eye::Left, 1);
        grading.render(&mut ctx, &settings);

        let frees = ctx.command.commands().iter().filter(|c| matches!(c, Command::FreePersistent { .. })).count();
        assert_eq!(frees, 1);
        assert_eq!(grading.bake_count(), 2);

        let mut cmd = CommandSequence::new();
        grading.release(&mut cmd);
        grading.release(&mut cmd);
        assert_eq!(cmd.len(), 1);
    }
}
