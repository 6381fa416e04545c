//! Film grain
//!
//! A small tiling grain texture is re-rendered into a persistent surface every
//! frame with a new seed and sampled by the uber pass.

use crate::core::view::Eye;
use crate::effect::{Effect, EffectAttributes, EffectSettings};
use crate::render::command::{Command, CommandSequence, PersistentSurface};
use crate::render::context::RenderContext;
use crate::render::pipeline::UBER_SHADER;
use crate::render::surface_pool::SurfaceDesc;
use crate::render::upscale::jitter::halton;

const GRAIN_SIZE: u32 = 128;
const LOOKUP: PersistentSurface = PersistentSurface::new("grain_lookup", Eye::Left, 0);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrainSettings {
    pub enabled: bool,
    pub colored: bool,
    pub intensity: f32,
    /// Grain particle size, 0.3 to 3
    pub size: f32,
    /// How much scene luminance masks the grain
    pub luminance_contribution: f32,
}

impl Default for GrainSettings {
    fn default() -> Self {
        Self { enabled: false, colored: true, intensity: 0.0, size: 1.0, luminance_contribution: 0.8 }
    }
}

impl EffectSettings for GrainSettings {
    fn enabled(&self) -> bool {
        self.enabled && self.intensity > 0.0
    }
}

#[derive(Debug, Default)]
pub struct Grain {
    allocated: bool,
}

impl Effect for Grain {
    type Settings = GrainSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Grain");

    fn render(&mut self, ctx: &mut RenderContext, settings: &GrainSettings) {
        if !self.allocated {
            let desc = SurfaceDesc::new("grain_lookup", GRAIN_SIZE, GRAIN_SIZE, wgpu::TextureFormat::Rgba16Float);
            ctx.command.push(Command::AllocatePersistent { surface: LOOKUP, desc });
            self.allocated = true;
        }

        // Seed wraps so precision stays usable on long sessions
        let seed = ctx.time() % 10.0;
        let frame = (ctx.frame_index() % 1024) as u32 + 1;
        let sheet = ctx.sheets.get("grain_bake");
        sheet.clear();
        sheet.enable_keyword(if settings.colored { "GRAIN_COLORED" } else { "GRAIN_MONO" });
        sheet.set_vector("_Phase", [seed, halton(frame, 2), halton(frame, 3), settings.size.clamp(0.3, 3.0)]);
        sheet.flush(&mut ctx.command);
        ctx.command.push(Command::Dispatch {
            kernel: "grain_bake",
            reads: Vec::new(),
            writes: vec![LOOKUP.into()],
            groups: [GRAIN_SIZE / 8, GRAIN_SIZE / 8, 1],
        });

        let (w, h) = ctx.scaled_size();
        let uber = ctx.sheets.get(UBER_SHADER);
        uber.enable_keyword("GRAIN");
        uber.set_texture("_GrainTex", LOOKUP.into());
        uber.set_vector(
            "_Grain_Params1",
            [settings.luminance_contribution, settings.intensity * 20.0, 0.0, 0.0],
        );
        uber.set_vector(
            "_Grain_Params2",
            [w as f32 / GRAIN_SIZE as f32 / settings.size, h as f32 / GRAIN_SIZE as f32 / settings.size, halton(frame, 2), halton(frame, 3)],
        );
    }

    fn release(&mut self, cmd: &mut CommandSequence) {
        if self.allocated {
            cmd.push(Command::FreePersistent { surface: LOOKUP });
            self.allocated = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::View;
    use crate::render::caps::GpuCaps;

    #[test]
    fn test_lookup_allocated_once() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        ctx.begin_eye(&View::new(1280, 720, 60.0), Eye::Left, 0);
        let mut grain = Grain::default();
        let settings = GrainSettings { enabled: true, intensity: 0.5, ..Default::default() };
        grain.render(&mut ctx, &settings);
        grain.render(&mut ctx, &settings);

        let allocs = ctx
            .command
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::AllocatePersistent { .. }))
            .count();
        assert_eq!(allocs, 1);
        assert_eq!(ctx.command.dispatch_kernels(), vec!["grain_bake", "grain_bake"]);
        assert!(ctx.sheets.peek(UBER_SHADER).unwrap().has_keyword("GRAIN"));

        let mut cmd = CommandSequence::new();
        grain.release(&mut cmd);
        grain.release(&mut cmd);
        assert_eq!(cmd.len(), 1);
    }
}
