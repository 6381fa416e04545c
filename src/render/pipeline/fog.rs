//! Depth-based fog (opaque-only stage)

use crate::effect::{DepthFlags, Effect, EffectAttributes, EffectSettings};
use crate::render::command::CameraSurface;
use crate::render::context::RenderContext;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FogMode {
    Linear,
    #[default]
    Exponential,
    ExponentialSquared,
}

impl FogMode {
    fn keyword(self) -> &'static str {
        match self {
            Self::Linear => "FOG_LINEAR",
            Self::Exponential => "FOG_EXP",
            Self::ExponentialSquared => "FOG_EXP2",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FogSettings {
    pub enabled: bool,
    pub mode: FogMode,
    pub color: [f32; 3],
    pub density: f32,
    pub start: f32,
    pub end: f32,
    pub exclude_skybox: bool,
}

impl Default for FogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: FogMode::Exponential,
            color: [0.5, 0.5, 0.5],
            density: 0.01,
            start: 0.0,
            end: 300.0,
            exclude_skybox: true,
        }
    }
}

impl EffectSettings for FogSettings {
    fn enabled(&self) -> bool {
        self.enabled
    }
}

#[derive(Debug, Default)]
pub struct Fog;

impl Effect for Fog {
    type Settings = FogSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Fog");

    fn depth_flags(&self, _settings: &FogSettings) -> DepthFlags {
        DepthFlags::DEPTH
    }

    fn render(&mut self, ctx: &mut RenderContext, settings: &FogSettings) {
        let (source, destination) = (ctx.source(), ctx.destination());
        let sheet = ctx.sheets.get("deferred_fog");
        sheet.clear();
        sheet.enable_keyword(settings.mode.keyword());
        let [r, g, b] = settings.color;
        sheet.set_vector("_FogColor", [r, g, b, 1.0]);
        sheet.set_vector("_FogParams", [settings.density, settings.start, settings.end, 0.0]);
        sheet.set_texture("_CameraDepthTexture", CameraSurface::Depth.into());
        sheet.flush(&mut ctx.command);
        let pass = if settings.exclude_skybox { 1 } else { 0 };
        ctx.command.blit(source, destination, "deferred_fog", pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::{Eye, View};
    use crate::render::caps::GpuCaps;
    use crate::render::command::Command;

    #[test]
    fn test_skybox_pass_selection() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        ctx.begin_eye(&View::new(800, 600, 60.0), Eye::Left, 0);
        ctx.set_destination(CameraSurface::OpaqueCopy.into());
        Fog.render(&mut ctx, &FogSettings { enabled: true, exclude_skybox: false, ..Default::default() });

        let pass = ctx.command.commands().iter().find_map(|c| match c {
            Command::Blit { pass, .. } => Some(*pass),
            _ => None,
        });
        assert_eq!(pass, Some(0));
        assert!(ctx.sheets.peek("deferred_fog").unwrap().has_keyword("FOG_EXP"));
    }
}
