//! Vignette, applied inside the uber pass

use crate::effect::{Effect, EffectAttributes, EffectSettings};
use crate::render::context::RenderContext;
use crate::render::pipeline::UBER_SHADER;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VignetteSettings {
    pub enabled: bool,
    pub color: [f32; 3],
    pub center: [f32; 2],
    pub intensity: f32,
    pub smoothness: f32,
    pub roundness: f32,
    /// Perfectly round regardless of aspect ratio
    pub rounded: bool,
}

impl Default for VignetteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            color: [0.0; 3],
            center: [0.5, 0.5],
            intensity: 0.0,
            smoothness: 0.2,
            roundness: 1.0,
            rounded: false,
        }
    }
}

impl EffectSettings for VignetteSettings {
    fn enabled(&self) -> bool {
        self.enabled && self.intensity > 0.0
    }
}

#[derive(Debug, Default)]
pub struct Vignette;

impl Effect for Vignette {
    type Settings = VignetteSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Vignette");

    fn render(&mut self, ctx: &mut RenderContext, settings: &VignetteSettings) {
        let roundness = (1.0 - settings.roundness) * 6.0 + settings.roundness;
        let [r, g, b] = settings.color;
        let sheet = ctx.sheets.get(UBER_SHADER);
        sheet.enable_keyword("VIGNETTE");
        sheet.set_vector("_Vignette_Color", [r, g, b, 1.0]);
        sheet.set_vector("_Vignette_Center", [settings.center[0], settings.center[1], 0.0, 0.0]);
        sheet.set_vector(
            "_Vignette_Settings",
            [
                settings.intensity * 3.0,
                settings.smoothness * 5.0,
                roundness,
                if settings.rounded { 1.0 } else { 0.0 },
            ],
        );
    }
}
