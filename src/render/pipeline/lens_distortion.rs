//! Barrel/pincushion distortion, applied inside the uber pass

use crate::effect::{Effect, EffectAttributes, EffectSettings};
use crate::render::context::RenderContext;
use crate::render::pipeline::UBER_SHADER;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LensDistortionSettings {
    pub enabled: bool,
    /// -100 (pincushion) to 100 (barrel)
    pub intensity: f32,
    pub x_multiplier: f32,
    pub y_multiplier: f32,
    pub center: [f32; 2],
    pub scale: f32,
}

impl Default for LensDistortionSettings {
    fn default() -> Self {
        Self { enabled: false, intensity: 0.0, x_multiplier: 1.0, y_multiplier: 1.0, center: [0.0; 2], scale: 1.0 }
    }
}

impl EffectSettings for LensDistortionSettings {
    fn enabled(&self) -> bool {
        self.enabled && self.intensity.abs() > 0.0 && (self.x_multiplier > 0.0 || self.y_multiplier > 0.0)
    }
}

#[derive(Debug, Default)]
pub struct LensDistortion;

impl Effect for LensDistortion {
    type Settings = LensDistortionSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Lens Distortion").hidden_in_scene_view();

    fn render(&mut self, ctx: &mut RenderContext, settings: &LensDistortionSettings) {
        let amount = 1.6 * settings.intensity.abs().max(1.0);
        let theta = (amount.min(160.0) / 2.0).to_radians();
        let sigma = 2.0 * theta.tan();

        let sheet = ctx.sheets.get(UBER_SHADER);
        sheet.enable_keyword("DISTORT");
        sheet.set_vector(
            "_Distortion_CenterScale",
            [settings.center[0], settings.center[1], settings.x_multiplier.max(1e-4), settings.y_multiplier.max(1e-4)],
        );
        sheet.set_vector(
            "_Distortion_Amount",
            [
                if settings.intensity >= 0.0 { theta } else { 1.0 / theta },
                sigma,
                1.0 / settings.scale.max(0.01),
                settings.intensity,
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::caps::GpuCaps;

    #[test]
    fn test_sets_uber_state() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        let settings = LensDistortionSettings { enabled: true, intensity: 30.0, ..Default::default() };
        assert!(settings.enabled());
        LensDistortion.render(&mut ctx, &settings);

        let sheet = ctx.sheets.peek(UBER_SHADER).unwrap();
        assert!(sheet.has_keyword("DISTORT"));
        assert_eq!(sheet.vector("_Distortion_Amount").map(|v| v[3]), Some(30.0));
        assert!(ctx.command.is_empty());
    }
}
