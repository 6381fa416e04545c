//! Chromatic aberration, applied inside the uber pass

use crate::effect::{Effect, EffectAttributes, EffectSettings};
use crate::render::context::RenderContext;
use crate::render::pipeline::UBER_SHADER;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChromaticAberrationSettings {
    pub enabled: bool,
    pub intensity: f32,
    /// Fixed three-tap spectral lookup instead of a sampled LUT
    pub fast_mode: bool,
}

impl Default for ChromaticAberrationSettings {
    fn default() -> Self {
        Self { enabled: false, intensity: 0.0, fast_mode: false }
    }
}

impl EffectSettings for ChromaticAberrationSettings {
    fn enabled(&self) -> bool {
        self.enabled && self.intensity > 0.0
    }
}

#[derive(Debug, Default)]
pub struct ChromaticAberration;

impl Effect for ChromaticAberration {
    type Settings = ChromaticAberrationSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Chromatic Aberration");

    fn render(&mut self, ctx: &mut RenderContext, settings: &ChromaticAberrationSettings) {
        let sheet = ctx.sheets.get(UBER_SHADER);
        sheet.enable_keyword(if settings.fast_mode { "CHROMATIC_ABERRATION_LOW" } else { "CHROMATIC_ABERRATION" });
        sheet.set_float("_ChromaticAberration_Amount", settings.intensity.clamp(0.0, 1.0) * 0.05);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::caps::GpuCaps;

    #[test]
    fn test_fast_mode_keyword() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        let settings = ChromaticAberrationSettings { enabled: true, intensity: 1.0, fast_mode: true };
        ChromaticAberration.render(&mut ctx, &settings);
        let sheet = ctx.sheets.peek(UBER_SHADER).unwrap();
        assert!(sheet.has_keyword("CHROMATIC_ABERRATION_LOW"));
        assert_eq!(sheet.vector("_ChromaticAberration_Amount"), Some([0.05, 0.0, 0.0, 0.0]));
    }
}
