//! Persisted pipeline configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::effect::InjectionPoint;
use crate::render::antialiasing::{Antialiasing, FallbackMode, FxaaSettings, SmaaQuality};
use crate::render::upscale::{TaaSettings, UpscalerSettings};

/// Persisted order of user effects, one list per injection point
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketOrder {
    pub before_transparent: Vec<String>,
    pub before_upscaling: Vec<String>,
    pub before_stack: Vec<String>,
    pub after_stack: Vec<String>,
}

impl BucketOrder {
    pub fn get(&self, point: InjectionPoint) -> &[String] {
        match point {
            InjectionPoint::BeforeTransparent => &self.before_transparent,
            InjectionPoint::BeforeUpscaling => &self.before_upscaling,
            InjectionPoint::BeforeStack => &self.before_stack,
            InjectionPoint::AfterStack => &self.after_stack,
        }
    }

    pub fn set(&mut self, point: InjectionPoint, names: Vec<String>) {
        let slot = match point {
            InjectionPoint::BeforeTransparent => &mut self.before_transparent,
            InjectionPoint::BeforeUpscaling => &mut self.before_upscaling,
            InjectionPoint::BeforeStack => &mut self.before_stack,
            InjectionPoint::AfterStack => &mut self.after_stack,
        };
        *slot = names;
    }
}

/// Everything the host persists about a pipeline instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub antialiasing: Antialiasing,
    /// Used for the session when the selected upscaler is unsupported
    pub fallback: FallbackMode,
    pub upscaler: UpscalerSettings,
    pub taa: TaaSettings,
    pub fxaa: FxaaSettings,
    pub smaa: SmaaQuality,
    /// Scrub NaN and infinite pixels before they smear through temporal passes
    pub stop_nan_propagation: bool,
    pub dithering: bool,
    pub buckets: BucketOrder,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            antialiasing: Antialiasing::None,
            fallback: FallbackMode::Taa,
            upscaler: UpscalerSettings::default(),
            taa: TaaSettings::default(),
            fxaa: FxaaSettings::default(),
            smaa: SmaaQuality::default(),
            stop_nan_propagation: true,
            dithering: true,
            buckets: BucketOrder::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        log::debug!("loaded pipeline config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Save as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values the pipeline cannot use
    pub fn validate(&self) -> Result<()> {
        let up = &self.upscaler;
        if !(0.0..=1.0).contains(&up.sharpness) {
            return Err(Error::Config(format!("sharpness {} outside 0..=1", up.sharpness)));
        }
        if up.mip_bias.update_interval < 0.0 {
            return Err(Error::Config("mip bias update interval is negative".into()));
        }
        if self.taa.jitter_spread <= 0.0 {
            return Err(Error::Config(format!("TAA jitter spread {} must be positive", self.taa.jitter_spread)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::upscale::UpscalerQuality;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("postfx.json");

        let mut config = PipelineConfig {
            antialiasing: Antialiasing::Fsr3,
            fallback: FallbackMode::Smaa,
            ..Default::default()
        };
        config.upscaler.quality = UpscalerQuality::Performance;
        config.buckets.set(InjectionPoint::AfterStack, vec!["Outline".into(), "Tint".into()]);
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.buckets.get(InjectionPoint::AfterStack), &["Outline", "Tint"]);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{ "antialiasing": "Taa" }"#).unwrap();
        assert_eq!(config.antialiasing, Antialiasing::Taa);
        assert!(config.stop_nan_propagation);
        assert_eq!(config.upscaler, UpscalerSettings::default());
    }

    #[test]
    fn test_invalid_sharpness_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "upscaler": { "sharpness": 3.0 } }"#).unwrap();
        assert!(matches!(PipelineConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(PipelineConfig::load(&path), Err(Error::Json(_))));
        assert!(matches!(PipelineConfig::load(dir.path().join("missing.json")), Err(Error::Io(_))));
    }
}
