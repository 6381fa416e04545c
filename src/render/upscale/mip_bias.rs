//! Texture mip bias while rendering below display resolution
//!
//! Sampling at render resolution picks mips that are too blurry once the image
//! is upscaled. The bias is pushed to every texture the host has loaded, so it
//! is a global side effect owned by one pipeline instance.

use serde::{Deserialize, Serialize};

/// Host texture set the bias is applied to
pub trait TextureLibrary {
    /// Total bytes of loaded textures; a change means new textures appeared
    fn total_texture_memory(&self) -> u64;

    /// Apply `bias` to every loaded texture
    fn set_mip_bias(&mut self, bias: f32);
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MipBiasSettings {
    pub enabled: bool,
    /// Multiplier on the computed bias
    pub bias_override: f32,
    /// Minimum seconds between updates
    pub update_interval: f32,
}

impl Default for MipBiasSettings {
    fn default() -> Self {
        Self { enabled: true, bias_override: 1.0, update_interval: 2.0 }
    }
}

/// `(log2(render / display) - 1) * override`
pub fn compute_bias(render_width: u32, display_width: u32, bias_override: f32) -> f32 {
    let ratio = render_width.max(1) as f32 / display_width.max(1) as f32;
    (ratio.log2() - 1.0) * bias_override
}

/// Throttled mip-bias updater
#[derive(Debug, Default)]
pub struct MipBias {
    last_update: Option<f64>,
    bias: f32,
    memory: u64,
    applied: bool,
}

impl MipBias {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently applied bias, zero when inactive
    pub fn current(&self) -> f32 {
        if self.applied { self.bias } else { 0.0 }
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Recompute and push the bias if the interval elapsed and anything changed
    ///
    /// Returns true when the library was updated.
    pub fn update(
        &mut self,
        now: f64,
        render_width: u32,
        display_width: u32,
        settings: &MipBiasSettings,
        library: &mut dyn TextureLibrary,
    ) -> bool {
        if !settings.enabled {
            return false;
        }
        if let Some(last) = self.last_update
            && now - last < settings.update_interval as f64
        {
            return false;
        }
        self.last_update = Some(now);

        let bias = compute_bias(render_width, display_width, settings.bias_override);
        let memory = library.total_texture_memory();
        if self.applied && bias == self.bias && memory == self.memory {
            return false;
        }

        library.set_mip_bias(bias);
        log::debug!("mip bias {:.3} applied ({} bytes of textures)", bias, memory);
        self.bias = bias;
        self.memory = memory;
        self.applied = true;
        true
    }

    /// Restore zero bias when upscaling stops
    pub fn reset(&mut self, library: &mut dyn TextureLibrary) {
        if self.applied {
            library.set_mip_bias(0.0);
            log::debug!("mip bias reset");
        }
        *self = Self::default();
    }
}

/// Texture library for hosts that do not expose one
#[derive(Debug, Default)]
pub struct NullTextureLibrary;

impl TextureLibrary for NullTextureLibrary {
    fn total_texture_memory(&self) -> u64 {
        0
    }

    fn set_mip_bias(&mut self, _bias: f32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        memory: u64,
        calls: Vec<f32>,
    }

    impl TextureLibrary for Recorder {
        fn total_texture_memory(&self) -> u64 {
            self.memory
        }

        fn set_mip_bias(&mut self, bias: f32) {
            self.calls.push(bias);
        }
    }

    #[test]
    fn test_bias_formula() {
        assert_eq!(compute_bias(1920, 1920, 1.0), -1.0);
        assert_eq!(compute_bias(960, 1920, 1.0), -2.0);
        assert_eq!(compute_bias(960, 1920, 0.5), -1.0);
    }

    #[test]
    fn test_update_is_throttled_and_skips_unchanged() {
        let mut lib = Recorder { memory: 100, ..Default::default() };
        let mut mip = MipBias::new();
        let settings = MipBiasSettings::default();

        assert!(mip.update(0.0, 960, 1920, &settings, &mut lib));
        // Inside the interval
        assert!(!mip.update(1.0, 640, 1920, &settings, &mut lib));
        // Interval elapsed but nothing changed
        assert!(!mip.update(2.5, 960, 1920, &settings, &mut lib));
        // New textures loaded
        lib.memory = 200;
        assert!(mip.update(5.0, 960, 1920, &settings, &mut lib));
        assert_eq!(lib.calls, vec![-2.0, -2.0]);
    }

    #[test]
    fn test_reset_restores_zero() {
        let mut lib = Recorder::default();
        let mut mip = MipBias::new();
        mip.update(0.0, 960, 1920, &MipBiasSettings::default(), &mut lib);
        assert_eq!(mip.current(), -2.0);

        mip.reset(&mut lib);
        mip.reset(&mut lib);
        assert_eq!(lib.calls, vec![-2.0, 0.0]);
        assert_eq!(mip.current(), 0.0);
    }

    #[test]
    fn test_disabled_never_touches_library() {
        let mut lib = Recorder::default();
        let mut mip = MipBias::new();
        let settings = MipBiasSettings { enabled: false, ..Default::default() };
        assert!(!mip.update(0.0, 960, 1920, &settings, &mut lib));
        assert!(lib.calls.is_empty());
    }
}
