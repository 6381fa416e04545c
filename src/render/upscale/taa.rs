//! Temporal anti-aliasing at native resolution
//!
//! Baseline temporal backend: no upscale, eight-phase jitter scaled by
//! `jitter_spread`, and a history blend driven by motion vectors.

use serde::{Deserialize, Serialize};

use super::{DispatchInputs, Upscaler, UpscalerCore, UpscalerKind, UpscalerQuality, UpscalerSettings, UpscalerSetup, groups_for};
use crate::core::view::Eye;
use crate::render::caps::GpuCaps;
use crate::render::context::RenderContext;
use crate::render::surface_pool::SurfaceHandle;

pub const KERNEL_RESOLVE: &str = "taa_resolve";

/// Phase count of the TAA jitter cycle
const TAA_PHASES: u32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaaSettings {
    /// Jitter radius in render pixels; larger is blurrier but more stable
    pub jitter_spread: f32,
    pub sharpness: f32,
    /// History weight for static fragments
    pub stationary_blending: f32,
    /// History weight for moving fragments
    pub motion_blending: f32,
}

impl Default for TaaSettings {
    fn default() -> Self {
        Self { jitter_spread: 0.75, sharpness: 0.25, stationary_blending: 0.95, motion_blending: 0.85 }
    }
}

/// Blend parameters for the resolve kernel
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TaaBlend {
    pub sharpness: f32,
    pub stationary_blending: f32,
    pub motion_blending: f32,
    pub _pad: f32,
}

pub struct TaaUpscaler {
    core: UpscalerCore,
    settings: TaaSettings,
}

impl TaaUpscaler {
    pub fn new(eye: Eye, settings: TaaSettings) -> Self {
        Self { core: UpscalerCore::new(UpscalerKind::Taa, eye), settings }
    }

    pub fn settings(&self) -> &TaaSettings {
        &self.settings
    }
}

impl Upscaler for TaaUpscaler {
    fn core(&self) -> &UpscalerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut UpscalerCore {
        &mut self.core
    }

    fn check_support(&self, caps: &GpuCaps) -> bool {
        // Resolve writes the output and the next history in one pass
        caps.motion_vectors && caps.max_color_attachments >= 2
    }

    fn effective_quality(&self, _settings: &UpscalerSettings) -> UpscalerQuality {
        UpscalerQuality::NativeAa
    }

    fn jitter_scale(&self) -> f32 {
        self.settings.jitter_spread
    }

    fn jitter_phases(&self, _setup: &UpscalerSetup) -> u32 {
        TAA_PHASES
    }

    fn record(
        &mut self,
        ctx: &mut RenderContext,
        inputs: &DispatchInputs,
        output: SurfaceHandle,
        reset: bool,
    ) -> SurfaceHandle {
        let constants = self.core.constants(ctx, reset, 0);
        let blend = TaaBlend {
            sharpness: self.settings.sharpness,
            stationary_blending: self.settings.stationary_blending.clamp(0.0, 0.99),
            motion_blending: self.settings.motion_blending.clamp(0.0, 0.99),
            _pad: 0.0,
        };
        let history = self.core.history();
        let mut reads = vec![inputs.color];
        reads.extend(inputs.depth);
        reads.extend(inputs.motion_vectors);
        reads.push(history.read());
        let writes = vec![output.into(), history.write()];

        ctx.command.set_constants(KERNEL_RESOLVE, &constants);
        ctx.command.set_constants("taa_blend", &blend);
        ctx.command.dispatch(KERNEL_RESOLVE, reads, writes, groups_for(ctx.display_size()));
        output
    }
}
