//! FidelityFX Super Resolution 1: spatial upscale
//!
//! Edge-adaptive upsampling (EASU) followed by optional robust
//! contrast-adaptive sharpening (RCAS). No jitter and no history.

use super::{DispatchInputs, FLAG_SHARPEN, Upscaler, UpscalerCore, UpscalerKind, groups_for};
use crate::core::view::Eye;
use crate::render::caps::GpuCaps;
use crate::render::context::RenderContext;
use crate::render::surface_pool::SurfaceHandle;

pub const KERNEL_EASU: &str = "fsr1_easu";
pub const KERNEL_RCAS: &str = "fsr1_rcas";

pub struct Fsr1Upscaler {
    core: UpscalerCore,
}

impl Fsr1Upscaler {
    pub fn new(eye: Eye) -> Self {
        Self { core: UpscalerCore::new(UpscalerKind::Fsr1, eye) }
    }
}

impl Upscaler for Fsr1Upscaler {
    fn core(&self) -> &UpscalerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut UpscalerCore {
        &mut self.core
    }

    fn check_support(&self, caps: &GpuCaps) -> bool {
        caps.compute_shaders
    }

    fn jitter_scale(&self) -> f32 {
        0.0
    }

    fn record(
        &mut self,
        ctx: &mut RenderContext,
        inputs: &DispatchInputs,
        output: SurfaceHandle,
        reset: bool,
    ) -> SurfaceHandle {
        let sharpen = self.core.setup.is_some_and(|s| s.sharpening);
        let flags = if sharpen { FLAG_SHARPEN } else { 0 };
        let constants = self.core.constants(ctx, reset, flags);
        let groups = groups_for(ctx.display_size());

        ctx.command.set_constants(KERNEL_EASU, &constants);
        ctx.command.dispatch(KERNEL_EASU, vec![inputs.color], vec![output.into()], groups);
        if !sharpen {
            return output;
        }

        rcas(ctx, KERNEL_RCAS, output, &constants)
    }
}

/// Sharpen `input` into a new display-sized surface and release `input`
pub(crate) fn rcas(
    ctx: &mut RenderContext,
    kernel: &'static str,
    input: SurfaceHandle,
    constants: &super::UpscaleConstants,
) -> SurfaceHandle {
    let (w, h) = ctx.display_size();
    let sharpened = ctx.get_temporary_sized("rcas_output", w, h, ctx.format(), true);
    ctx.command.set_constants(kernel, constants);
    ctx.command.dispatch(kernel, vec![input.into()], vec![sharpened.into()], groups_for((w, h)));
    ctx.release_temporary(input);
    sharpened
}
