//! Intel XeSS temporal upscaling
//!
//! Runs on any vendor once the host reports the runtime; needs compute.

use super::{DispatchInputs, Upscaler, UpscalerCore, UpscalerKind, groups_for};
use crate::core::view::Eye;
use crate::render::caps::GpuCaps;
use crate::render::context::RenderContext;
use crate::render::surface_pool::SurfaceHandle;

pub const KERNEL_EXECUTE: &str = "xess_execute";

pub struct XessUpscaler {
    core: UpscalerCore,
}

impl XessUpscaler {
    pub fn new(eye: Eye) -> Self {
        Self { core: UpscalerCore::new(UpscalerKind::Xess, eye) }
    }
}

impl Upscaler for XessUpscaler {
    fn core(&self) -> &UpscalerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut UpscalerCore {
        &mut self.core
    }

    fn check_support(&self, caps: &GpuCaps) -> bool {
        caps.xess_runtime && caps.compute_shaders
    }

    fn record(
        &mut self,
        ctx: &mut RenderContext,
        inputs: &DispatchInputs,
        output: SurfaceHandle,
        reset: bool,
    ) -> SurfaceHandle {
        let constants = self.core.constants(ctx, reset, 0);

        let history = self.core.history();
        let mut reads = vec![inputs.color];
        reads.extend(inputs.depth);
        reads.extend(inputs.motion_vectors);
        reads.push(history.read());
        let writes = vec![output.into(), history.write()];

        ctx.command.set_constants(KERNEL_EXECUTE, &constants);
        ctx.command.dispatch(KERNEL_EXECUTE, reads, writes, groups_for(ctx.display_size()));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::caps::GpuVendor;

    #[test]
    fn test_support_check() {
        let xess = XessUpscaler::new(Eye::Left);
        let mut caps = GpuCaps::desktop(GpuVendor::Intel);
        assert!(!xess.check_support(&caps));
        caps.xess_runtime = true;
        assert!(xess.check_support(&caps));
        caps.compute_shaders = false;
        assert!(!xess.check_support(&caps));
    }
}
