//! DLSS Super Resolution
//!
//! The runtime itself is loaded by the host; this backend records the
//! evaluate call and the history bookkeeping around it. NVIDIA only.

use super::{DispatchInputs, FLAG_SHARPEN, Upscaler, UpscalerCore, UpscalerKind, UpscalerQuality, groups_for};
use crate::core::view::Eye;
use crate::render::caps::{GpuCaps, GpuVendor};
use crate::render::context::RenderContext;
use crate::render::surface_pool::SurfaceHandle;

pub const KERNEL_EVALUATE: &str = "dlss_evaluate";

pub struct DlssUpscaler {
    core: UpscalerCore,
}

impl DlssUpscaler {
    pub fn new(eye: Eye) -> Self {
        Self { core: UpscalerCore::new(UpscalerKind::Dlss, eye) }
    }

    /// Native quality runs as DLAA
    pub fn is_dlaa(&self) -> bool {
        self.core.setup.is_some_and(|s| s.quality == UpscalerQuality::NativeAa)
    }
}

impl Upscaler for DlssUpscaler {
    fn core(&self) -> &UpscalerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut UpscalerCore {
        &mut self.core
    }

    fn check_support(&self, caps: &GpuCaps) -> bool {
        caps.vendor == GpuVendor::Nvidia && caps.dlss_runtime
    }

    fn record(
        &mut self,
        ctx: &mut RenderContext,
        inputs: &DispatchInputs,
        output: SurfaceHandle,
        reset: bool,
    ) -> SurfaceHandle {
        // Sharpening is a parameter of the evaluate call, not a separate pass
        let flags = if self.core.setup.is_some_and(|s| s.sharpening) { FLAG_SHARPEN } else { 0 };
        let constants = self.core.constants(ctx, reset, flags);

        let history = self.core.history();
        let mut reads = vec![inputs.color];
        reads.extend(inputs.depth);
        reads.extend(inputs.motion_vectors);
        reads.push(history.read());
        let writes = vec![output.into(), history.write()];

        ctx.command.set_constants(KERNEL_EVALUATE, &constants);
        ctx.command.dispatch(KERNEL_EVALUATE, reads, writes, groups_for(ctx.display_size()));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::View;
    use crate::render::upscale::tests::{context, decode, full_inputs};
    use crate::render::upscale::UpscalerSettings;

    #[test]
    fn test_vendor_gate() {
        let dlss = DlssUpscaler::new(Eye::Left);
        let mut caps = GpuCaps::desktop(GpuVendor::Nvidia);
        assert!(!dlss.check_support(&caps));
        caps.dlss_runtime = true;
        assert!(dlss.check_support(&caps));
        caps.vendor = GpuVendor::Amd;
        assert!(!dlss.check_support(&caps));
    }

    #[test]
    fn test_dlaa_at_native_quality() {
        let mut view = View::new(2560, 1440, 60.0);
        let mut ctx = context(&view);
        let mut dlss = DlssUpscaler::new(Eye::Left);
        let settings = UpscalerSettings { quality: UpscalerQuality::NativeAa, ..Default::default() };
        let setup = dlss.configure_viewport(&mut ctx, &mut view, &settings, None);
        assert_eq!(setup.render, (2560, 1440));
        assert!(dlss.is_dlaa());
    }

    #[test]
    fn test_evaluate_carries_jitter() {
        let mut view = View::new(1920, 1080, 60.0);
        let mut ctx = context(&view);
        let mut dlss = DlssUpscaler::new(Eye::Left);
        dlss.configure_viewport(&mut ctx, &mut view, &UpscalerSettings::default(), None);
        let jitter = dlss.configure_jitter(&mut view, Eye::Left, None);
        dlss.dispatch(&mut ctx, &full_inputs());

        let constants = decode(&ctx.command, KERNEL_EVALUATE);
        assert_eq!(constants.jitter, jitter.to_array());
        assert_eq!(constants.reset, 1);
        assert_ne!(constants.flags & FLAG_SHARPEN, 0);
    }
}
