//! FidelityFX Super Resolution 3 temporal upscaling
//!
//! Temporal accumulation at display resolution with an optional reactive mask
//! generated from the opaque color copy, and optional RCAS sharpening.

use super::fsr1::rcas;
use super::{DispatchInputs, FLAG_REACTIVE, FLAG_SHARPEN, Upscaler, UpscalerCore, UpscalerKind, groups_for};
use crate::core::view::Eye;
use crate::render::caps::GpuCaps;
use crate::render::command::SurfaceRef;
use crate::render::context::RenderContext;
use crate::render::surface_pool::SurfaceHandle;

pub const KERNEL_REACTIVE: &str = "fsr3_auto_reactive";
pub const KERNEL_UPSCALE: &str = "fsr3_upscale";
pub const KERNEL_RCAS: &str = "fsr3_rcas";

/// Reactive mask generation parameters
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ReactiveParams {
    pub scale: f32,
    pub threshold: f32,
    pub binary_value: f32,
    pub flags: u32,
}

pub struct Fsr3Upscaler {
    core: UpscalerCore,
    reactive: ReactiveParams,
}

impl Fsr3Upscaler {
    pub fn new(eye: Eye) -> Self {
        Self {
            core: UpscalerCore::new(UpscalerKind::Fsr3, eye),
            reactive: ReactiveParams { scale: 0.9, threshold: 0.05, binary_value: 0.9, flags: 0 },
        }
    }

    /// Tune the auto-generated reactive mask
    pub fn set_reactive(&mut self, scale: f32, threshold: f32) {
        self.reactive.scale = scale.clamp(0.0, 1.0);
        self.reactive.threshold = threshold.clamp(0.0, 1.0);
    }
}

impl Upscaler for Fsr3Upscaler {
    fn core(&self) -> &UpscalerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut UpscalerCore {
        &mut self.core
    }

    fn check_support(&self, caps: &GpuCaps) -> bool {
        caps.compute_shaders
    }

    fn record(
        &mut self,
        ctx: &mut RenderContext,
        inputs: &DispatchInputs,
        output: SurfaceHandle,
        reset: bool,
    ) -> SurfaceHandle {
        let setup = self.core.setup;
        let sharpen = setup.is_some_and(|s| s.sharpening);
        let auto_reactive = setup.is_some_and(|s| s.auto_reactive);
        let render = setup.map_or(ctx.scaled_size(), |s| s.render);

        // Reactive mask needs the opaque-only color to tell transparents apart
        let reactive = match inputs.opaque {
            Some(opaque) if auto_reactive => {
                let mask =
                    ctx.get_temporary_sized("fsr3_reactive", render.0, render.1, wgpu::TextureFormat::R8Unorm, true);
                ctx.command.set_constants(KERNEL_REACTIVE, &self.reactive);
                ctx.command.dispatch(KERNEL_REACTIVE, vec![opaque, inputs.color], vec![mask.into()], groups_for(render));
                Some(mask)
            }
            _ => None,
        };

        let mut flags = 0;
        if sharpen {
            flags |= FLAG_SHARPEN;
        }
        if reactive.is_some() {
            flags |= FLAG_REACTIVE;
        }
        let constants = self.core.constants(ctx, reset, flags);

        let history = self.core.history();
        let mut reads = vec![inputs.color];
        reads.extend(inputs.depth);
        reads.extend(inputs.motion_vectors);
        reads.push(history.read());
        reads.extend(reactive.map(SurfaceRef::from));
        let writes = vec![output.into(), history.write()];

        ctx.command.set_constants(KERNEL_UPSCALE, &constants);
        ctx.command.dispatch(KERNEL_UPSCALE, reads, writes, groups_for(ctx.display_size()));

        if let Some(mask) = reactive {
            ctx.release_temporary(mask);
        }
        if sharpen {
            rcas(ctx, KERNEL_RCAS, output, &constants)
        } else {
            output
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::View;
    use crate::render::command::CameraSurface;
    use crate::render::upscale::tests::{context, decode, full_inputs};
    use crate::render::upscale::{DispatchInputs, UpscalerSettings};

    #[test]
    fn test_reactive_mask_from_opaque_copy() {
        let mut view = View::new(1920, 1080, 60.0);
        let mut ctx = context(&view);
        let mut fsr = Fsr3Upscaler::new(Eye::Left);
        fsr.configure_viewport(&mut ctx, &mut view, &UpscalerSettings::default(), None);

        let inputs = DispatchInputs { opaque: Some(CameraSurface::OpaqueCopy.into()), ..full_inputs() };
        let out = fsr.dispatch(&mut ctx, &inputs);
        assert_eq!(ctx.command.dispatch_kernels(), vec![KERNEL_REACTIVE, KERNEL_UPSCALE, KERNEL_RCAS]);
        assert_ne!(decode(&ctx.command, KERNEL_UPSCALE).flags & FLAG_REACTIVE, 0);
        // Only the sharpened output survives
        assert_eq!(ctx.pool().live_count(), 1);
        assert!(ctx.pool().is_live(out));
        assert_eq!(ctx.command.validate(), Ok(()));
    }

    #[test]
    fn test_no_reactive_without_opaque_copy() {
        let mut view = View::new(1920, 1080, 60.0);
        let mut ctx = context(&view);
        let mut fsr = Fsr3Upscaler::new(Eye::Left);
        let settings = UpscalerSettings { sharpening: false, ..Default::default() };
        fsr.configure_viewport(&mut ctx, &mut view, &settings, None);
        fsr.dispatch(&mut ctx, &full_inputs());

        assert_eq!(ctx.command.dispatch_kernels(), vec![KERNEL_UPSCALE]);
        let constants = decode(&ctx.command, KERNEL_UPSCALE);
        assert_eq!(constants.flags & FLAG_REACTIVE, 0);
        assert_eq!(constants.render_size, [1280.0, 720.0]);
        assert_eq!(constants.display_size, [1920.0, 1080.0]);
    }

    #[test]
    fn test_set_reactive_clamps() {
        let mut fsr = Fsr3Upscaler::new(Eye::Left);
        fsr.set_reactive(2.0, -1.0);
        assert_eq!(fsr.reactive.scale, 1.0);
        assert_eq!(fsr.reactive.threshold, 0.0);
    }
}
