//! Eye adaptation from the log-luminance histogram
//!
//! Exposure is kept in a 1x1 persistent surface per eye, ping-ponged so each
//! frame adapts from the previous value. The result is handed to the uber
//! pass through the render context.

use bytemuck::{Pod, Zeroable};

use crate::core::view::Eye;
use crate::effect::{Effect, EffectAttributes, EffectSettings};
use crate::render::caps::GpuCaps;
use crate::render::command::{Command, CommandSequence, PersistentSurface};
use crate::render::context::RenderContext;
use crate::render::surface_pool::SurfaceDesc;

const OWNER: &str = "auto_exposure";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutoExposureSettings {
    pub enabled: bool,
    /// Histogram percentages ignored at the dark and bright ends
    pub filtering: [f32; 2],
    pub min_ev: f32,
    pub max_ev: f32,
    /// Middle-grey target
    pub key_value: f32,
    /// Adapt smoothly instead of snapping
    pub progressive: bool,
    pub speed_up: f32,
    pub speed_down: f32,
}

impl Default for AutoExposureSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            filtering: [50.0, 95.0],
            min_ev: 0.0,
            max_ev: 0.0,
            key_value: 1.0,
            progressive: true,
            speed_up: 2.0,
            speed_down: 1.0,
        }
    }
}

impl EffectSettings for AutoExposureSettings {
    fn enabled(&self) -> bool {
        self.enabled
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ExposureParams {
    pub filtering: [f32; 2],
    pub min_ev: f32,
    pub max_ev: f32,
    pub key_value: f32,
    pub speed_up: f32,
    pub speed_down: f32,
    pub delta_time: f32,
    pub progressive: u32,
    pub _pad: [u32; 3],
}

#[derive(Debug, Default)]
struct EyeState {
    allocated: bool,
    current: u8,
    /// Next frame snaps to the target instead of adapting
    reset: bool,
}

#[derive(Debug, Default)]
pub struct AutoExposure {
    eyes: [EyeState; 2],
}

impl AutoExposure {
    fn surface(eye: Eye, slot: u8) -> PersistentSurface {
        PersistentSurface::new(OWNER, eye, slot)
    }

    /// Whether the next frame for `eye` snaps instead of adapting
    pub fn pending_reset(&self, eye: Eye) -> bool {
        let state = &self.eyes[eye.index()];
        !state.allocated || state.reset
    }
}

impl Effect for AutoExposure {
    type Settings = AutoExposureSettings;
    const ATTRIBUTES: EffectAttributes = EffectAttributes::builtin("Auto Exposure");

    fn is_supported(&self, caps: &GpuCaps) -> bool {
        caps.compute_shaders
    }

    fn render(&mut self, ctx: &mut RenderContext, settings: &AutoExposureSettings) {
        let eye = ctx.current_eye();
        let (w, h) = ctx.scaled_size();
        let source = ctx.source();
        ctx.histogram.generate(&mut ctx.command, source, w, h);

        let state = &mut self.eyes[eye.index()];
        if !state.allocated {
            let desc = SurfaceDesc::new(OWNER, 1, 1, wgpu::TextureFormat::R32Float).with_random_write();
            for slot in 0..2 {
                ctx.command.push(Command::AllocatePersistent { surface: Self::surface(eye, slot), desc });
            }
            state.allocated = true;
            state.reset = true;
        }

        let min_ev = settings.min_ev.min(settings.max_ev);
        let params = ExposureParams {
            filtering: [settings.filtering[0].clamp(1.0, 99.0), settings.filtering[1].clamp(1.0, 99.0)],
            min_ev,
            max_ev: settings.max_ev.max(min_ev),
            key_value: settings.key_value,
            speed_up: settings.speed_up,
            speed_down: settings.speed_down,
            delta_time: ctx.delta_time(),
            progressive: (settings.progressive && !state.reset) as u32,
            _pad: [0; 3],
        };

        let previous = Self::surface(eye, state.current);
        let next = Self::surface(eye, 1 - state.current);
        let histogram = ctx.histogram.surface();
        ctx.command.set_constants("auto_exposure", &params);
        if state.reset {
            ctx.command.dispatch("auto_exposure", vec![histogram], vec![next.into()], [1, 1, 1]);
        } else {
            ctx.command.dispatch("auto_exposure", vec![histogram, previous.into()], vec![next.into()], [1, 1, 1]);
        }
        state.current = 1 - state.current;
        state.reset = false;

        ctx.set_auto_exposure_texture(next.into());
    }

    fn reset_history(&mut self) {
        for state in &mut self.eyes {
            state.reset = true;
        }
    }

    fn release(&mut self, cmd: &mut CommandSequence) {
        for eye in [Eye::Left, Eye::Right] {
            let state = &mut self.eyes[eye.index()];
            if state.allocated {
                for slot in 0..2 {
                    cmd.push(Command::FreePersistent { surface: Self::surface(eye, slot) });
                }
            }
            *state = EyeState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::{StereoMode, View};
    use crate::render::command::SurfaceRef;

    fn settings() -> AutoExposureSettings {
        AutoExposureSettings { enabled: true, min_ev: -4.0, max_ev: 4.0, ..Default::default() }
    }

    #[test]
    fn test_adapts_from_previous_frame() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        ctx.begin_eye(&View::new(1280, 720, 60.0), Eye::Left, 0);
        let mut exposure = AutoExposure::default();

        exposure.render(&mut ctx, &settings());
        let first = ctx.auto_exposure_texture();
        exposure.render(&mut ctx, &settings());
        let second = ctx.auto_exposure_texture();
        assert_ne!(first, second);

        let last = ctx.command.commands().iter().rev().find_map(|c| match c {
            Command::Dispatch { kernel: "auto_exposure", reads, .. } => Some(reads.clone()),
            _ => None,
        });
        // Second frame reads the first frame's exposure
        assert_eq!(last.unwrap(), vec![ctx.histogram.surface(), first.unwrap()]);
    }

    #[test]
    fn test_reset_snaps_next_frame() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        ctx.begin_eye(&View::new(640, 480, 60.0), Eye::Left, 0);
        let mut exposure = AutoExposure::default();
        assert!(exposure.pending_reset(Eye::Left));
        exposure.render(&mut ctx, &settings());
        assert!(!exposure.pending_reset(Eye::Left));
        exposure.reset_history();
        assert!(exposure.pending_reset(Eye::Left));
    }

    #[test]
    fn test_eyes_are_independent() {
        let view = View::stereo(1280, 720, 90.0, StereoMode::MultiPass);
        let mut ctx = RenderContext::new(GpuCaps::default());
        let mut exposure = AutoExposure::default();

        ctx.begin_eye(&view, Eye::Left, 0);
        exposure.render(&mut ctx, &settings());
        let left = ctx.auto_exposure_texture();
        ctx.begin_eye(&view, Eye::Right, 0);
        exposure.render(&mut ctx, &settings());
        let right = ctx.auto_exposure_texture();

        match (left, right) {
            (Some(SurfaceRef::Persistent(l)), Some(SurfaceRef::Persistent(r))) => {
                assert_eq!(l.eye, Eye::Left);
                assert_eq!(r.eye, Eye::Right);
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut cmd = CommandSequence::new();
        exposure.release(&mut cmd);
        assert_eq!(cmd.len(), 4);
    }
}
