//! Upscaling and temporal anti-aliasing
//!
//! Every backend implements [`Upscaler`]. The shared bookkeeping (render size,
//! jitter cycling, viewport narrowing, history ping-pong and the one-shot reset
//! flag) lives in [`UpscalerCore`]; backends only record their own passes.

pub mod dlss;
pub mod fsr1;
pub mod fsr3;
pub mod history;
pub mod jitter;
pub mod mip_bias;
pub mod taa;
pub mod xess;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::core::view::{Eye, StereoMode, View, Viewport};
use crate::render::caps::GpuCaps;
use crate::render::command::{CommandSequence, SurfaceRef};
use crate::render::context::RenderContext;
use crate::render::surface_pool::{SurfaceDesc, SurfaceHandle};

pub use dlss::DlssUpscaler;
pub use fsr1::Fsr1Upscaler;
pub use fsr3::Fsr3Upscaler;
pub use history::HistoryBuffers;
pub use jitter::{apply_jitter_to_projection, halton, jitter_offset, phase_count};
pub use mip_bias::{MipBias, MipBiasSettings, TextureLibrary};
pub use taa::{TaaSettings, TaaUpscaler};
pub use xess::XessUpscaler;

/// Upscaler backend family
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpscalerKind {
    Taa,
    Fsr1,
    Fsr3,
    Dlss,
    Xess,
}

impl UpscalerKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Taa => "TAA",
            Self::Fsr1 => "FSR 1",
            Self::Fsr3 => "FSR 3",
            Self::Dlss => "DLSS",
            Self::Xess => "XeSS",
        }
    }

    /// Accumulates samples across frames and needs depth + motion vectors
    pub fn is_temporal(self) -> bool {
        !matches!(self, Self::Fsr1)
    }
}

/// Upscale quality presets
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpscalerQuality {
    /// Anti-aliasing only, no upscale
    NativeAa,
    /// 1.3x upscale
    UltraQuality,
    /// 1.5x upscale (66.7% render resolution)
    #[default]
    Quality,
    /// 1.7x upscale (58.8% render resolution)
    Balanced,
    /// 2.0x upscale (50% render resolution)
    Performance,
    /// 3.0x upscale (33.3% render resolution)
    UltraPerformance,
}

impl UpscalerQuality {
    /// Display size divided by render size
    pub fn scale_factor(self) -> f32 {
        match self {
            Self::NativeAa => 1.0,
            Self::UltraQuality => 1.3,
            Self::Quality => 1.5,
            Self::Balanced => 1.7,
            Self::Performance => 2.0,
            Self::UltraPerformance => 3.0,
        }
    }

    /// Render resolution for a display resolution, rounded to whole pixels
    pub fn render_size(self, display: (u32, u32)) -> (u32, u32) {
        let factor = self.scale_factor();
        (
            ((display.0 as f32 / factor).round() as u32).max(1),
            ((display.1 as f32 / factor).round() as u32).max(1),
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NativeAa => "Native AA",
            Self::UltraQuality => "Ultra Quality",
            Self::Quality => "Quality",
            Self::Balanced => "Balanced",
            Self::Performance => "Performance",
            Self::UltraPerformance => "Ultra Performance",
        }
    }
}

/// Backend lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpscalerState {
    #[default]
    Inactive,
    /// Viewport and jitter set for the current frame
    Configuring,
    /// Output produced for the current frame
    Dispatched,
}

/// User-facing upscaler parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpscalerSettings {
    pub quality: UpscalerQuality,
    /// Run a contrast-adaptive sharpening pass after upscaling
    pub sharpening: bool,
    /// 0 = off, 1 = maximum
    pub sharpness: f32,
    /// Generate a reactive mask from the opaque copy (FSR 3)
    pub auto_reactive: bool,
    pub reactive_scale: f32,
    pub reactive_threshold: f32,
    pub mip_bias: MipBiasSettings,
}

impl Default for UpscalerSettings {
    fn default() -> Self {
        Self {
            quality: UpscalerQuality::Quality,
            sharpening: true,
            sharpness: 0.8,
            auto_reactive: true,
            reactive_scale: 0.9,
            reactive_threshold: 0.05,
            mip_bias: MipBiasSettings::default(),
        }
    }
}

/// Resolved sizes for one frame, shared from the left eye to the right
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpscalerSetup {
    pub quality: UpscalerQuality,
    pub display: (u32, u32),
    pub render: (u32, u32),
    pub sharpening: bool,
    pub sharpness: f32,
    pub auto_reactive: bool,
}

/// Surfaces handed to a dispatch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DispatchInputs {
    pub color: SurfaceRef,
    pub depth: Option<SurfaceRef>,
    pub motion_vectors: Option<SurfaceRef>,
    /// Opaque color copy, if one was taken this frame
    pub opaque: Option<SurfaceRef>,
}

/// Flag bits in [`UpscaleConstants::flags`]
pub const FLAG_HDR: u32 = 1;
pub const FLAG_SHARPEN: u32 = 1 << 1;
pub const FLAG_REACTIVE: u32 = 1 << 2;

/// Constant block recorded ahead of every upscale dispatch
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UpscaleConstants {
    pub render_size: [f32; 2],
    pub display_size: [f32; 2],
    /// Jitter in render pixels
    pub jitter: [f32; 2],
    /// Motion vectors are stored in UV units, scaled to render pixels here
    pub motion_vector_scale: [f32; 2],
    pub sharpness: f32,
    /// Non-zero discards history for this dispatch
    pub reset: u32,
    pub frame_index: u32,
    pub flags: u32,
}

/// State shared by every backend
#[derive(Debug)]
pub struct UpscalerCore {
    kind: UpscalerKind,
    eye: Eye,
    state: UpscalerState,
    supported: Option<bool>,
    setup: Option<UpscalerSetup>,
    /// Host viewport saved while the narrowed one is in place
    original_viewport: Option<Viewport>,
    jitter: Vec2,
    jitter_index: u32,
    reset_pending: bool,
    last_reset: bool,
    missing_input_warned: bool,
    dispatch_count: u64,
    history: HistoryBuffers,
}

impl UpscalerCore {
    pub fn new(kind: UpscalerKind, eye: Eye) -> Self {
        Self {
            kind,
            eye,
            state: UpscalerState::Inactive,
            supported: None,
            setup: None,
            original_viewport: None,
            jitter: Vec2::ZERO,
            jitter_index: 0,
            reset_pending: true,
            last_reset: false,
            missing_input_warned: false,
            dispatch_count: 0,
            history: HistoryBuffers::new(history_owner(kind), eye),
        }
    }

    pub fn eye(&self) -> Eye {
        self.eye
    }

    pub fn history(&self) -> &HistoryBuffers {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryBuffers {
        &mut self.history
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    /// Whether the last dispatch discarded history
    pub fn last_dispatch_reset(&self) -> bool {
        self.last_reset
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatch_count
    }

    /// Constant block for the current frame
    pub fn constants(&self, ctx: &RenderContext, reset: bool, flags: u32) -> UpscaleConstants {
        let (render, display, sharpness) = match self.setup {
            Some(s) => (s.render, s.display, if s.sharpening { s.sharpness } else { 0.0 }),
            None => (ctx.scaled_size(), ctx.display_size(), 0.0),
        };
        let hdr = if ctx.is_hdr() { FLAG_HDR } else { 0 };
        UpscaleConstants {
            render_size: [render.0 as f32, render.1 as f32],
            display_size: [display.0 as f32, display.1 as f32],
            jitter: self.jitter.to_array(),
            motion_vector_scale: [render.0 as f32, render.1 as f32],
            sharpness,
            reset: reset as u32,
            frame_index: ctx.frame_index() as u32,
            flags: flags | hdr,
        }
    }

    fn release(&mut self, cmd: &mut CommandSequence) {
        self.history.release(cmd);
        self.setup = None;
        self.state = UpscalerState::Inactive;
        self.reset_pending = true;
    }
}

fn history_owner(kind: UpscalerKind) -> &'static str {
    match kind {
        UpscalerKind::Taa => "taa_history",
        UpscalerKind::Fsr1 => "fsr1_history",
        UpscalerKind::Fsr3 => "fsr3_history",
        UpscalerKind::Dlss => "dlss_history",
        UpscalerKind::Xess => "xess_history",
    }
}

/// Thread-group size used by every upscale kernel
pub const UPSCALE_GROUP_SIZE: u32 = 8;

/// Dispatch group count covering `size`
pub fn groups_for(size: (u32, u32)) -> [u32; 3] {
    [
        size.0.div_ceil(UPSCALE_GROUP_SIZE).max(1),
        size.1.div_ceil(UPSCALE_GROUP_SIZE).max(1),
        1,
    ]
}

/// Upscaler backend
///
/// Per frame the orchestrator drives `configure_viewport`, `configure_jitter`,
/// `dispatch` and finally `reset_viewport`. Only `check_support` and `record` are
/// backend specific; the rest are shared through [`UpscalerCore`].
pub trait Upscaler {
    fn core(&self) -> &UpscalerCore;

    fn core_mut(&mut self) -> &mut UpscalerCore;

    /// Raw capability check, uncached
    fn check_support(&self, caps: &GpuCaps) -> bool;

    /// Record the backend passes. `output` is a display-sized pool surface;
    /// the returned handle holds the final result (may be a later surface).
    fn record(
        &mut self,
        ctx: &mut RenderContext,
        inputs: &DispatchInputs,
        output: SurfaceHandle,
        reset: bool,
    ) -> SurfaceHandle;

    fn kind(&self) -> UpscalerKind {
        self.core().kind
    }

    /// Quality preset actually used
    fn effective_quality(&self, settings: &UpscalerSettings) -> UpscalerQuality {
        settings.quality
    }

    /// Jitter scale applied on top of the Halton offsets; zero disables jitter
    fn jitter_scale(&self) -> f32 {
        1.0
    }

    /// Number of jitter phases before the sequence repeats
    fn jitter_phases(&self, setup: &UpscalerSetup) -> u32 {
        phase_count(setup.render.0, setup.display.0)
    }

    /// Extra persistent state to free on release
    fn release_backend(&mut self, _cmd: &mut CommandSequence) {}

    /// Cached support check
    fn is_supported(&mut self, caps: &GpuCaps) -> bool {
        if let Some(supported) = self.core().supported {
            return supported;
        }
        let supported = self.check_support(caps);
        self.core_mut().supported = Some(supported);
        supported
    }

    /// Forget the cached result so the next `is_supported` asks again
    fn clear_support_cache(&mut self) {
        self.core_mut().supported = None;
    }

    fn state(&self) -> UpscalerState {
        self.core().state
    }

    fn jitter(&self) -> Vec2 {
        self.core().jitter
    }

    fn setup(&self) -> Option<UpscalerSetup> {
        self.core().setup
    }

    /// Compute render size and narrow the view's viewport
    ///
    /// `shared` carries the left eye's setup into the right eye instance.
    fn configure_viewport(
        &mut self,
        ctx: &mut RenderContext,
        view: &mut View,
        settings: &UpscalerSettings,
        shared: Option<&UpscalerSetup>,
    ) -> UpscalerSetup {
        let setup = match shared {
            Some(setup) => *setup,
            None => {
                let quality = self.effective_quality(settings);
                let display = view.display_size();
                UpscalerSetup {
                    quality,
                    display,
                    render: quality.render_size(display),
                    sharpening: settings.sharpening,
                    sharpness: settings.sharpness.clamp(0.0, 1.0),
                    auto_reactive: settings.auto_reactive,
                }
            }
        };

        let name = self.kind().name();
        let eye = self.core().eye;
        let previous = self.core().setup;
        match previous {
            Some(prev) if prev.display != setup.display || prev.quality != setup.quality => {
                log::info!(
                    "{} ({}) recreated: {} mode, render {}x{} -> upscale {}x{}",
                    name,
                    eye.name(),
                    setup.quality.name(),
                    setup.render.0,
                    setup.render.1,
                    setup.display.0,
                    setup.display.1,
                );
                let core = self.core_mut();
                core.history.release(&mut ctx.command);
                core.reset_pending = true;
            }
            Some(_) => {}
            None => {
                log::info!(
                    "{} ({}) initialized: {} mode, render {}x{} -> upscale {}x{}",
                    name,
                    eye.name(),
                    setup.quality.name(),
                    setup.render.0,
                    setup.render.1,
                    setup.display.0,
                    setup.display.1,
                );
            }
        }

        let core = self.core_mut();
        core.setup = Some(setup);
        if core.original_viewport.is_none() {
            core.original_viewport = Some(view.viewport);
        }
        if let Some(original) = core.original_viewport {
            view.viewport = original.scaled(setup.render, setup.display);
        }
        core.state = UpscalerState::Configuring;
        setup
    }

    /// Pick this frame's jitter and apply it to the projection(s)
    ///
    /// `shared` is the left eye's jitter when configuring the right eye.
    fn configure_jitter(&mut self, view: &mut View, eye: Eye, shared: Option<Vec2>) -> Vec2 {
        let scale = self.jitter_scale();
        let Some(setup) = self.core().setup else {
            return Vec2::ZERO;
        };
        if scale == 0.0 {
            self.core_mut().jitter = Vec2::ZERO;
            return Vec2::ZERO;
        }

        let phases = self.jitter_phases(&setup);
        let core = self.core_mut();
        let jitter = match shared {
            Some(jitter) => jitter,
            None => {
                let jitter = jitter_offset(core.jitter_index, phases) * scale;
                core.jitter_index = core.jitter_index.wrapping_add(1);
                jitter
            }
        };
        core.jitter = jitter;

        let eyes = match view.stereo {
            StereoMode::SinglePassInstanced | StereoMode::SinglePassDoubleWide => 0..2,
            _ => eye.index()..eye.index() + 1,
        };
        for i in eyes {
            view.projection[i] =
                apply_jitter_to_projection(view.non_jittered_projection[i], jitter, setup.render.0, setup.render.1);
        }
        jitter
    }

    /// Put back the host viewport and projections
    fn reset_viewport(&mut self, view: &mut View) {
        if let Some(original) = self.core_mut().original_viewport.take() {
            view.viewport = original;
        }
        view.projection = view.non_jittered_projection;
    }

    /// Produce the display-resolution result for the current source
    ///
    /// Temporal backends fall back to a scaled copy when depth or motion
    /// vectors are missing; history and the reset flag are left untouched.
    fn dispatch(&mut self, ctx: &mut RenderContext, inputs: &DispatchInputs) -> SurfaceHandle {
        let kind = self.kind();
        let display = self.core().setup.map_or(ctx.display_size(), |s| s.display);
        let output = ctx.get_temporary_sized("upscale_output", display.0, display.1, ctx.format(), true);

        let temporal = kind.is_temporal();
        if temporal && (inputs.depth.is_none() || inputs.motion_vectors.is_none()) {
            let core = self.core_mut();
            if !core.missing_input_warned {
                log::warn!("{}: depth or motion vectors missing, passing color through", kind.name());
                core.missing_input_warned = true;
            }
            ctx.command.blit(inputs.color, output.into(), "scaled_copy", 0);
            core.state = UpscalerState::Dispatched;
            return output;
        }

        let mut reset = self.core().reset_pending;
        if temporal {
            let desc = SurfaceDesc::new(history_owner(kind), display.0, display.1, ctx.format()).with_random_write();
            let core = self.core_mut();
            core.history.ensure(desc, &mut ctx.command);
            reset |= !core.history.is_valid();
        }

        let result = self.record(ctx, inputs, output, reset);

        let core = self.core_mut();
        if temporal {
            core.history.commit();
        }
        core.reset_pending = false;
        core.last_reset = reset;
        core.missing_input_warned = false;
        core.dispatch_count += 1;
        core.state = UpscalerState::Dispatched;
        result
    }

    /// Discard history on the next dispatch
    fn on_reset_camera(&mut self) {
        self.core_mut().reset_pending = true;
    }

    /// Free history and persistent state; safe to call repeatedly
    fn release(&mut self, cmd: &mut CommandSequence) {
        self.release_backend(cmd);
        self.core_mut().release(cmd);
    }
}

/// Build a backend instance for one eye
pub fn create_upscaler(
    kind: UpscalerKind,
    eye: Eye,
    settings: &UpscalerSettings,
    taa: &TaaSettings,
) -> Box<dyn Upscaler> {
    match kind {
        UpscalerKind::Taa => Box::new(TaaUpscaler::new(eye, *taa)),
        UpscalerKind::Fsr1 => Box::new(Fsr1Upscaler::new(eye)),
        UpscalerKind::Fsr3 => {
            let mut fsr = Fsr3Upscaler::new(eye);
            fsr.set_reactive(settings.reactive_scale, settings.reactive_threshold);
            Box::new(fsr)
        }
        UpscalerKind::Dlss => Box::new(DlssUpscaler::new(eye)),
        UpscalerKind::Xess => Box::new(XessUpscaler::new(eye)),
    }
}
