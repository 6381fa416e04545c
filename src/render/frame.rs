//! Frame pipeline orchestrator
//!
//! Drives one view through the post stack each frame:
//!
//! 1. refresh the render context from the view
//! 2. resolve antialiasing (support check, fallback), narrow the viewport and jitter
//! 3. opaque-only chain (AO, reflections, fog, `BeforeTransparent`)
//! 4. NaN scrub
//! 5. `BeforeUpscaling`
//! 6. TAA or upscaler dispatch
//! 7. `BeforeStack`, builtin stack and uber blit, `AfterStack`
//! 8. final pass (FXAA/SMAA, dithering, flip)
//! 9. release surfaces and restore the view
//!
//! Everything is recorded into the context's command sequence; `end_frame`
//! hands the sequence to the host and recycles the surface pool.

use crate::config::PipelineConfig;
use crate::core::types::Result;
use crate::core::view::{Eye, View};
use crate::effect::{BundleRegistry, DepthFlags, Effect, InjectionPoint, NoVolumes, VolumeBlender};
use crate::render::antialiasing::{Antialiasing, FallbackMode, FinalPass, apply_dithering};
use crate::render::caps::GpuCaps;
use crate::render::command::{CameraSurface, CommandSequence, SurfaceRef};
use crate::render::context::RenderContext;
use crate::render::pipeline::{OPAQUE_ONLY, STANDALONE_STACK, UBER_SHADER, UBER_STACK, register_builtins};
use crate::render::stereo::StereoLatch;
use crate::render::upscale::mip_bias::NullTextureLibrary;
use crate::render::upscale::{DispatchInputs, MipBias, TextureLibrary, Upscaler, UpscalerKind, create_upscaler};

/// Plain copy shader; pass 1 replaces NaN and infinite pixels with black
pub const COPY_SHADER: &str = "copy";
const COPY_PASS: u32 = 0;
const COPY_PASS_NAN_KILL: u32 = 1;

/// Antialiasing mode asked for and the one actually running
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub requested: Antialiasing,
    pub effective: Antialiasing,
}

impl Selection {
    pub fn is_fallback(&self) -> bool {
        self.requested != self.effective
    }
}

pub struct PostProcessPipeline {
    config: PipelineConfig,
    registry: BundleRegistry,
    ctx: RenderContext,
    blender: Box<dyn VolumeBlender>,
    library: Box<dyn TextureLibrary>,
    mip_bias: MipBias,
    /// One backend instance per eye; the right one only exists in multi-pass stereo
    upscalers: [Option<Box<dyn Upscaler>>; 2],
    /// Checked once per selection; cleared by `set_antialiasing`, `set_caps` and `config_mut`
    selection: Option<Selection>,
    latch: StereoLatch,
    /// Opaque copy taken for the current stereo pair
    opaque_copied: bool,
    nan_killed: [bool; 2],
    frame_index: u64,
    time: f64,
    last_time: Option<f64>,
    delta_time: f32,
}

impl PostProcessPipeline {
    /// Create a pipeline with every builtin effect registered
    ///
    /// # Arguments
    /// * `config` - Antialiasing selection, stack options and persisted bucket orders
    /// * `caps` - Capabilities of the adapter frames will run on
    pub fn new(config: PipelineConfig, caps: GpuCaps) -> Self {
        let mut registry = BundleRegistry::new();
        if let Err(e) = register_builtins(&mut registry) {
            log::error!("builtin registration failed: {}", e);
        }
        for point in InjectionPoint::ALL {
            registry.set_bucket_order(point, config.buckets.get(point).to_vec());
        }

        Self {
            config,
            registry,
            ctx: RenderContext::new(caps),
            blender: Box::new(NoVolumes),
            library: Box::new(NullTextureLibrary),
            mip_bias: MipBias::new(),
            upscalers: [None, None],
            selection: None,
            latch: StereoLatch::new(),
            opaque_copied: false,
            nan_killed: [false; 2],
            frame_index: 0,
            time: 0.0,
            last_time: None,
            delta_time: 1.0 / 60.0,
        }
    }

    pub fn with_volume_blender(mut self, blender: impl VolumeBlender + 'static) -> Self {
        self.blender = Box::new(blender);
        self
    }

    pub fn with_texture_library(mut self, library: impl TextureLibrary + 'static) -> Self {
        self.library = Box::new(library);
        self
    }

    // --- Accessors ---

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &BundleRegistry {
        &self.registry
    }

    /// Settings and bucket edits; never call between `prepare_eye` and `end_frame`
    pub fn registry_mut(&mut self) -> &mut BundleRegistry {
        &mut self.registry
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn upscaler(&self, eye: Eye) -> Option<&dyn Upscaler> {
        self.upscalers[eye.index()].as_deref()
    }

    pub fn mip_bias(&self) -> &MipBias {
        &self.mip_bias
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn stereo_latch(&self) -> &StereoLatch {
        &self.latch
    }

    // --- Between-frame mutation ---

    /// Register a user effect and slot it into its bucket
    pub fn register_effect<E: Effect + Default>(&mut self) -> Result<()> {
        self.registry.register::<E>()?;
        self.sort_buckets();
        Ok(())
    }

    /// Reconcile persisted bucket order with registered effects and store it back
    pub fn sort_buckets(&mut self) -> bool {
        let changed = self.registry.sort_all();
        for point in InjectionPoint::ALL {
            self.config.buckets.set(point, self.registry.bucket_order(point).to_vec());
        }
        changed
    }

    pub fn set_bucket_order(&mut self, point: InjectionPoint, names: Vec<String>) {
        self.registry.set_bucket_order(point, names);
        self.sort_buckets();
    }

    /// Select a new mode; support is checked again on the next frame
    pub fn set_antialiasing(&mut self, mode: Antialiasing) {
        if mode != self.config.antialiasing {
            log::info!("antialiasing changed: {} -> {}", self.config.antialiasing.name(), mode.name());
        }
        self.config.antialiasing = mode;
        self.selection = None;
    }

    pub fn set_fallback(&mut self, fallback: FallbackMode) {
        self.config.fallback = fallback;
        self.selection = None;
    }

    /// New adapter; cached support checks are discarded
    pub fn set_caps(&mut self, caps: GpuCaps) {
        self.ctx.set_caps(caps);
        self.selection = None;
        for upscaler in self.upscalers.iter_mut().flatten() {
            upscaler.clear_support_cache();
        }
    }

    /// Direct config edits; antialiasing support is checked again on the next frame
    pub fn config_mut(&mut self) -> &mut PipelineConfig {
        self.selection = None;
        &mut self.config
    }

    /// Discard temporal history in every backend and renderer
    pub fn reset_history(&mut self) {
        for upscaler in self.upscalers.iter_mut().flatten() {
            upscaler.on_reset_camera();
        }
        self.registry.reset_history();
    }

    /// Camera inputs the host must produce for the current selection
    pub fn required_depth_flags(&self) -> DepthFlags {
        let flags = self.registry.required_depth_flags(&self.ctx);
        let temporal = self
            .selection
            .and_then(|s| s.effective.upscaler_kind())
            .is_some_and(UpscalerKind::is_temporal);
        if temporal { flags | DepthFlags::MOTION_VECTORS } else { flags }
    }

    // --- Frame driving ---

    /// Start a displayed frame at `time` seconds
    pub fn begin_frame(&mut self, time: f64) {
        self.delta_time = match self.last_time {
            Some(last) => (time - last).max(0.0) as f32,
            None => 1.0 / 60.0,
        };
        self.last_time = Some(time);
        self.time = time;
        // Frees precede any allocation a replacing renderer records this frame
        let retired = self.registry.release_retired(&mut self.ctx.command);
        if retired > 0 {
            log::debug!("released {} replaced effect renderers", retired);
        }
    }

    /// Render every eye the view's stereo mode needs and finish the frame
    pub fn render_frame(&mut self, view: &mut View, time: f64) -> CommandSequence {
        self.begin_frame(time);
        if view.stereo.invocations_per_frame() > 1 {
            self.render_eye(view, Eye::Left);
            self.render_eye(view, Eye::Right);
        } else {
            self.render_eye(view, Eye::Left);
        }
        self.end_frame()
    }

    /// Full per-eye sequence
    pub fn render_eye(&mut self, view: &mut View, eye: Eye) {
        self.prepare_eye(view, eye);
        self.render_opaque_only(eye);
        self.render_post(view, eye);
    }

    /// Context refresh, once-per-pair work, antialiasing and viewport setup
    pub fn prepare_eye(&mut self, view: &mut View, eye: Eye) {
        self.ctx.begin_eye(view, eye, self.frame_index);
        self.ctx.set_time(self.time as f32, self.delta_time);

        if self.latch.fire(view.stereo, eye) {
            self.blender.update(view, &mut self.registry);
            self.opaque_copied = false;
            if view.camera_cut {
                log::debug!("camera cut, discarding history");
                self.reset_history();
            }
        }

        let mode = self.resolve_antialiasing(view.is_scene_view);
        self.ctx.set_antialiasing(mode);
        let Some(kind) = mode.upscaler_kind() else {
            return;
        };

        // The right eye reuses what the left eye resolved this frame
        let (shared_setup, shared_jitter) = match (eye, &self.upscalers[Eye::Left.index()]) {
            (Eye::Right, Some(left)) => (left.setup(), left.setup().map(|_| left.jitter())),
            _ => (None, None),
        };

        let settings = self.config.upscaler;
        let taa = self.config.taa;
        let upscaler = self.upscalers[eye.index()].get_or_insert_with(|| create_upscaler(kind, eye, &settings, &taa));
        let setup = upscaler.configure_viewport(&mut self.ctx, view, &settings, shared_setup.as_ref());
        upscaler.configure_jitter(view, eye, shared_jitter);
        self.ctx.set_scaled_size(setup.render.0, setup.render.1);

        if eye == Eye::Left {
            self.mip_bias
                .update(self.time, setup.render.0, setup.display.0, &settings.mip_bias, self.library.as_mut());
        }
    }

    /// Opaque-only effects against the camera color before transparents
    ///
    /// One active effect writes straight back to the camera color; N effects
    /// chain through N-1 intermediate surfaces.
    pub fn render_opaque_only(&mut self, eye: Eye) {
        let mut chain: Vec<&'static str> =
            OPAQUE_ONLY.into_iter().filter(|name| self.is_builtin_active(name)).collect();
        chain.extend(self.registry.active_in(InjectionPoint::BeforeTransparent, &self.ctx));

        let reactive = self.ctx.antialiasing() == Antialiasing::Fsr3 && self.config.upscaler.auto_reactive;
        if (!chain.is_empty() || reactive) && !self.opaque_copied {
            self.take_opaque_copy(eye, !chain.is_empty());
        }
        self.ctx.set_has_opaque_copy(self.opaque_copied);
        if chain.is_empty() {
            return;
        }

        self.ctx.command.begin_sample("OpaqueOnly");
        let last = chain.len() - 1;
        let mut source: SurfaceRef = CameraSurface::OpaqueCopy.into();
        for (i, name) in chain.into_iter().enumerate() {
            let destination: SurfaceRef = if i == last {
                CameraSurface::Color.into()
            } else {
                self.ctx.get_temporary("opaque_only").into()
            };
            self.ctx.set_source(source);
            self.ctx.set_destination(destination);
            if let Some(bundle) = self.registry.by_name_mut(name) {
                bundle.render(&mut self.ctx);
            }
            self.ctx.release_if_temporary(source);
            source = destination;
        }
        self.ctx.command.end_sample("OpaqueOnly");

        self.ctx.set_source(CameraSurface::Color.into());
        self.ctx.set_destination(CameraSurface::Destination.into());
    }

    /// Post stack from the camera color to the host destination
    pub fn render_post(&mut self, view: &mut View, eye: Eye) {
        self.ctx.command.begin_sample("PostProcess");
        self.ctx.set_source(CameraSurface::Color.into());

        if self.config.stop_nan_propagation && !self.nan_killed[eye.index()] && !self.ctx.is_single_pass_instanced() {
            let target = self.ctx.get_temporary("nan_kill");
            self.ctx.command.blit(CameraSurface::Color.into(), target.into(), COPY_SHADER, COPY_PASS_NAN_KILL);
            self.ctx.set_source(target.into());
            self.nan_killed[eye.index()] = true;
        }

        self.run_bucket(InjectionPoint::BeforeUpscaling);
        self.run_upscaler(eye);
        self.run_bucket(InjectionPoint::BeforeStack);

        let after_stack = self.registry.active_in(InjectionPoint::AfterStack, &self.ctx);
        let mode = self.ctx.antialiasing();
        let needs_final_pass = mode.is_final_pass_filter() || !after_stack.is_empty();
        self.render_builtin_stack(needs_final_pass);

        if needs_final_pass {
            if !after_stack.is_empty() {
                self.ctx.command.begin_sample(InjectionPoint::AfterStack.name());
                for name in after_stack {
                    self.chain_effect(name);
                }
                self.ctx.command.end_sample(InjectionPoint::AfterStack.name());
            }
            let source = self.ctx.source();
            FinalPass::render(
                &mut self.ctx,
                source,
                CameraSurface::Destination.into(),
                mode,
                &self.config.fxaa,
                self.config.smaa,
                self.config.dithering,
            );
            self.ctx.release_if_temporary(source);
        }
        self.ctx.command.end_sample("PostProcess");

        let leaked = self.ctx.release_all_temporaries();
        if leaked > 0 {
            log::warn!("{} surfaces still held after the {} eye", leaked, eye.name());
        }
        if mode.upscaler_kind().is_some()
            && let Some(upscaler) = self.upscalers[eye.index()].as_mut()
        {
            upscaler.reset_viewport(view);
        }
        self.ctx.set_source(CameraSurface::Color.into());
        self.ctx.set_destination(CameraSurface::Destination.into());
    }

    /// Hand the recorded frame to the host and recycle the pool
    pub fn end_frame(&mut self) -> CommandSequence {
        let leaked = self.ctx.release_all_temporaries();
        if leaked > 0 {
            log::warn!("{} surfaces released at end of frame", leaked);
        }
        self.ctx.reset_pool();
        if self.latch.is_mid_pair() {
            log::warn!("frame ended between the eyes of a stereo pair");
            self.latch.reset();
        }
        self.nan_killed = [false; 2];
        self.frame_index += 1;
        log::trace!("frame {} recorded {} commands", self.frame_index, self.ctx.command.len());
        self.ctx.command.take()
    }

    /// Free every persistent surface; returns the commands that do it
    pub fn release(&mut self) -> CommandSequence {
        for slot in &mut self.upscalers {
            if let Some(mut upscaler) = slot.take() {
                upscaler.release(&mut self.ctx.command);
            }
        }
        self.registry.release_all(&mut self.ctx.command);
        self.ctx.histogram.release(&mut self.ctx.command);
        self.ctx.sheets.release();
        self.mip_bias.reset(self.library.as_mut());
        self.selection = None;
        self.ctx.command.take()
    }

    // --- Stages ---

    fn take_opaque_copy(&mut self, eye: Eye, chain_follows: bool) {
        let nan_kill = self.config.stop_nan_propagation && !self.ctx.is_single_pass_instanced();
        let pass = if nan_kill { COPY_PASS_NAN_KILL } else { COPY_PASS };
        self.ctx.command.blit(CameraSurface::Color.into(), CameraSurface::OpaqueCopy.into(), COPY_SHADER, pass);
        self.opaque_copied = true;
        // The chain writes scrubbed pixels back into the camera color
        if nan_kill && chain_follows {
            self.nan_killed[eye.index()] = true;
        }
    }

    fn run_upscaler(&mut self, eye: Eye) {
        if self.ctx.antialiasing().upscaler_kind().is_none() {
            return;
        }
        let Some(upscaler) = self.upscalers[eye.index()].as_mut() else {
            return;
        };

        self.ctx.command.begin_sample("Upscale");
        let source = self.ctx.source();
        let inputs = DispatchInputs {
            color: source,
            depth: self.ctx.has_depth().then_some(CameraSurface::Depth.into()),
            motion_vectors: self.ctx.has_motion_vectors().then_some(CameraSurface::MotionVectors.into()),
            opaque: self.ctx.has_opaque_copy().then_some(CameraSurface::OpaqueCopy.into()),
        };
        let output = upscaler.dispatch(&mut self.ctx, &inputs);
        self.ctx.release_if_temporary(source);
        self.ctx.set_source(output.into());
        let (width, height) = self.ctx.display_size();
        self.ctx.set_scaled_size(width, height);
        self.ctx.command.end_sample("Upscale");
    }

    /// Standalone builtins, uber contributors and the uber blit
    fn render_builtin_stack(&mut self, needs_final_pass: bool) {
        self.ctx.command.begin_sample("BuiltinStack");
        for name in STANDALONE_STACK {
            if self.is_builtin_active(name) {
                self.chain_effect(name);
            }
        }

        self.ctx.sheets.get(UBER_SHADER).clear();
        for name in UBER_STACK {
            if !self.is_builtin_active(name) {
                continue;
            }
            if let Some(bundle) = self.registry.by_name_mut(name) {
                bundle.render(&mut self.ctx);
            }
        }
        if let Some(exposure) = self.ctx.auto_exposure_texture() {
            self.ctx.sheets.get(UBER_SHADER).set_texture("_AutoExposureTex", exposure);
        }

        let source = self.ctx.source();
        let (destination, flip): (SurfaceRef, bool) = if needs_final_pass {
            (self.ctx.get_temporary("uber_output").into(), false)
        } else {
            if self.config.dithering {
                apply_dithering(&mut self.ctx, UBER_SHADER);
            }
            (CameraSurface::Destination.into(), self.ctx.flip_destination())
        };
        self.ctx.sheets.get(UBER_SHADER).flush(&mut self.ctx.command);
        self.ctx.command.blit_flipped(source, destination, UBER_SHADER, 0, flip);

        self.ctx.release_deferred();
        self.ctx.release_if_temporary(source);
        self.ctx.set_source(destination);
        self.ctx.command.end_sample("BuiltinStack");
    }

    fn run_bucket(&mut self, point: InjectionPoint) {
        let names = self.registry.active_in(point, &self.ctx);
        if names.is_empty() {
            return;
        }
        self.ctx.command.begin_sample(point.name());
        for name in names {
            self.chain_effect(name);
        }
        self.ctx.command.end_sample(point.name());
    }

    /// Render one effect from the current source into a fresh surface
    fn chain_effect(&mut self, name: &str) {
        let Some(bundle) = self.registry.by_name_mut(name) else {
            return;
        };
        let source = self.ctx.source();
        let destination = self.ctx.get_temporary("effect_target");
        self.ctx.set_destination(destination.into());
        bundle.render(&mut self.ctx);
        self.ctx.release_if_temporary(source);
        self.ctx.set_source(destination.into());
        self.ctx.set_destination(CameraSurface::Destination.into());
    }

    fn is_builtin_active(&self, name: &str) -> bool {
        self.registry.by_name(name).is_some_and(|b| BundleRegistry::is_active(b, &self.ctx))
    }

    // --- Antialiasing selection ---

    fn resolve_antialiasing(&mut self, scene_view: bool) -> Antialiasing {
        let selection = match self.selection {
            Some(selection) => selection,
            None => {
                let selection = self.select_backend();
                self.selection = Some(selection);
                selection
            }
        };

        let mut mode = selection.effective;
        // Preview views never jitter or rescale
        if scene_view && mode.upscaler_kind().is_some() {
            mode = match self.config.fallback {
                FallbackMode::Fxaa | FallbackMode::Smaa => self.config.fallback.into(),
                FallbackMode::None | FallbackMode::Taa => Antialiasing::None,
            };
        }
        self.sync_upscalers(mode.upscaler_kind());
        mode
    }

    fn select_backend(&mut self) -> Selection {
        let requested = self.config.antialiasing;
        let caps = *self.ctx.caps();
        let mut effective = requested;

        if let Some(kind) = requested.upscaler_kind()
            && !self.check_support(kind, &caps)
        {
            let fallback: Antialiasing = self.config.fallback.into();
            log::warn!("{} is not supported on this GPU, using {}", kind.name(), fallback.name());
            effective = fallback;
            if let Some(fallback_kind) = fallback.upscaler_kind()
                && !self.check_support(fallback_kind, &caps)
            {
                log::warn!("{} fallback is not supported either, antialiasing disabled", fallback_kind.name());
                effective = Antialiasing::None;
            }
        } else {
            log::info!("antialiasing: {}", requested.name());
        }
        Selection { requested, effective }
    }

    fn check_support(&mut self, kind: UpscalerKind, caps: &GpuCaps) -> bool {
        match &mut self.upscalers[Eye::Left.index()] {
            Some(upscaler) if upscaler.kind() == kind => upscaler.is_supported(caps),
            _ => create_upscaler(kind, Eye::Left, &self.config.upscaler, &self.config.taa).is_supported(caps),
        }
    }

    /// Drop backends of another kind; zero the mip bias when none is active
    fn sync_upscalers(&mut self, kind: Option<UpscalerKind>) {
        for slot in &mut self.upscalers {
            if slot.as_ref().is_some_and(|u| Some(u.kind()) != kind)
                && let Some(mut upscaler) = slot.take()
            {
                log::info!("{} ({}) released", upscaler.kind().name(), upscaler.core().eye().name());
                upscaler.release(&mut self.ctx.command);
            }
        }
        if kind.is_none() && self.mip_bias.is_applied() {
            self.mip_bias.reset(self.library.as_mut());
        }
    }
}
