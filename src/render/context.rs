//! Per-frame render context shared by every stage
//!
//! The orchestrator owns the context and is the only writer of `source`,
//! `destination` and the scaled size. Effect renderers and upscalers read those
//! and allocate scratch surfaces through it.

use crate::core::view::{Eye, StereoMode, View};
use crate::render::antialiasing::Antialiasing;
use crate::render::caps::GpuCaps;
use crate::render::command::{CameraSurface, Command, CommandSequence, SurfaceRef};
use crate::render::histogram::LogHistogram;
use crate::render::property_sheet::PropertySheetCache;
use crate::render::surface_pool::{SurfaceDesc, SurfaceHandle, SurfacePool};

/// Stereo state for the current invocation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StereoState {
    pub mode: StereoMode,
    pub eye: Eye,
}

/// Mutable record shared by all stages of one frame
pub struct RenderContext {
    source: SurfaceRef,
    destination: SurfaceRef,
    /// Current internal resolution
    width: u32,
    height: u32,
    display_width: u32,
    display_height: u32,
    format: wgpu::TextureFormat,
    hdr: bool,
    antialiasing: Antialiasing,
    stereo: StereoState,
    is_scene_view: bool,
    flip_destination: bool,
    has_depth: bool,
    has_motion_vectors: bool,
    has_opaque_copy: bool,
    caps: GpuCaps,
    frame_index: u64,
    time: f32,
    delta_time: f32,
    auto_exposure: Option<SurfaceRef>,
    /// Surfaces read by the uber blit, released after it
    deferred: Vec<SurfaceHandle>,
    pool: SurfacePool,
    /// Recorded GPU work for the frame
    pub command: CommandSequence,
    /// Cached material state, including the uber sheet
    pub sheets: PropertySheetCache,
    pub histogram: LogHistogram,
}

impl RenderContext {
    pub fn new(caps: GpuCaps) -> Self {
        Self {
            source: CameraSurface::Color.into(),
            destination: CameraSurface::Destination.into(),
            width: 1,
            height: 1,
            display_width: 1,
            display_height: 1,
            format: wgpu::TextureFormat::Rgba16Float,
            hdr: true,
            antialiasing: Antialiasing::None,
            stereo: StereoState::default(),
            is_scene_view: false,
            flip_destination: false,
            has_depth: false,
            has_motion_vectors: false,
            has_opaque_copy: false,
            caps,
            frame_index: 0,
            time: 0.0,
            delta_time: 1.0 / 60.0,
            auto_exposure: None,
            deferred: Vec::new(),
            pool: SurfacePool::new(),
            command: CommandSequence::new(),
            sheets: PropertySheetCache::new(),
            histogram: LogHistogram::new(),
        }
    }

    /// Refresh view-derived state for one eye
    pub(crate) fn begin_eye(&mut self, view: &View, eye: Eye, frame_index: u64) {
        self.source = CameraSurface::Color.into();
        self.destination = CameraSurface::Destination.into();
        self.width = view.display_width;
        self.height = view.display_height;
        self.display_width = view.display_width;
        self.display_height = view.display_height;
        self.format = view.format;
        self.hdr = view.hdr;
        self.stereo = StereoState { mode: view.stereo, eye };
        self.is_scene_view = view.is_scene_view;
        self.flip_destination = view.flip_destination;
        self.has_depth = view.has_depth;
        self.has_motion_vectors = view.has_motion_vectors;
        self.has_opaque_copy = false;
        self.frame_index = frame_index;
        self.auto_exposure = None;
    }

    // --- Read-only view for stages ---

    pub fn source(&self) -> SurfaceRef {
        self.source
    }

    pub fn destination(&self) -> SurfaceRef {
        self.destination
    }

    /// Current internal render resolution
    pub fn scaled_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn display_size(&self) -> (u32, u32) {
        (self.display_width, self.display_height)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn is_hdr(&self) -> bool {
        self.hdr
    }

    pub fn antialiasing(&self) -> Antialiasing {
        self.antialiasing
    }

    pub fn stereo(&self) -> StereoState {
        self.stereo
    }

    pub fn number_of_eyes(&self) -> u8 {
        self.stereo.mode.eye_count()
    }

    pub fn current_eye(&self) -> Eye {
        self.stereo.eye
    }

    pub fn is_single_pass_instanced(&self) -> bool {
        self.stereo.mode == StereoMode::SinglePassInstanced
    }

    pub fn is_scene_view(&self) -> bool {
        self.is_scene_view
    }

    pub fn flip_destination(&self) -> bool {
        self.flip_destination
    }

    pub fn has_depth(&self) -> bool {
        self.has_depth
    }

    pub fn has_motion_vectors(&self) -> bool {
        self.has_motion_vectors
    }

    /// Opaque color was copied aside this frame
    pub fn has_opaque_copy(&self) -> bool {
        self.has_opaque_copy
    }

    pub fn caps(&self) -> &GpuCaps {
        &self.caps
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Seconds since the pipeline started
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn auto_exposure_texture(&self) -> Option<SurfaceRef> {
        self.auto_exposure
    }

    pub fn set_auto_exposure_texture(&mut self, surface: SurfaceRef) {
        self.auto_exposure = Some(surface);
    }

    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }

    // --- Orchestrator-only mutation ---

    pub(crate) fn set_source(&mut self, source: SurfaceRef) {
        self.source = source;
    }

    pub(crate) fn set_destination(&mut self, destination: SurfaceRef) {
        self.destination = destination;
    }

    pub(crate) fn set_scaled_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub(crate) fn set_antialiasing(&mut self, antialiasing: Antialiasing) {
        self.antialiasing = antialiasing;
    }

    pub(crate) fn set_has_opaque_copy(&mut self, value: bool) {
        self.has_opaque_copy = value;
    }

    pub(crate) fn set_caps(&mut self, caps: GpuCaps) {
        self.caps = caps;
    }

    pub(crate) fn set_time(&mut self, time: f32, delta_time: f32) {
        self.time = time;
        self.delta_time = delta_time.max(0.0);
    }

    // --- Surface allocation ---

    /// Bind a pool handle at the current scaled size and record its creation
    pub fn bind_surface(&mut self, handle: SurfaceHandle, format: wgpu::TextureFormat) {
        let desc = SurfaceDesc::new("temporary", self.width, self.height, format);
        self.bind_desc(handle, desc);
    }

    /// Scratch surface at the current scaled size and format
    pub fn get_temporary(&mut self, label: &'static str) -> SurfaceHandle {
        let desc = SurfaceDesc::new(label, self.width, self.height, self.format);
        self.get_temporary_desc(desc)
    }

    /// Scratch surface with explicit size and format
    pub fn get_temporary_sized(
        &mut self,
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        random_write: bool,
    ) -> SurfaceHandle {
        let mut desc = SurfaceDesc::new(label, width, height, format);
        desc.random_write = random_write;
        self.get_temporary_desc(desc)
    }

    pub fn get_temporary_desc(&mut self, desc: SurfaceDesc) -> SurfaceHandle {
        let handle = self.pool.acquire(desc.label);
        self.bind_desc(handle, desc);
        handle
    }

    pub fn release_temporary(&mut self, handle: SurfaceHandle) {
        if self.pool.is_live(handle) {
            self.pool.release(handle);
            self.command.push(Command::ReleaseTemporary { handle });
        } else {
            log::warn!("release of stale surface {:?} ignored", handle);
        }
    }

    /// Release `surface` if it is a pool temporary
    pub fn release_if_temporary(&mut self, surface: SurfaceRef) {
        if let Some(handle) = surface.pool_handle() {
            self.release_temporary(handle);
        }
    }

    /// Keep `handle` alive until the orchestrator releases deferred surfaces
    pub fn defer_release(&mut self, handle: SurfaceHandle) {
        self.deferred.push(handle);
    }

    pub(crate) fn release_deferred(&mut self) {
        for handle in std::mem::take(&mut self.deferred) {
            self.release_temporary(handle);
        }
    }

    /// Release every pool surface still live
    pub(crate) fn release_all_temporaries(&mut self) -> usize {
        self.deferred.clear();
        let live: Vec<SurfaceHandle> = self.pool.bound_surfaces().map(|(h, _)| h).collect();
        for handle in &live {
            self.pool.release(*handle);
            self.command.push(Command::ReleaseTemporary { handle: *handle });
        }
        live.len()
    }

    /// Recycle the pool; called only once the frame's commands are handed over
    pub(crate) fn reset_pool(&mut self) {
        debug_assert_eq!(self.pool.live_count(), 0, "surface pool reset with live handles");
        self.pool.reset();
    }

    fn bind_desc(&mut self, handle: SurfaceHandle, desc: SurfaceDesc) {
        self.pool.bind(handle, desc);
        self.command.push(Command::GetTemporary { handle, desc });
    }
}
