//! wgpu backing for recorded command sequences
//!
//! The pipeline itself only records. This module owns a device and turns the
//! allocation commands of a sequence into real textures, recycling pool
//! surfaces across frames by descriptor. Copies are executed directly; blits
//! and dispatches are left to the host's shader library.

use std::collections::HashMap;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::caps::GpuCaps;
use crate::render::command::{Command, CommandSequence, PersistentSurface, SurfaceRef};
use crate::render::surface_pool::{SurfaceDesc, SurfaceHandle};

/// Device and queue without a presentation surface
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub caps: GpuCaps,
}

impl GpuContext {
    /// Create a headless context on the best available adapter
    pub async fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Gpu(format!("No suitable adapter found: {:?}", e)))?;

        let device_desc = wgpu::DeviceDescriptor {
            label: Some("postfx_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_desc)
            .await
            .map_err(|e| Error::Gpu(e.to_string()))?;

        let caps = GpuCaps::from_adapter(&adapter);
        Ok(Self { instance, adapter, device, queue, caps })
    }

    /// Blocking variant for tools and tests
    pub fn headless_blocking() -> Result<Self> {
        pollster::block_on(Self::headless())
    }
}

/// Descriptor fields that decide whether two surfaces are interchangeable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct TextureKey {
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    random_write: bool,
}

impl From<&SurfaceDesc> for TextureKey {
    fn from(desc: &SurfaceDesc) -> Self {
        Self { width: desc.width, height: desc.height, format: desc.format, random_write: desc.random_write }
    }
}

/// Textures backing pool and persistent surfaces
#[derive(Default)]
pub struct SurfaceCache {
    live: HashMap<SurfaceHandle, (TextureKey, wgpu::Texture)>,
    free: HashMap<TextureKey, Vec<wgpu::Texture>>,
    persistent: HashMap<PersistentSurface, wgpu::Texture>,
    created: u64,
}

impl SurfaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the allocation and copy commands of one frame
    pub fn execute(&mut self, gpu: &GpuContext, cmd: &CommandSequence) {
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("postfx_frame"),
        });
        let mut copies = 0;

        for command in cmd.commands() {
            match command {
                Command::GetTemporary { handle, desc } => {
                    let key = TextureKey::from(desc);
                    let texture = match self.free.get_mut(&key).and_then(Vec::pop) {
                        Some(texture) => texture,
                        None => self.create(gpu, desc),
                    };
                    self.live.insert(*handle, (key, texture));
                }
                Command::ReleaseTemporary { handle } => {
                    if let Some((key, texture)) = self.live.remove(handle) {
                        self.free.entry(key).or_default().push(texture);
                    }
                }
                Command::AllocatePersistent { surface, desc } => {
                    let texture = self.create(gpu, desc);
                    if let Some(old) = self.persistent.insert(*surface, texture) {
                        old.destroy();
                    }
                }
                Command::FreePersistent { surface } => {
                    if let Some(texture) = self.persistent.remove(surface) {
                        texture.destroy();
                    }
                }
                Command::Copy { source, destination } => {
                    if let (Some(src), Some(dst)) = (self.texture(*source), self.texture(*destination)) {
                        encoder.copy_texture_to_texture(src.as_image_copy(), dst.as_image_copy(), src.size());
                        copies += 1;
                    }
                }
                _ => {}
            }
        }

        // Anything still live at the end of a frame goes back to the free list
        for (_, (key, texture)) in self.live.drain() {
            self.free.entry(key).or_default().push(texture);
        }

        if copies > 0 {
            gpu.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Texture currently backing `surface`; camera surfaces belong to the host
    pub fn texture(&self, surface: SurfaceRef) -> Option<&wgpu::Texture> {
        match surface {
            SurfaceRef::Pool(handle) => self.live.get(&handle).map(|(_, texture)| texture),
            SurfaceRef::Persistent(persistent) => self.persistent.get(&persistent),
            SurfaceRef::Camera(_) => None,
        }
    }

    /// Textures created since construction; flat once the pool warms up
    pub fn textures_created(&self) -> u64 {
        self.created
    }

    pub fn persistent_count(&self) -> usize {
        self.persistent.len()
    }

    pub fn pooled_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Destroy every texture
    pub fn clear(&mut self) {
        for (_, (_, texture)) in self.live.drain() {
            texture.destroy();
        }
        for texture in self.free.drain().flat_map(|(_, textures)| textures) {
            texture.destroy();
        }
        for (_, texture) in self.persistent.drain() {
            texture.destroy();
        }
    }

    fn create(&mut self, gpu: &GpuContext, desc: &SurfaceDesc) -> wgpu::Texture {
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;
        if desc.random_write {
            let allowed = gpu.adapter.get_texture_format_features(desc.format).allowed_usages;
            if allowed.contains(wgpu::TextureUsages::STORAGE_BINDING) {
                usage |= wgpu::TextureUsages::STORAGE_BINDING;
            } else {
                log::warn!("{:?} cannot be a storage texture, '{}' is render-only", desc.format, desc.label);
            }
        }

        self.created += 1;
        gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage,
            view_formats: &[],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::core::view::View;
    use crate::render::antialiasing::Antialiasing;
    use crate::render::frame::PostProcessPipeline;

    #[test]
    fn test_pool_textures_recycled_across_frames() {
        crate::core::logging::init_for_tests();
        let gpu = match GpuContext::headless_blocking() {
            Ok(gpu) => gpu,
            Err(e) => {
                log::warn!("skipping GPU test: {}", e);
                return;
            }
        };

        let config = PipelineConfig { antialiasing: Antialiasing::Fxaa, ..Default::default() };
        let mut pipeline = PostProcessPipeline::new(config, gpu.caps);
        let mut view = View::new(320, 180, 60.0);
        let mut cache = SurfaceCache::new();

        cache.execute(&gpu, &pipeline.render_frame(&mut view, 0.0));
        let warm = cache.textures_created();
        assert!(warm > 0);
        for frame in 1..4 {
            cache.execute(&gpu, &pipeline.render_frame(&mut view, frame as f64 / 60.0));
        }
        assert_eq!(cache.textures_created(), warm);

        cache.execute(&gpu, &pipeline.release());
        assert_eq!(cache.persistent_count(), 0);
        cache.clear();
        assert_eq!(cache.pooled_count(), 0);
    }
}
