//! Log-luminance histogram shared by exposure effects

use bytemuck::{Pod, Zeroable};

use crate::core::view::Eye;
use crate::render::command::{Command, CommandSequence, PersistentSurface, SurfaceRef};
use crate::render::surface_pool::SurfaceDesc;

/// Number of histogram bins
pub const HISTOGRAM_BINS: u32 = 128;
/// Luminance range covered by the histogram, in EV
pub const HISTOGRAM_MIN_EV: f32 = -9.0;
pub const HISTOGRAM_MAX_EV: f32 = 9.0;

const THREAD_GROUP: u32 = 16;

const BUFFER: PersistentSurface = PersistentSurface::new("log_histogram", Eye::Left, 0);

/// Histogram build parameters
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct HistogramParams {
    /// x = scale, y = offset into [0, 1] bin space, z/w = source size
    pub scale_offset_res: [f32; 4],
}

impl HistogramParams {
    pub fn new(width: u32, height: u32) -> Self {
        let range = HISTOGRAM_MAX_EV - HISTOGRAM_MIN_EV;
        Self {
            scale_offset_res: [1.0 / range, -HISTOGRAM_MIN_EV / range, width as f32, height as f32],
        }
    }
}

/// GPU log histogram, rebuilt from the current source on demand
#[derive(Debug, Default)]
pub struct LogHistogram {
    allocated: bool,
    generations: u64,
}

impl LogHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record clear + build of the histogram from `source`
    pub fn generate(&mut self, cmd: &mut CommandSequence, source: SurfaceRef, width: u32, height: u32) {
        if !self.allocated {
            let desc = SurfaceDesc::new("log_histogram", HISTOGRAM_BINS, 1, wgpu::TextureFormat::R32Uint)
                .with_random_write();
            cmd.push(Command::AllocatePersistent { surface: BUFFER, desc });
            self.allocated = true;
        }

        cmd.dispatch("histogram_clear", Vec::new(), vec![BUFFER.into()], [HISTOGRAM_BINS / 64, 1, 1]);
        cmd.set_constants("histogram_generate", &HistogramParams::new(width, height));
        // Source is sampled at half resolution
        cmd.dispatch(
            "histogram_generate",
            vec![source],
            vec![BUFFER.into()],
            [
                (width / 2).div_ceil(THREAD_GROUP).max(1),
                (height / 2).div_ceil(THREAD_GROUP).max(1),
                1,
            ],
        );
        self.generations += 1;
    }

    pub fn surface(&self) -> SurfaceRef {
        BUFFER.into()
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    pub fn generations(&self) -> u64 {
        self.generations
    }

    pub fn release(&mut self, cmd: &mut CommandSequence) {
        if self.allocated {
            cmd.push(Command::FreePersistent { surface: BUFFER });
            self.allocated = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::command::CameraSurface;

    #[test]
    fn test_params_map_ev_range() {
        let p = HistogramParams::new(1920, 1080);
        let [scale, offset, w, h] = p.scale_offset_res;
        // min EV maps to 0, max EV maps to 1
        assert!((HISTOGRAM_MIN_EV * scale + offset).abs() < 1e-6);
        assert!((HISTOGRAM_MAX_EV * scale + offset - 1.0).abs() < 1e-6);
        assert_eq!((w, h), (1920.0, 1080.0));
    }

    #[test]
    fn test_generate_allocates_once() {
        let mut hist = LogHistogram::new();
        let mut cmd = CommandSequence::new();
        hist.generate(&mut cmd, CameraSurface::Color.into(), 1920, 1080);
        hist.generate(&mut cmd, CameraSurface::Color.into(), 1920, 1080);

        let allocs = cmd
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::AllocatePersistent { .. }))
            .count();
        assert_eq!(allocs, 1);
        assert_eq!(hist.generations(), 2);

        hist.release(&mut cmd);
        hist.release(&mut cmd);
        let frees = cmd
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::FreePersistent { .. }))
            .count();
        assert_eq!(frees, 1);
    }
}
