//! Ping-pong history surfaces owned by a temporal backend

use crate::core::view::Eye;
use crate::render::command::{Command, CommandSequence, PersistentSurface, SurfaceRef};
use crate::render::surface_pool::SurfaceDesc;

/// Two persistent surfaces; one is read as last frame's result while the
/// other receives this frame's
#[derive(Debug)]
pub struct HistoryBuffers {
    surfaces: [PersistentSurface; 2],
    desc: Option<SurfaceDesc>,
    current: usize,
    valid: bool,
}

impl HistoryBuffers {
    pub fn new(owner: &'static str, eye: Eye) -> Self {
        Self {
            surfaces: [PersistentSurface::new(owner, eye, 0), PersistentSurface::new(owner, eye, 1)],
            desc: None,
            current: 0,
            valid: false,
        }
    }

    /// Allocate both surfaces for `desc`, reallocating on any change
    ///
    /// Returns true when new surfaces were allocated (history is then invalid).
    pub fn ensure(&mut self, desc: SurfaceDesc, cmd: &mut CommandSequence) -> bool {
        if self.desc == Some(desc) {
            return false;
        }
        self.release(cmd);
        for surface in self.surfaces {
            cmd.push(Command::AllocatePersistent { surface, desc });
        }
        self.desc = Some(desc);
        self.current = 0;
        log::debug!("{}: history allocated {}x{}", self.surfaces[0].owner, desc.width, desc.height);
        true
    }

    /// Last frame's result
    pub fn read(&self) -> SurfaceRef {
        self.surfaces[self.current].into()
    }

    /// Target for this frame's result
    pub fn write(&self) -> SurfaceRef {
        self.surfaces[1 - self.current].into()
    }

    /// Swap roles after a frame wrote `write()`
    pub fn commit(&mut self) {
        if self.desc.is_some() {
            self.current = 1 - self.current;
            self.valid = true;
        }
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_allocated(&self) -> bool {
        self.desc.is_some()
    }

    pub fn desc(&self) -> Option<&SurfaceDesc> {
        self.desc.as_ref()
    }

    pub fn release(&mut self, cmd: &mut CommandSequence) {
        if self.desc.take().is_some() {
            for surface in self.surfaces {
                cmd.push(Command::FreePersistent { surface });
            }
        }
        self.valid = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(w: u32) -> SurfaceDesc {
        SurfaceDesc::new("history", w, w, wgpu::TextureFormat::Rgba16Float)
    }

    #[test]
    fn test_ping_pong() {
        let mut history = HistoryBuffers::new("taa", Eye::Left);
        let mut cmd = CommandSequence::new();
        assert!(history.ensure(desc(64), &mut cmd));
        assert!(!history.ensure(desc(64), &mut cmd));
        assert!(!history.is_valid());

        let (r, w) = (history.read(), history.write());
        assert_ne!(r, w);
        history.commit();
        assert!(history.is_valid());
        assert_eq!(history.read(), w);
        assert_eq!(history.write(), r);
    }

    #[test]
    fn test_resize_reallocates() {
        let mut history = HistoryBuffers::new("taa", Eye::Right);
        let mut cmd = CommandSequence::new();
        history.ensure(desc(64), &mut cmd);
        history.commit();
        assert!(history.ensure(desc(128), &mut cmd));
        assert!(!history.is_valid());

        let frees = cmd.commands().iter().filter(|c| matches!(c, Command::FreePersistent { .. })).count();
        let allocs = cmd.commands().iter().filter(|c| matches!(c, Command::AllocatePersistent { .. })).count();
        assert_eq!((allocs, frees), (4, 2));
    }

    #[test]
    fn test_release_idempotent() {
        let mut history = HistoryBuffers::new("fsr3", Eye::Left);
        let mut cmd = CommandSequence::new();
        history.release(&mut cmd);
        assert!(cmd.is_empty());
        history.ensure(desc(32), &mut cmd);
        history.release(&mut cmd);
        history.release(&mut cmd);
        assert_eq!(cmd.len(), 4);
        assert!(!history.is_allocated());
    }
}
