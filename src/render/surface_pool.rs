//! Surface Pool - per-frame arena of ephemeral render surfaces
//!
//! Handles are arena indices tagged with a generation:
//! - A released index goes back on the free list and may be handed out again
//!   in the same frame, with a bumped generation
//! - `reset` frees everything at frame end
//! - Nothing is materialized until a descriptor is bound on first use

/// Identifier of a pool surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle {
    index: u32,
    generation: u32,
}

impl SurfaceHandle {
    /// Arena slot; two live handles never share one
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Size and format of a 2D surface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    /// Bound as a storage texture by compute passes
    pub random_write: bool,
}

impl SurfaceDesc {
    pub fn new(label: &'static str, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            label,
            width: width.max(1),
            height: height.max(1),
            format,
            random_write: false,
        }
    }

    pub fn with_random_write(mut self) -> Self {
        self.random_write = true;
        self
    }

    /// Approximate GPU footprint in bytes
    pub fn byte_size(&self) -> u64 {
        let bpp = self.format.block_copy_size(None).unwrap_or(4) as u64;
        self.width as u64 * self.height as u64 * bpp
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum SlotState {
    Free,
    Acquired(&'static str),
    Bound(SurfaceDesc),
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    generation: u32,
    state: SlotState,
}

/// Arena allocator for frame-scoped surfaces
#[derive(Debug, Default)]
pub struct SurfacePool {
    slots: Vec<Slot>,
    /// Free slot indices, popped from the back
    free: Vec<u32>,
    /// Handles handed out since the last reset
    acquired_this_frame: usize,
    peak_live: usize,
}

impl SurfacePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a handle that does not alias any live one
    pub fn acquire(&mut self, label: &'static str) -> SurfaceHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot { generation: 0, state: SlotState::Free });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        debug_assert_eq!(slot.state, SlotState::Free, "free list handed out a live slot");
        slot.generation = slot.generation.wrapping_add(1);
        slot.state = SlotState::Acquired(label);
        let generation = slot.generation;

        self.acquired_this_frame += 1;
        self.peak_live = self.peak_live.max(self.live_count());
        log::trace!("surface pool: acquired '{}' at slot {}", label, index);

        SurfaceHandle { index, generation }
    }

    /// Attach size and format to a handle on first use
    pub fn bind(&mut self, handle: SurfaceHandle, desc: SurfaceDesc) {
        debug_assert!(self.is_live(handle), "binding dead handle {handle:?}");
        if let Some(slot) = self.slot_mut(handle) {
            slot.state = SlotState::Bound(desc);
        }
    }

    /// Return a handle to the free list
    pub fn release(&mut self, handle: SurfaceHandle) {
        debug_assert!(self.is_live(handle), "releasing dead handle {handle:?}");
        if let Some(slot) = self.slot_mut(handle) {
            slot.state = SlotState::Free;
            self.free.push(handle.index);
            log::trace!("surface pool: released slot {}", handle.index);
        }
    }

    /// Invalidate every outstanding handle; only between frames
    pub fn reset(&mut self) {
        self.free.clear();
        // Pushed high to low so the lowest index is handed out first
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            slot.state = SlotState::Free;
            self.free.push(index as u32);
        }
        self.acquired_this_frame = 0;
    }

    pub fn is_live(&self, handle: SurfaceHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|s| s.generation == handle.generation && s.state != SlotState::Free)
    }

    /// Bound descriptor of a live handle
    pub fn desc(&self, handle: SurfaceHandle) -> Option<&SurfaceDesc> {
        match self.slots.get(handle.index as usize) {
            Some(Slot { generation, state: SlotState::Bound(desc) }) if *generation == handle.generation => {
                Some(desc)
            }
            _ => None,
        }
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state != SlotState::Free).count()
    }

    pub fn acquired_this_frame(&self) -> usize {
        self.acquired_this_frame
    }

    /// Highest number of simultaneously live handles seen
    pub fn peak_live(&self) -> usize {
        self.peak_live
    }

    /// Number of distinct slots ever created
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live handles with a bound descriptor
    pub fn bound_surfaces(&self) -> impl Iterator<Item = (SurfaceHandle, &SurfaceDesc)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match &slot.state {
            SlotState::Bound(desc) => Some((
                SurfaceHandle { index: index as u32, generation: slot.generation },
                desc,
            )),
            _ => None,
        })
    }

    fn slot_mut(&mut self, handle: SurfaceHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.state != SlotState::Free)
    }
}
