//! Recorded GPU command stream
//!
//! Nothing in the pipeline talks to the GPU directly. Every stage appends
//! commands here and the host replays the finished sequence after the frame.

use std::collections::HashMap;

use crate::core::view::Eye;
use crate::render::surface_pool::{SurfaceDesc, SurfaceHandle};

/// Surfaces the host owns and hands to the pipeline each frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CameraSurface {
    /// Camera color target (opaque color during the opaque-only stage)
    Color,
    /// Copy of the opaque color taken before opaque-only effects run
    OpaqueCopy,
    Depth,
    MotionVectors,
    /// Final destination supplied by the host
    Destination,
}

/// Surface owned across frames by one renderer (history, LUTs, exposure)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PersistentSurface {
    pub owner: &'static str,
    pub eye: Eye,
    pub slot: u8,
}

impl PersistentSurface {
    pub const fn new(owner: &'static str, eye: Eye, slot: u8) -> Self {
        Self { owner, eye, slot }
    }
}

/// Any surface a command can read or write
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceRef {
    Pool(SurfaceHandle),
    Camera(CameraSurface),
    Persistent(PersistentSurface),
}

impl SurfaceRef {
    pub fn pool_handle(self) -> Option<SurfaceHandle> {
        match self {
            Self::Pool(handle) => Some(handle),
            _ => None,
        }
    }
}

impl From<SurfaceHandle> for SurfaceRef {
    fn from(handle: SurfaceHandle) -> Self {
        Self::Pool(handle)
    }
}

impl From<CameraSurface> for SurfaceRef {
    fn from(surface: CameraSurface) -> Self {
        Self::Camera(surface)
    }
}

impl From<PersistentSurface> for SurfaceRef {
    fn from(surface: PersistentSurface) -> Self {
        Self::Persistent(surface)
    }
}

/// One recorded operation
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BeginSample(&'static str),
    EndSample(&'static str),
    GetTemporary {
        handle: SurfaceHandle,
        desc: SurfaceDesc,
    },
    ReleaseTemporary {
        handle: SurfaceHandle,
    },
    AllocatePersistent {
        surface: PersistentSurface,
        desc: SurfaceDesc,
    },
    FreePersistent {
        surface: PersistentSurface,
    },
    /// Material state for the next blit with `shader`
    SetProperties {
        shader: &'static str,
        keywords: Vec<&'static str>,
        floats: Vec<(&'static str, [f32; 4])>,
        textures: Vec<(&'static str, SurfaceRef)>,
    },
    /// Packed constant block for the next dispatch of `kernel`
    SetConstants {
        kernel: &'static str,
        data: Vec<u8>,
    },
    /// Fullscreen triangle draw
    Blit {
        source: SurfaceRef,
        destination: SurfaceRef,
        shader: &'static str,
        pass: u32,
        flip_y: bool,
    },
    /// Compute dispatch
    Dispatch {
        kernel: &'static str,
        reads: Vec<SurfaceRef>,
        writes: Vec<SurfaceRef>,
        groups: [u32; 3],
    },
    Copy {
        source: SurfaceRef,
        destination: SurfaceRef,
    },
}

impl Command {
    /// Surfaces sampled by this command
    pub fn reads(&self) -> Vec<SurfaceRef> {
        match self {
            Self::Blit { source, .. } | Self::Copy { source, .. } => vec![*source],
            Self::Dispatch { reads, .. } => reads.clone(),
            Self::SetProperties { textures, .. } => textures.iter().map(|(_, s)| *s).collect(),
            _ => Vec::new(),
        }
    }

    /// Surfaces written by this command
    pub fn writes(&self) -> Vec<SurfaceRef> {
        match self {
            Self::Blit { destination, .. } | Self::Copy { destination, .. } => vec![*destination],
            Self::Dispatch { writes, .. } => writes.clone(),
            _ => Vec::new(),
        }
    }
}

/// Append-only command recorder
#[derive(Clone, Debug, Default)]
pub struct CommandSequence {
    commands: Vec<Command>,
}

impl CommandSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_sample(&mut self, name: &'static str) {
        self.commands.push(Command::BeginSample(name));
    }

    pub fn end_sample(&mut self, name: &'static str) {
        self.commands.push(Command::EndSample(name));
    }

    pub fn blit(&mut self, source: SurfaceRef, destination: SurfaceRef, shader: &'static str, pass: u32) {
        self.blit_flipped(source, destination, shader, pass, false);
    }

    pub fn blit_flipped(
        &mut self,
        source: SurfaceRef,
        destination: SurfaceRef,
        shader: &'static str,
        pass: u32,
        flip_y: bool,
    ) {
        debug_assert_ne!(source, destination, "{shader}: blit reads and writes the same surface");
        self.commands.push(Command::Blit { source, destination, shader, pass, flip_y });
    }

    pub fn copy(&mut self, source: SurfaceRef, destination: SurfaceRef) {
        debug_assert_ne!(source, destination, "copy onto itself");
        self.commands.push(Command::Copy { source, destination });
    }

    pub fn dispatch(
        &mut self,
        kernel: &'static str,
        reads: Vec<SurfaceRef>,
        writes: Vec<SurfaceRef>,
        groups: [u32; 3],
    ) {
        debug_assert!(
            !writes.iter().any(|w| reads.contains(w)),
            "{kernel}: dispatch reads and writes the same surface"
        );
        self.commands.push(Command::Dispatch { kernel, reads, writes, groups });
    }

    pub fn set_constants<T: bytemuck::Pod>(&mut self, kernel: &'static str, constants: &T) {
        self.commands.push(Command::SetConstants {
            kernel,
            data: bytemuck::bytes_of(constants).to_vec(),
        });
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Move every recorded command out, leaving the recorder empty
    pub fn take(&mut self) -> CommandSequence {
        std::mem::take(self)
    }

    /// Names of all profiling scopes, in recording order
    pub fn sample_labels(&self) -> Vec<&'static str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginSample(name) => Some(*name),
                _ => None,
            })
            .collect()
    }

    /// Shader names of every blit, in recording order
    pub fn blit_shaders(&self) -> Vec<&'static str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Blit { shader, .. } => Some(*shader),
                _ => None,
            })
            .collect()
    }

    /// Kernel names of every dispatch, in recording order
    pub fn dispatch_kernels(&self) -> Vec<&'static str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Dispatch { kernel, .. } => Some(*kernel),
                _ => None,
            })
            .collect()
    }

    /// Number of temporary surfaces requested
    pub fn temporaries_requested(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::GetTemporary { .. }))
            .count()
    }

    /// Last constant block recorded for `kernel`
    pub fn last_constants(&self, kernel: &str) -> Option<&[u8]> {
        self.commands.iter().rev().find_map(|c| match c {
            Command::SetConstants { kernel: k, data } if *k == kernel => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Check ordering invariants for pool surfaces:
    /// every temporary is written before it is read, never touched after release,
    /// and no command reads and writes the same surface.
    pub fn validate(&self) -> Result<(), String> {
        #[derive(PartialEq)]
        enum Use {
            Acquired,
            Written,
            Released,
        }

        let mut state: HashMap<SurfaceHandle, Use> = HashMap::new();
        let mut open_samples: Vec<&'static str> = Vec::new();

        for (i, cmd) in self.commands.iter().enumerate() {
            match cmd {
                Command::BeginSample(name) => open_samples.push(name),
                Command::EndSample(name) => match open_samples.pop() {
                    Some(open) if open == *name => {}
                    other => {
                        return Err(format!("#{i}: sample '{name}' closed while {other:?} open"));
                    }
                },
                Command::GetTemporary { handle, .. } => {
                    if matches!(state.get(handle), Some(Use::Acquired | Use::Written)) {
                        return Err(format!("#{i}: {handle:?} acquired while still live"));
                    }
                    state.insert(*handle, Use::Acquired);
                }
                Command::ReleaseTemporary { handle } => {
                    if !matches!(state.get(handle), Some(Use::Acquired | Use::Written)) {
                        return Err(format!("#{i}: {handle:?} released but not live"));
                    }
                    state.insert(*handle, Use::Released);
                }
                _ => {}
            }

            let reads = cmd.reads();
            let writes = cmd.writes();
            if let Some(w) = writes.iter().find(|w| reads.contains(w)) {
                return Err(format!("#{i}: {w:?} read and written by one command"));
            }
            for r in reads.iter().filter_map(|r| r.pool_handle()) {
                if state.get(&r) != Some(&Use::Written) {
                    return Err(format!("#{i}: {r:?} read before being written"));
                }
            }
            for w in writes.iter().filter_map(|w| w.pool_handle()) {
                match state.get(&w) {
                    Some(Use::Acquired | Use::Written) => {
                        state.insert(w, Use::Written);
                    }
                    _ => return Err(format!("#{i}: {w:?} written while not live")),
                }
            }
        }

        if let Some(open) = open_samples.pop() {
            return Err(format!("sample '{open}' never closed"));
        }
        Ok(())
    }
}
