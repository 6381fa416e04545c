//! Frame recording, surfaces and the post stack

pub mod antialiasing;
pub mod caps;
pub mod command;
pub mod context;
pub mod frame;
pub mod gpu;
pub mod histogram;
pub mod pipeline;
pub mod property_sheet;
pub mod stereo;
pub mod surface_pool;
pub mod upscale;

pub use antialiasing::{Antialiasing, FallbackMode, FinalPass, FxaaSettings, SmaaQuality};
pub use caps::{GpuCaps, GpuVendor};
pub use command::{CameraSurface, Command, CommandSequence, PersistentSurface, SurfaceRef};
pub use context::RenderContext;
pub use frame::{PostProcessPipeline, Selection};
pub use gpu::{GpuContext, SurfaceCache};
pub use surface_pool::{SurfaceDesc, SurfaceHandle, SurfacePool};
