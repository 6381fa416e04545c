//! Postfx - per-frame post-processing pipeline with pluggable upscalers

pub mod config;
pub mod core;
pub mod effect;
pub mod render;

pub use config::PipelineConfig;
pub use core::error::Error;
pub use core::view::{Eye, StereoMode, View};
pub use effect::{BundleRegistry, Effect, EffectSettings, InjectionPoint};
pub use render::{Antialiasing, GpuCaps, PostProcessPipeline};
