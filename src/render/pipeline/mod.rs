//! Builtin effect renderers
//!
//! Opaque-only effects (ambient occlusion, reflections, fog) run before
//! transparent geometry. The rest form the fixed post stack; the last seven
//! only contribute state to the shared uber shader, composited in one blit.

pub mod ambient_occlusion;
pub mod auto_exposure;
pub mod bloom;
pub mod chromatic_aberration;
pub mod color_grading;
pub mod depth_of_field;
pub mod fog;
pub mod grain;
pub mod lens_distortion;
pub mod motion_blur;
pub mod reflections;
pub mod vignette;

pub use ambient_occlusion::{AmbientOcclusion, AmbientOcclusionSettings};
pub use auto_exposure::{AutoExposure, AutoExposureSettings};
pub use bloom::{Bloom, BloomSettings};
pub use chromatic_aberration::{ChromaticAberration, ChromaticAberrationSettings};
pub use color_grading::{ColorGrading, ColorGradingSettings, Tonemapper};
pub use depth_of_field::{DepthOfField, DepthOfFieldSettings};
pub use fog::{Fog, FogMode, FogSettings};
pub use grain::{Grain, GrainSettings};
pub use lens_distortion::{LensDistortion, LensDistortionSettings};
pub use motion_blur::{MotionBlur, MotionBlurSettings};
pub use reflections::{ReflectionSettings, ScreenSpaceReflections};
pub use vignette::{Vignette, VignetteSettings};

use crate::core::types::Result;
use crate::effect::{BundleRegistry, Effect};

/// Shader every uber contributor writes keywords and parameters to
pub const UBER_SHADER: &str = "uber";

/// Opaque-only builtins, in execution order
pub const OPAQUE_ONLY: [&str; 3] = [
    AmbientOcclusion::ATTRIBUTES.name,
    ScreenSpaceReflections::ATTRIBUTES.name,
    Fog::ATTRIBUTES.name,
];

/// Builtins rendered as standalone passes ahead of the uber blit
pub const STANDALONE_STACK: [&str; 2] = [DepthOfField::ATTRIBUTES.name, MotionBlur::ATTRIBUTES.name];

/// Builtins that only contribute uber state, in the order they are evaluated
pub const UBER_STACK: [&str; 7] = [
    AutoExposure::ATTRIBUTES.name,
    LensDistortion::ATTRIBUTES.name,
    ChromaticAberration::ATTRIBUTES.name,
    Bloom::ATTRIBUTES.name,
    Vignette::ATTRIBUTES.name,
    Grain::ATTRIBUTES.name,
    ColorGrading::ATTRIBUTES.name,
];

/// Register every builtin effect with default (disabled) settings
pub fn register_builtins(registry: &mut BundleRegistry) -> Result<()> {
    registry.register::<AmbientOcclusion>()?;
    registry.register::<ScreenSpaceReflections>()?;
    registry.register::<Fog>()?;
    registry.register::<DepthOfField>()?;
    registry.register::<MotionBlur>()?;
    registry.register::<AutoExposure>()?;
    registry.register::<LensDistortion>()?;
    registry.register::<ChromaticAberration>()?;
    registry.register::<Bloom>()?;
    registry.register::<Vignette>()?;
    registry.register::<Grain>()?;
    registry.register::<ColorGrading>()?;
    Ok(())
}
