//! Effect traits and bundles
//!
//! An effect is a settings type plus a renderer. Renderers are written against
//! their concrete settings ([`Effect`]) and stored type-erased
//! ([`EffectRenderer`]) inside an [`EffectBundle`].

pub mod registry;
pub mod volume;

use std::any::{Any, TypeId};
use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::render::caps::GpuCaps;
use crate::render::command::CommandSequence;
use crate::render::context::RenderContext;

pub use registry::BundleRegistry;
pub use volume::{NoVolumes, VolumeBlender};

/// Where a user effect is inserted in the frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InjectionPoint {
    /// Opaque-only stage, before transparent geometry is drawn
    BeforeTransparent,
    /// After the NaN scrub, on the render-resolution image
    BeforeUpscaling,
    /// After anti-aliasing, before the builtin stack
    BeforeStack,
    /// After the builtin stack, before the final pass
    AfterStack,
}

impl InjectionPoint {
    pub const ALL: [Self; 4] = [Self::BeforeTransparent, Self::BeforeUpscaling, Self::BeforeStack, Self::AfterStack];

    pub fn name(self) -> &'static str {
        match self {
            Self::BeforeTransparent => "BeforeTransparent",
            Self::BeforeUpscaling => "BeforeUpscaling",
            Self::BeforeStack => "BeforeStack",
            Self::AfterStack => "AfterStack",
        }
    }
}

/// Camera inputs an effect needs the host to produce
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DepthFlags {
    pub depth: bool,
    pub normals: bool,
    pub motion_vectors: bool,
}

impl DepthFlags {
    pub const NONE: Self = Self { depth: false, normals: false, motion_vectors: false };
    pub const DEPTH: Self = Self { depth: true, normals: false, motion_vectors: false };
    pub const DEPTH_NORMALS: Self = Self { depth: true, normals: true, motion_vectors: false };
    pub const MOTION_VECTORS: Self = Self { depth: true, normals: false, motion_vectors: true };

    pub fn is_empty(self) -> bool {
        self == Self::NONE
    }
}

impl BitOr for DepthFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            depth: self.depth || rhs.depth,
            normals: self.normals || rhs.normals,
            motion_vectors: self.motion_vectors || rhs.motion_vectors,
        }
    }
}

/// Static description of an effect
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectAttributes {
    /// Unique display name; also the key stored in persisted bucket orders
    pub name: &'static str,
    /// `None` for builtins, which run at fixed slots
    pub injection: Option<InjectionPoint>,
    pub allow_in_scene_view: bool,
}

impl EffectAttributes {
    pub const fn builtin(name: &'static str) -> Self {
        Self { name, injection: None, allow_in_scene_view: true }
    }

    pub const fn user(name: &'static str, injection: InjectionPoint) -> Self {
        Self { name, injection: Some(injection), allow_in_scene_view: true }
    }

    pub const fn hidden_in_scene_view(mut self) -> Self {
        self.allow_in_scene_view = false;
        self
    }
}

/// Object-safe access to `Any` for settings
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// User-tunable parameters of one effect, blended by volumes
pub trait EffectSettings: AsAny + fmt::Debug {
    fn enabled(&self) -> bool;
}

/// Effect written against its own settings type
pub trait Effect: 'static {
    type Settings: EffectSettings + Default;

    const ATTRIBUTES: EffectAttributes;

    /// Record the effect, reading `ctx.source()` and writing `ctx.destination()`
    fn render(&mut self, ctx: &mut RenderContext, settings: &Self::Settings);

    fn is_supported(&self, _caps: &GpuCaps) -> bool {
        true
    }

    fn depth_flags(&self, _settings: &Self::Settings) -> DepthFlags {
        DepthFlags::NONE
    }

    /// Drop temporal state (camera cut)
    fn reset_history(&mut self) {}

    /// Free persistent surfaces; called on teardown
    fn release(&mut self, _cmd: &mut CommandSequence) {}
}

/// Type-erased renderer stored in a bundle
pub trait EffectRenderer {
    fn render(&mut self, ctx: &mut RenderContext, settings: &dyn EffectSettings);
    fn is_supported(&self, caps: &GpuCaps) -> bool;
    fn depth_flags(&self, settings: &dyn EffectSettings) -> DepthFlags;
    fn reset_history(&mut self);
    fn release(&mut self, cmd: &mut CommandSequence);
    /// The concrete effect
    fn effect(&self) -> &dyn Any;
}

struct TypedRenderer<E: Effect>(E);

impl<E: Effect> EffectRenderer for TypedRenderer<E> {
    fn render(&mut self, ctx: &mut RenderContext, settings: &dyn EffectSettings) {
        match settings.as_any().downcast_ref::<E::Settings>() {
            Some(settings) => self.0.render(ctx, settings),
            None => log::error!("{}: settings type mismatch, effect skipped", E::ATTRIBUTES.name),
        }
    }

    fn is_supported(&self, caps: &GpuCaps) -> bool {
        self.0.is_supported(caps)
    }

    fn depth_flags(&self, settings: &dyn EffectSettings) -> DepthFlags {
        settings
            .as_any()
            .downcast_ref::<E::Settings>()
            .map_or(DepthFlags::NONE, |s| self.0.depth_flags(s))
    }

    fn reset_history(&mut self) {
        self.0.reset_history();
    }

    fn release(&mut self, cmd: &mut CommandSequence) {
        self.0.release(cmd);
    }

    fn effect(&self) -> &dyn Any {
        &self.0
    }
}

/// Settings and renderer for one registered effect type
pub struct EffectBundle {
    attributes: EffectAttributes,
    settings_type: TypeId,
    settings: Box<dyn EffectSettings>,
    renderer: Box<dyn EffectRenderer>,
}

impl EffectBundle {
    /// Pair an effect renderer with its settings
    ///
    /// # Arguments
    /// * `effect` - Renderer instance; owns any persistent surfaces it allocates
    /// * `settings` - Initial settings, later written by the volume blender
    pub fn new<E: Effect>(effect: E, settings: E::Settings) -> Self {
        Self {
            attributes: E::ATTRIBUTES,
            settings_type: TypeId::of::<E::Settings>(),
            settings: Box::new(settings),
            renderer: Box::new(TypedRenderer(effect)),
        }
    }

    pub fn attributes(&self) -> &EffectAttributes {
        &self.attributes
    }

    /// Display name, unique within a registry
    pub fn name(&self) -> &'static str {
        self.attributes.name
    }

    /// Registry key
    pub fn settings_type(&self) -> TypeId {
        self.settings_type
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled()
    }

    /// Typed settings; `None` if `S` is not this bundle's settings type
    pub fn settings<S: EffectSettings>(&self) -> Option<&S> {
        (*self.settings).as_any().downcast_ref()
    }

    pub fn settings_mut<S: EffectSettings>(&mut self) -> Option<&mut S> {
        (*self.settings).as_any_mut().downcast_mut()
    }

    /// Concrete renderer, for inspection
    pub fn renderer<E: Effect>(&self) -> Option<&E> {
        self.renderer.effect().downcast_ref()
    }

    pub fn is_supported(&self, caps: &GpuCaps) -> bool {
        self.renderer.is_supported(caps)
    }

    pub fn depth_flags(&self) -> DepthFlags {
        self.renderer.depth_flags(self.settings.as_ref())
    }

    /// Record the effect's commands with the current settings
    pub fn render(&mut self, ctx: &mut RenderContext) {
        self.renderer.render(ctx, self.settings.as_ref());
    }

    pub fn reset_history(&mut self) {
        self.renderer.reset_history();
    }

    /// Free the renderer's persistent surfaces
    pub fn release(&mut self, cmd: &mut CommandSequence) {
        self.renderer.release(cmd);
    }
}

impl fmt::Debug for EffectBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectBundle")
            .field("attributes", &self.attributes)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::render::command::CameraSurface;

    #[derive(Debug, Default)]
    pub(crate) struct TintSettings {
        pub enabled: bool,
        pub strength: f32,
    }

    impl EffectSettings for TintSettings {
        fn enabled(&self) -> bool {
            self.enabled
        }
    }

    /// Minimal user effect: one blit from source to destination
    #[derive(Default)]
    pub(crate) struct Tint {
        pub renders: u32,
        pub released: bool,
    }

    impl Effect for Tint {
        type Settings = TintSettings;
        const ATTRIBUTES: EffectAttributes = EffectAttributes::user("Tint", InjectionPoint::BeforeStack);

        fn render(&mut self, ctx: &mut RenderContext, settings: &TintSettings) {
            let sheet = ctx.sheets.get("tint");
            sheet.set_float("_Strength", settings.strength);
            sheet.flush(&mut ctx.command);
            let (source, destination) = (ctx.source(), ctx.destination());
            ctx.command.blit(source, destination, "tint", 0);
            self.renders += 1;
        }

        fn depth_flags(&self, _settings: &TintSettings) -> DepthFlags {
            DepthFlags::DEPTH
        }

        fn release(&mut self, _cmd: &mut CommandSequence) {
            self.released = true;
        }
    }

    #[test]
    fn test_depth_flags_union() {
        let flags = DepthFlags::DEPTH | DepthFlags::MOTION_VECTORS | DepthFlags::NONE;
        assert_eq!(flags, DepthFlags { depth: true, normals: false, motion_vectors: true });
        assert!(DepthFlags::NONE.is_empty());
    }

    #[test]
    fn test_bundle_downcasts() {
        let mut bundle = EffectBundle::new(Tint::default(), TintSettings { enabled: true, strength: 0.5 });
        assert_eq!(bundle.name(), "Tint");
        assert!(bundle.is_enabled());
        assert_eq!(bundle.settings::<TintSettings>().map(|s| s.strength), Some(0.5));
        assert!(bundle.settings::<crate::effect::tests::Other>().is_none());

        if let Some(s) = bundle.settings_mut::<TintSettings>() {
            s.enabled = false;
        }
        assert!(!bundle.is_enabled());
        assert_eq!(bundle.depth_flags(), DepthFlags::DEPTH);
    }

    #[test]
    fn test_bundle_render_reaches_effect() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        let mut bundle = EffectBundle::new(Tint::default(), TintSettings { enabled: true, strength: 1.0 });
        ctx.set_destination(CameraSurface::OpaqueCopy.into());
        bundle.render(&mut ctx);
        assert_eq!(bundle.renderer::<Tint>().map(|t| t.renders), Some(1));
        assert_eq!(ctx.command.blit_shaders(), vec!["tint"]);
    }

    #[derive(Debug, Default)]
    pub(crate) struct Other;

    impl EffectSettings for Other {
        fn enabled(&self) -> bool {
            true
        }
    }
}
