//! Effect bundle registry
//!
//! Bundles are created when an effect type is registered and live until it is
//! unregistered. User effects are additionally ordered per injection point;
//! that order is persisted as names and reconciled with what is registered.

use std::any::TypeId;
use std::collections::HashMap;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::effect::{DepthFlags, Effect, EffectBundle, EffectSettings, InjectionPoint};
use crate::render::command::CommandSequence;
use crate::render::context::RenderContext;

#[derive(Debug, Default)]
pub struct BundleRegistry {
    /// Registration order
    bundles: Vec<EffectBundle>,
    buckets: HashMap<InjectionPoint, Vec<String>>,
    /// Replaced bundles whose surfaces are freed before the next frame records
    retired: Vec<EffectBundle>,
}

impl BundleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an effect with default settings
    pub fn register<E: Effect + Default>(&mut self) -> Result<()> {
        self.register_with(E::default(), E::Settings::default())
    }

    /// Register an effect instance
    ///
    /// An earlier registration of the same settings type is replaced; its
    /// renderer is retired and releases its surfaces via `release_retired`.
    ///
    /// # Errors
    /// `DuplicateEffectName` if another settings type already uses the name.
    pub fn register_with<E: Effect>(&mut self, effect: E, settings: E::Settings) -> Result<()> {
        let bundle = EffectBundle::new(effect, settings);
        if self
            .bundles
            .iter()
            .any(|b| b.name() == bundle.name() && b.settings_type() != bundle.settings_type())
        {
            log::warn!("effect name '{}' already taken, registration rejected", bundle.name());
            return Err(Error::DuplicateEffectName(bundle.name()));
        }

        match self.bundles.iter().position(|b| b.settings_type() == bundle.settings_type()) {
            Some(i) => {
                log::warn!("{} registered twice, replacing", bundle.name());
                let old = std::mem::replace(&mut self.bundles[i], bundle);
                self.retired.push(old);
            }
            None => {
                log::debug!("registered effect {}", bundle.name());
                self.bundles.push(bundle);
            }
        }
        Ok(())
    }

    /// Free the surfaces of bundles replaced by re-registration
    pub fn release_retired(&mut self, cmd: &mut CommandSequence) -> usize {
        let count = self.retired.len();
        for mut bundle in self.retired.drain(..) {
            bundle.release(cmd);
            log::debug!("released replaced {}", bundle.name());
        }
        count
    }

    /// Bundles waiting for `release_retired`
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Remove an effect, releasing its persistent surfaces
    pub fn unregister<S: EffectSettings>(&mut self, cmd: &mut CommandSequence) -> bool {
        let id = TypeId::of::<S>();
        match self.bundles.iter().position(|b| b.settings_type() == id) {
            Some(i) => {
                let mut bundle = self.bundles.remove(i);
                bundle.release(cmd);
                log::debug!("unregistered effect {}", bundle.name());
                true
            }
            None => false,
        }
    }

    /// Bundle registered for settings type `S`
    pub fn get<S: EffectSettings>(&self) -> Result<&EffectBundle> {
        let id = TypeId::of::<S>();
        self.bundles
            .iter()
            .find(|b| b.settings_type() == id)
            .ok_or(Error::UnknownEffectType(std::any::type_name::<S>()))
    }

    /// Mutable bundle registered for settings type `S`
    pub fn get_mut<S: EffectSettings>(&mut self) -> Result<&mut EffectBundle> {
        let id = TypeId::of::<S>();
        self.bundles
            .iter_mut()
            .find(|b| b.settings_type() == id)
            .ok_or(Error::UnknownEffectType(std::any::type_name::<S>()))
    }

    /// Typed settings of a registered effect
    pub fn settings<S: EffectSettings>(&self) -> Result<&S> {
        self.get::<S>()?
            .settings::<S>()
            .ok_or(Error::UnknownEffectType(std::any::type_name::<S>()))
    }

    pub fn settings_mut<S: EffectSettings>(&mut self) -> Result<&mut S> {
        self.get_mut::<S>()?
            .settings_mut::<S>()
            .ok_or(Error::UnknownEffectType(std::any::type_name::<S>()))
    }

    /// Look up a bundle by display name
    ///
    /// # Arguments
    /// * `name` - The `EffectAttributes::name`, as stored in bucket orders
    pub fn by_name(&self, name: &str) -> Option<&EffectBundle> {
        self.bundles.iter().find(|b| b.name() == name)
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut EffectBundle> {
        self.bundles.iter_mut().find(|b| b.name() == name)
    }

    /// Every bundle in registration order
    pub fn bundles(&self) -> impl Iterator<Item = &EffectBundle> {
        self.bundles.iter()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Enabled, supported by the GPU, and allowed in this kind of view
    pub fn is_active(bundle: &EffectBundle, ctx: &RenderContext) -> bool {
        bundle.is_enabled()
            && bundle.is_supported(ctx.caps())
            && (!ctx.is_scene_view() || bundle.attributes().allow_in_scene_view)
    }

    /// Active state of a registered type; unregistered types are inactive
    pub fn is_type_active<S: EffectSettings>(&self, ctx: &RenderContext) -> bool {
        self.get::<S>().is_ok_and(|b| Self::is_active(b, ctx))
    }

    /// Replace the persisted order of a bucket (loaded from config)
    pub fn set_bucket_order(&mut self, point: InjectionPoint, names: Vec<String>) {
        self.buckets.insert(point, names);
    }

    /// Current order of a bucket, by effect name
    pub fn bucket_order(&self, point: InjectionPoint) -> &[String] {
        self.buckets.get(&point).map(Vec::as_slice).unwrap_or_default()
    }

    /// Reconcile the persisted order with registered user effects
    ///
    /// Names no longer registered are dropped, newly registered effects are
    /// appended in registration order, and the rest keep their relative order.
    /// Returns true if the stored order changed.
    pub fn sort_bucket(&mut self, point: InjectionPoint) -> bool {
        let registered: Vec<&'static str> = self
            .bundles
            .iter()
            .filter(|b| b.attributes().injection == Some(point))
            .map(|b| b.name())
            .collect();

        let order = self.buckets.entry(point).or_default();
        let mut sorted: Vec<String> = Vec::with_capacity(registered.len());
        for name in order.iter() {
            if registered.iter().any(|r| r == name) && !sorted.contains(name) {
                sorted.push(name.clone());
            }
        }
        for name in &registered {
            if !sorted.iter().any(|s| s == name) {
                sorted.push((*name).to_string());
            }
        }

        let changed = *order != sorted;
        if changed {
            log::debug!("{} order now {:?}", point.name(), sorted);
            *order = sorted;
        }
        changed
    }

    /// Sort every bucket; returns true if any changed
    pub fn sort_all(&mut self) -> bool {
        InjectionPoint::ALL.iter().fold(false, |changed, &p| self.sort_bucket(p) | changed)
    }

    /// Names of the active effects in a bucket, in persisted order
    pub fn active_in(&self, point: InjectionPoint, ctx: &RenderContext) -> Vec<&'static str> {
        self.bucket_order(point)
            .iter()
            .filter_map(|name| self.by_name(name))
            .filter(|b| b.attributes().injection == Some(point) && Self::is_active(b, ctx))
            .map(|b| b.name())
            .collect()
    }

    /// Union of the camera inputs all active effects need
    pub fn required_depth_flags(&self, ctx: &RenderContext) -> DepthFlags {
        self.bundles
            .iter()
            .filter(|b| Self::is_active(b, ctx))
            .fold(DepthFlags::NONE, |flags, b| flags | b.depth_flags())
    }

    /// Discard temporal state in every renderer
    pub fn reset_history(&mut self) {
        for bundle in &mut self.bundles {
            bundle.reset_history();
        }
    }

    /// Release every renderer's persistent surfaces; bundles stay registered
    pub fn release_all(&mut self, cmd: &mut CommandSequence) {
        self.release_retired(cmd);
        for bundle in &mut self.bundles {
            bundle.release(cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::{Eye, View};
    use crate::effect::tests::{Tint, TintSettings};
    use crate::effect::{EffectAttributes, EffectSettings};
    use crate::render::caps::GpuCaps;

    #[derive(Debug, Default)]
    struct OutlineSettings;

    impl EffectSettings for OutlineSettings {
        fn enabled(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct Outline;

    impl Effect for Outline {
        type Settings = OutlineSettings;
        const ATTRIBUTES: EffectAttributes =
            EffectAttributes::user("Outline", InjectionPoint::BeforeStack).hidden_in_scene_view();

        fn render(&mut self, _ctx: &mut RenderContext, _settings: &OutlineSettings) {}

        fn depth_flags(&self, _settings: &OutlineSettings) -> DepthFlags {
            DepthFlags::DEPTH_NORMALS
        }
    }

    fn context(scene_view: bool) -> RenderContext {
        let mut view = View::new(640, 480, 60.0);
        view.is_scene_view = scene_view;
        let mut ctx = RenderContext::new(GpuCaps::default());
        ctx.begin_eye(&view, Eye::Left, 0);
        ctx
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let registry = BundleRegistry::new();
        match registry.get::<TintSettings>() {
            Err(Error::UnknownEffectType(name)) => assert!(name.contains("TintSettings")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_sort_appends_and_drops() {
        let mut registry = BundleRegistry::new();
        registry.register::<Tint>().unwrap();
        registry.register::<Outline>().unwrap();
        registry.set_bucket_order(
            InjectionPoint::BeforeStack,
            vec!["Outline".into(), "Removed".into(), "Outline".into()],
        );

        assert!(registry.sort_bucket(InjectionPoint::BeforeStack));
        assert_eq!(registry.bucket_order(InjectionPoint::BeforeStack), &["Outline", "Tint"]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut registry = BundleRegistry::new();
        registry.register::<Tint>().unwrap();
        registry.register::<Outline>().unwrap();
        assert!(registry.sort_all());
        let first = registry.bucket_order(InjectionPoint::BeforeStack).to_vec();
        assert!(!registry.sort_all());
        assert_eq!(registry.bucket_order(InjectionPoint::BeforeStack), first.as_slice());
        assert!(registry.bucket_order(InjectionPoint::AfterStack).is_empty());
    }

    #[test]
    fn test_active_in_respects_enable_and_scene_view() {
        let mut registry = BundleRegistry::new();
        registry.register_with(Tint::default(), TintSettings { enabled: true, strength: 1.0 }).unwrap();
        registry.register::<Outline>().unwrap();
        registry.sort_all();

        assert_eq!(registry.active_in(InjectionPoint::BeforeStack, &context(false)), vec!["Tint", "Outline"]);
        assert_eq!(registry.active_in(InjectionPoint::BeforeStack, &context(true)), vec!["Tint"]);

        registry.settings_mut::<TintSettings>().unwrap().enabled = false;
        assert_eq!(registry.active_in(InjectionPoint::BeforeStack, &context(false)), vec!["Outline"]);
    }

    #[test]
    fn test_depth_flag_union() {
        let mut registry = BundleRegistry::new();
        registry.register_with(Tint::default(), TintSettings { enabled: true, strength: 1.0 }).unwrap();
        registry.register::<Outline>().unwrap();
        assert_eq!(registry.required_depth_flags(&context(false)), DepthFlags::DEPTH_NORMALS);
        assert_eq!(registry.required_depth_flags(&context(true)), DepthFlags::DEPTH);
    }

    #[test]
    fn test_unregister_releases() {
        let mut registry = BundleRegistry::new();
        registry.register::<Tint>().unwrap();
        let mut cmd = CommandSequence::new();
        assert!(registry.unregister::<TintSettings>(&mut cmd));
        assert!(!registry.unregister::<TintSettings>(&mut cmd));
        assert!(registry.is_empty());
        assert!(registry.get::<TintSettings>().is_err());
    }

    #[derive(Debug, Default)]
    struct ImpostorSettings;

    impl EffectSettings for ImpostorSettings {
        fn enabled(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct Impostor;

    impl Effect for Impostor {
        type Settings = ImpostorSettings;
        const ATTRIBUTES: EffectAttributes = EffectAttributes::user("Tint", InjectionPoint::AfterStack);

        fn render(&mut self, _ctx: &mut RenderContext, _settings: &ImpostorSettings) {}
    }

    #[test]
    fn test_name_clash_from_other_type_is_rejected() {
        let mut registry = BundleRegistry::new();
        registry.register::<Tint>().unwrap();
        assert!(matches!(registry.register::<Impostor>(), Err(Error::DuplicateEffectName("Tint"))));

        assert_eq!(registry.len(), 1);
        assert!(registry.get::<ImpostorSettings>().is_err());
        assert_eq!(
            registry.by_name("Tint").map(|b| b.settings_type()),
            Some(TypeId::of::<TintSettings>())
        );
    }

    #[test]
    fn test_reregistration_retires_old_renderer() {
        let mut registry = BundleRegistry::new();
        registry.register::<Tint>().unwrap();
        registry.register_with(Tint::default(), TintSettings { enabled: true, strength: 2.0 }).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.retired_count(), 1);
        assert_eq!(registry.settings::<TintSettings>().map(|s| s.strength).ok(), Some(2.0));

        let mut cmd = CommandSequence::new();
        registry.release_all(&mut cmd);
        assert_eq!(registry.retired_count(), 0);
        assert_eq!(registry.release_retired(&mut cmd), 0);
    }
}
