//! Settings volume blending hook
//!
//! The host's volume system writes blended values into the registered
//! settings once per displayed frame, before any effect renders.

use crate::core::view::View;
use crate::effect::registry::BundleRegistry;

pub trait VolumeBlender {
    fn update(&mut self, view: &View, registry: &mut BundleRegistry);
}

/// Settings stay exactly as registered
#[derive(Debug, Default)]
pub struct NoVolumes;

impl VolumeBlender for NoVolumes {
    fn update(&mut self, _view: &View, _registry: &mut BundleRegistry) {}
}

impl<F> VolumeBlender for F
where
    F: FnMut(&View, &mut BundleRegistry),
{
    fn update(&mut self, view: &View, registry: &mut BundleRegistry) {
        self(view, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::tests::{Tint, TintSettings};

    #[test]
    fn test_closure_blender_writes_settings() {
        let mut registry = BundleRegistry::new();
        registry.register::<Tint>().unwrap();

        let mut blender = |_: &View, registry: &mut BundleRegistry| {
            if let Ok(tint) = registry.settings_mut::<TintSettings>() {
                tint.enabled = true;
                tint.strength = 0.25;
            }
        };
        blender.update(&View::default(), &mut registry);

        let tint = registry.settings::<TintSettings>().unwrap();
        assert!(tint.enabled);
        assert_eq!(tint.strength, 0.25);
    }
}
