//! Per-shader material state, cached for the lifetime of the pipeline

use std::collections::HashMap;

use crate::render::command::{Command, CommandSequence, SurfaceRef};

/// Keywords and parameters for one shader
#[derive(Clone, Debug, Default)]
pub struct PropertySheet {
    shader: &'static str,
    keywords: Vec<&'static str>,
    floats: Vec<(&'static str, [f32; 4])>,
    textures: Vec<(&'static str, SurfaceRef)>,
}

impl PropertySheet {
    pub fn new(shader: &'static str) -> Self {
        Self { shader, ..Default::default() }
    }

    pub fn shader(&self) -> &'static str {
        self.shader
    }

    pub fn enable_keyword(&mut self, keyword: &'static str) {
        if !self.keywords.contains(&keyword) {
            self.keywords.push(keyword);
        }
    }

    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.contains(&keyword)
    }

    pub fn keywords(&self) -> &[&'static str] {
        &self.keywords
    }

    pub fn set_float(&mut self, name: &'static str, value: f32) {
        self.set_vector(name, [value, 0.0, 0.0, 0.0]);
    }

    pub fn set_vector(&mut self, name: &'static str, value: [f32; 4]) {
        match self.floats.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.floats.push((name, value)),
        }
    }

    pub fn vector(&self, name: &str) -> Option<[f32; 4]> {
        self.floats.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn set_texture(&mut self, name: &'static str, surface: SurfaceRef) {
        match self.textures.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = surface,
            None => self.textures.push((name, surface)),
        }
    }

    pub fn texture(&self, name: &str) -> Option<SurfaceRef> {
        self.textures.iter().find(|(n, _)| *n == name).map(|(_, s)| *s)
    }

    /// Forget all state; the shader binding is kept
    pub fn clear(&mut self) {
        self.keywords.clear();
        self.floats.clear();
        self.textures.clear();
    }

    /// Record the current state ahead of a blit with this shader
    pub fn flush(&self, cmd: &mut CommandSequence) {
        cmd.push(Command::SetProperties {
            shader: self.shader,
            keywords: self.keywords.clone(),
            floats: self.floats.clone(),
            textures: self.textures.clone(),
        });
    }
}

/// Lazily created sheets keyed by shader name
#[derive(Debug, Default)]
pub struct PropertySheetCache {
    sheets: HashMap<&'static str, PropertySheet>,
}

impl PropertySheetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, shader: &'static str) -> &mut PropertySheet {
        self.sheets.entry(shader).or_insert_with(|| PropertySheet::new(shader))
    }

    pub fn peek(&self, shader: &str) -> Option<&PropertySheet> {
        self.sheets.get(shader)
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn release(&mut self) {
        self.sheets.clear();
    }
}
