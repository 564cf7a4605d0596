//! Viewport materials.
//!
//! The batching layer only needs enough of a material to group geometry by
//! it and to hand it to the draw submitter: an identity, a diffuse and an
//! ambient colour. Material-network conversion happens upstream.
//!
//! [`ColorMaterialCache`] replaces a process-wide cache of flat-colour
//! materials. It is owned by the renderer and shared with its collaborators
//! through an `Arc`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Quantization step of the colour cache key.
pub const COLOR_PRECISION: f32 = 0.0001;

#[derive(Debug)]
pub struct Material {
    id: u64,
    pub name: String,
    pub diffuse: Vec3,
    pub ambient: Vec3,
    /// Built for instanced draws.
    pub instanced: bool,
}

impl Material {
    pub fn new(name: impl Into<String>, diffuse: Vec3, ambient: Vec3, instanced: bool) -> Self {
        Self {
            id: NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            diffuse,
            ambient,
            instanced,
        }
    }

    /// Flat material used to display a primitive's display colour.
    pub fn from_display_color(color: Vec3, instanced: bool) -> Self {
        Self::new(
            format!("DisplayColor({:.4}, {:.4}, {:.4})", color.x, color.y, color.z),
            color * 0.8,
            color * 0.2,
            instanced,
        )
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Shared handle to a [`Material`]. Compares by material ID.
#[derive(Clone)]
pub struct MaterialRef(Arc<Material>);

impl MaterialRef {
    pub fn new(material: Material) -> Self {
        Self(Arc::new(material))
    }
}

impl From<Material> for MaterialRef {
    fn from(material: Material) -> Self {
        Self::new(material)
    }
}

impl PartialEq for MaterialRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for MaterialRef {}

impl std::hash::Hash for MaterialRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for MaterialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MaterialRef({}#{})", self.0.name, self.0.id)
    }
}

impl std::ops::Deref for MaterialRef {
    type Target = Material;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Preview-surface materials bound to a subset, one per draw flavour.
#[derive(Debug, Clone, Default)]
pub struct MaterialData {
    pub shaded: Option<MaterialRef>,
    pub instanced: Option<MaterialRef>,
}

impl MaterialData {
    pub fn material(&self, instanced: bool) -> Option<&MaterialRef> {
        if instanced { self.instanced.as_ref() } else { self.shaded.as_ref() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ColorKey([i32; 3]);

impl ColorKey {
    fn new(color: Vec3) -> Self {
        let q = |c: f32| (c / COLOR_PRECISION).round() as i32;
        Self([q(color.x), q(color.y), q(color.z)])
    }
}

/// Flat-colour materials keyed by quantized RGB.
///
/// Simple and instanced geometry need distinct materials, so they are cached
/// separately.
#[derive(Default)]
pub struct ColorMaterialCache {
    simple: Mutex<FxHashMap<ColorKey, MaterialRef>>,
    instanced: Mutex<FxHashMap<ColorKey, MaterialRef>>,
}

impl ColorMaterialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the material for `color`, creating it on first use.
    pub fn get(&self, color: Vec3, instanced: bool) -> MaterialRef {
        let map = if instanced { &self.instanced } else { &self.simple };
        map.lock()
            .entry(ColorKey::new(color))
            .or_insert_with(|| MaterialRef::new(Material::from_display_color(color, instanced)))
            .clone()
    }

    pub fn len(&self, instanced: bool) -> usize {
        if instanced { self.instanced.lock().len() } else { self.simple.lock().len() }
    }

    pub fn clear(&self) {
        self.simple.lock().clear();
        self.instanced.lock().clear();
    }
}

impl fmt::Debug for ColorMaterialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorMaterialCache")
            .field("simple", &self.len(false))
            .field("instanced", &self.len(true))
            .finish()
    }
}

/// How subsets pick their viewport material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisplayMode {
    /// Flat material from the primitive's display colour.
    #[default]
    DisplayColor,
    /// Bound preview-surface material, falling back to display colour.
    PreviewSurface,
    /// Flat material from the wire colour.
    WireColor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisplaySettings {
    pub mode: DisplayMode,
    pub wire_color: Vec3,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            mode: DisplayMode::DisplayColor,
            wire_color: Vec3::splat(0.5),
        }
    }
}

impl DisplaySettings {
    pub fn wire_color_material(&self, materials: &ColorMaterialCache, instanced: bool) -> MaterialRef {
        materials.get(self.wire_color, instanced)
    }
}
