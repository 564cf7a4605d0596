//! Instance display objects.
//!
//! An [`InstanceGeometry`] pairs the base geometry of an instanced subset with
//! two [`InstanceDisplay`] objects: one drawing every instance, one drawing
//! only the selected instances with the highlight material. Display objects
//! are never re-initialized in place; recreating instance data always goes
//! through [`InstanceGeometry::rebuild`], which swaps in a fresh object.

use bytemuck::{Pod, Zeroable};
use glam::{Affine3A, Mat4, Vec3};
use wgpu::BufferUsages;

use crate::instancing::generator::InstanceData;
use crate::resources::buffer::BufferRef;
use crate::resources::geometry::{DrawGeometry, DrawItem, RenderVisibility};
use crate::resources::material::{Material, MaterialRef};

/// Per-instance GPU record.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
}

impl From<&Affine3A> for InstanceRaw {
    fn from(transform: &Affine3A) -> Self {
        Self {
            model: Mat4::from(*transform).to_cols_array_2d(),
        }
    }
}

pub type InstanceBuffer = BufferRef<InstanceRaw>;

const INSTANCE_USAGE: BufferUsages = BufferUsages::VERTEX.union(BufferUsages::COPY_DST);

#[derive(Debug)]
pub struct InstanceDisplay {
    generation: u64,
    buffer: Option<InstanceBuffer>,
    instance_count: usize,
}

impl InstanceDisplay {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            buffer: None,
            instance_count: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    pub fn buffer(&self) -> Option<&InstanceBuffer> {
        self.buffer.as_ref()
    }

    pub(crate) fn create_data(&mut self, data: &InstanceData) {
        let raw: Vec<InstanceRaw> = data.transforms.iter().map(InstanceRaw::from).collect();
        self.instance_count = raw.len();
        self.buffer = Some(InstanceBuffer::new(raw, INSTANCE_USAGE, Some("instances")));
    }

    pub(crate) fn update_data(&mut self, data: &InstanceData) {
        let raw: Vec<InstanceRaw> = data.transforms.iter().map(InstanceRaw::from).collect();
        match &self.buffer {
            Some(buffer) if buffer.len() == raw.len() => {
                if let Err(e) = buffer.write_all(&raw) {
                    log::warn!("Instance update skipped: {e}");
                }
            }
            _ => {
                // Count changed without a recreate request.
                log::debug!("Instance count changed on update, reallocating");
                self.instance_count = raw.len();
                self.buffer = Some(InstanceBuffer::new(raw, INSTANCE_USAGE, Some("instances")));
            }
        }
    }

    /// Builds the draw items for this display. Nothing is produced without instances.
    pub(crate) fn generate_items(
        &self,
        base: &DrawGeometry,
        material: Option<&MaterialRef>,
        wireframe: bool,
        selection_highlight: bool,
    ) -> Vec<DrawItem> {
        let Some(buffer) = &self.buffer else {
            return Vec::new();
        };
        if self.instance_count == 0 || !base.is_drawable() {
            return Vec::new();
        }

        let visibility = if wireframe { RenderVisibility::Wireframe } else { RenderVisibility::Shaded };
        let mut item = DrawItem::new(base.clone(), material.cloned(), visibility)
            .with_selection_highlight(selection_highlight);
        item.instances = Some(buffer.clone());
        item.instance_count = self.instance_count;
        vec![item]
    }
}

/// Instanced draw geometry of one subset (or of a primitive's wireframe).
#[derive(Debug)]
pub struct InstanceGeometry {
    base: DrawGeometry,
    display: InstanceDisplay,
    selection_display: InstanceDisplay,
    next_generation: u64,
}

impl InstanceGeometry {
    pub fn new(base: DrawGeometry) -> Self {
        Self {
            base,
            display: InstanceDisplay::new(0),
            selection_display: InstanceDisplay::new(1),
            next_generation: 2,
        }
    }

    pub fn base(&self) -> &DrawGeometry {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut DrawGeometry {
        &mut self.base
    }

    pub fn display(&self) -> &InstanceDisplay {
        &self.display
    }

    pub fn selection_display(&self) -> &InstanceDisplay {
        &self.selection_display
    }

    pub(crate) fn display_mut(&mut self, selection: bool) -> &mut InstanceDisplay {
        if selection { &mut self.selection_display } else { &mut self.display }
    }

    /// Replaces the display object with a brand new one.
    ///
    /// Creating instance data twice on the same display object corrupts it,
    /// so every recreate starts from a fresh object.
    pub fn rebuild(&mut self, selection: bool) {
        let generation = self.next_generation;
        self.next_generation += 1;
        *self.display_mut(selection) = InstanceDisplay::new(generation);
    }
}

/// Highlight materials for selected instances.
#[derive(Debug, Clone)]
pub struct SelectionMaterials {
    pub shaded: MaterialRef,
    pub wire: MaterialRef,
}

impl SelectionMaterials {
    pub fn new(color: Vec3) -> Self {
        Self {
            shaded: MaterialRef::new(Material::new("SelectionShadedInstanced", color, color, true)),
            wire: MaterialRef::new(Material::new("SelectionWireInstanced", color, color, true)),
        }
    }

    pub fn get(&self, wireframe: bool) -> &MaterialRef {
        if wireframe { &self.wire } else { &self.shaded }
    }
}

impl Default for SelectionMaterials {
    fn default() -> Self {
        Self::new(Vec3::new(1.0, 1.0, 1.0))
    }
}
