use std::sync::Arc;

use crate::instancing::InstanceGeometry;
use crate::render_data::path::PrimPath;
use crate::resources::change_tracker::DirtyBits;
use crate::resources::geometry::DrawGeometry;
use crate::resources::material::MaterialData;

/// Draw geometry of a subset: drawn once, or through instancing.
#[derive(Debug)]
pub enum SubsetGeometry {
    Simple(DrawGeometry),
    Instanced(InstanceGeometry),
}

impl SubsetGeometry {
    pub fn new(geometry: DrawGeometry, instanced: bool) -> Self {
        if instanced {
            Self::Instanced(InstanceGeometry::new(geometry))
        } else {
            Self::Simple(geometry)
        }
    }

    pub fn is_instanced(&self) -> bool {
        matches!(self, Self::Instanced(_))
    }

    /// The geometry the vertex and index buffers are bound to.
    pub fn draw_geometry(&self) -> &DrawGeometry {
        match self {
            Self::Simple(geometry) => geometry,
            Self::Instanced(instanced) => instanced.base(),
        }
    }

    pub fn draw_geometry_mut(&mut self) -> &mut DrawGeometry {
        match self {
            Self::Simple(geometry) => geometry,
            Self::Instanced(instanced) => instanced.base_mut(),
        }
    }
}

/// The part of a primitive bound to one material.
///
/// Subsets of a primitive share its vertex arrays and differ in index lists
/// and material.
#[derive(Debug)]
pub struct SubsetRenderData {
    pub material_id: PrimPath,
    pub material_data: Option<MaterialData>,
    pub indices: Arc<Vec<[u32; 3]>>,
    pub wire_indices: Arc<Vec<u32>>,
    pub dirty_bits: DirtyBits,
    /// Currently drawn as part of a merged batch.
    pub in_consolidation: bool,
    pub geometry: SubsetGeometry,
}

impl SubsetRenderData {
    /// A new subset starts fully dirty.
    pub fn new(
        material_id: PrimPath,
        indices: Vec<[u32; 3]>,
        wire_indices: Vec<u32>,
        geometry: SubsetGeometry,
    ) -> Self {
        Self {
            material_id,
            material_data: None,
            indices: Arc::new(indices),
            wire_indices: Arc::new(wire_indices),
            dirty_bits: DirtyBits::ALL_DIRTY,
            in_consolidation: false,
            geometry,
        }
    }

    pub fn is_instanced(&self) -> bool {
        self.geometry.is_instanced()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    pub fn has_geometry(&self) -> bool {
        !self.indices.is_empty()
    }
}
