use std::sync::Arc;

use glam::{Affine3A, Vec3};
use rustc_hash::FxHashMap;

use crate::render_data::{PrimPath, PrimitiveRenderData, RenderDataKey};
use crate::resources::change_tracker::DirtyBits;
use crate::resources::material::{ColorMaterialCache, DisplaySettings, MaterialRef};

/// Consolidation-time view of one subset, or of one slice of its instances.
///
/// Source arrays are shared with the render data, never copied.
#[derive(Debug, Clone)]
pub struct Input {
    pub key: RenderDataKey,
    pub prim_path: PrimPath,
    pub subset_index: usize,
    pub indices: Arc<Vec<[u32; 3]>>,
    pub wire_indices: Arc<Vec<u32>>,
    pub points: Arc<Vec<Vec3>>,
    pub normals: Arc<Vec<Vec3>>,
    /// The UV set read by the subset's material.
    pub uvs: Arc<Vec<Vec3>>,
    /// World transform of every instance in the slice. A simple primitive has one.
    pub transforms: Vec<Affine3A>,
    pub selection: Vec<bool>,
    /// Index of the first instance of the slice.
    pub instance_start: usize,
    /// Part number when the subset's instances are split over several inputs.
    pub multipart_index: Option<usize>,
    pub dirty_bits: DirtyBits,
}

impl Input {
    #[inline]
    pub fn num_instances(&self) -> usize {
        self.transforms.len()
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    /// Triangles drawn for the whole slice.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() * self.num_instances()
    }

    /// Index elements of one instance.
    pub fn index_len(&self, wireframe: bool) -> usize {
        if wireframe { self.wire_indices.len() } else { self.indices.len() * 3 }
    }

    pub fn has_selection(&self) -> bool {
        self.selection.iter().any(|s| *s)
    }

    /// Whether `other` covers exactly the same instances of the same primitive.
    pub fn same_slice(&self, other: &Input) -> bool {
        self.prim_path == other.prim_path
            && self.instance_start == other.instance_start
            && self.num_instances() == other.num_instances()
    }
}

/// A bin of inputs merged into one batch.
#[derive(Debug, Clone)]
pub struct Cell {
    pub material: MaterialRef,
    pub num_tris: usize,
    pub num_instances: usize,
    pub inputs: Vec<Input>,
}

impl Cell {
    pub fn new(material: MaterialRef, input: Input) -> Self {
        Self {
            material,
            num_tris: input.triangle_count(),
            num_instances: input.num_instances(),
            inputs: vec![input],
        }
    }

    pub fn push(&mut self, input: Input) {
        self.num_tris += input.triangle_count();
        self.num_instances += input.num_instances();
        self.inputs.push(input);
    }

    /// A lone input that is not part of a split gains nothing from merging.
    pub fn is_mergeable(&self) -> bool {
        match self.inputs.as_slice() {
            [] => false,
            [single] => single.multipart_index.is_some(),
            _ => true,
        }
    }
}

/// Resolved material and triangle counts of a primitive's subsets.
#[derive(Debug, Clone, Default)]
pub struct SubsetInfo {
    pub materials: Vec<MaterialRef>,
    pub triangles: Vec<usize>,
    material_triangles: FxHashMap<u64, usize>,
    material_subsets: FxHashMap<u64, usize>,
}

impl SubsetInfo {
    /// Triangle total of every subset sharing `subset`'s material.
    pub fn material_triangles(&self, subset: usize) -> usize {
        self.materials
            .get(subset)
            .and_then(|m| self.material_triangles.get(&m.id()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of subsets sharing `subset`'s material.
    pub fn material_subset_count(&self, subset: usize) -> usize {
        self.materials
            .get(subset)
            .and_then(|m| self.material_subsets.get(&m.id()))
            .copied()
            .unwrap_or(0)
    }
}

/// Resolves the merged-batch material of every subset of `prim`.
pub fn compute_subset_info(
    prim: &PrimitiveRenderData,
    settings: &DisplaySettings,
    materials: &ColorMaterialCache,
) -> SubsetInfo {
    let mut info = SubsetInfo::default();
    for subset in &prim.subsets {
        let material = prim.resolve_viewport_material(subset, settings, false, materials);
        let triangles = subset.triangle_count();
        *info.material_triangles.entry(material.id()).or_default() += triangles;
        *info.material_subsets.entry(material.id()).or_default() += 1;
        info.materials.push(material);
        info.triangles.push(triangles);
    }
    info
}

/// Splits one subset into inputs no larger than a cell.
///
/// Each input carries at most `max_cell_size / material_triangles`
/// instances, where `material_triangles` is the triangle total of every
/// subset sharing the material, so that sibling subsets split the same way
/// and land together. Returns nothing when not even one instance fits.
pub fn generate_inputs(
    key: RenderDataKey,
    prim: &PrimitiveRenderData,
    subset_index: usize,
    material_triangles: usize,
    max_cell_size: usize,
) -> Vec<Input> {
    let Some(subset) = prim.subsets.get(subset_index) else {
        return Vec::new();
    };
    if material_triangles == 0 {
        return Vec::new();
    }
    let max_instances_per_input = max_cell_size / material_triangles;
    if max_instances_per_input == 0 {
        return Vec::new();
    }

    let (transforms, selection): (Vec<Affine3A>, Vec<bool>) = if subset.is_instanced() {
        let flags = prim.instancer.selection();
        prim.instancer
            .transforms()
            .iter()
            .enumerate()
            .map(|(i, t)| (prim.transform * *t, prim.selected || flags.get(i).copied().unwrap_or(false)))
            .unzip()
    } else {
        (vec![prim.transform], vec![prim.selected])
    };
    if transforms.is_empty() {
        return Vec::new();
    }

    let channel = prim.uv_channel_for(&subset.material_id);
    let uvs = prim.uvs.get(channel).map(|uv| Arc::clone(&uv.data)).unwrap_or_default();

    let num_inputs = transforms.len().div_ceil(max_instances_per_input);
    (0..num_inputs)
        .map(|part| {
            let start = part * max_instances_per_input;
            let end = (start + max_instances_per_input).min(transforms.len());
            Input {
                key,
                prim_path: prim.path.clone(),
                subset_index,
                indices: Arc::clone(&subset.indices),
                wire_indices: Arc::clone(&subset.wire_indices),
                points: Arc::clone(&prim.points),
                normals: Arc::clone(&prim.normals),
                uvs: Arc::clone(&uvs),
                transforms: transforms[start..end].to_vec(),
                selection: selection[start..end].to_vec(),
                instance_start: start,
                multipart_index: (num_inputs > 1).then_some(part),
                dirty_bits: subset.dirty_bits,
            }
        })
        .collect()
}
