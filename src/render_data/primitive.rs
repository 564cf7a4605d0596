use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::ThreadId;

use glam::{Affine3A, Vec3};
use rustc_hash::FxHashMap;

use crate::errors::{BatchError, Result};
use crate::instancing::InstanceGenerator;
use crate::render_data::path::PrimPath;
use crate::render_data::subset::{SubsetGeometry, SubsetRenderData};
use crate::resources::buffer::{IndexBuffer, VertexBuffer};
use crate::resources::change_tracker::{DirtyBits, check_dirty, clear_dirty_bits, set_dirty};
use crate::resources::deletion::DeletionQueue;
use crate::resources::geometry::{BoundingBox, DrawGeometry, INDEX_USAGE, VERTEX_USAGE, VertexStream};
use crate::resources::material::{ColorMaterialCache, DisplayMode, DisplaySettings, MaterialData, MaterialRef};

/// One named UV set.
#[derive(Debug, Clone)]
pub struct UvChannel {
    pub name: String,
    pub data: Arc<Vec<Vec3>>,
}

impl UvChannel {
    pub fn new(name: impl Into<String>, data: Vec<Vec3>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(data),
        }
    }
}

/// Material binding of one subset, as produced by scene sync.
#[derive(Debug, Clone)]
pub struct SubsetBinding {
    pub material_id: PrimPath,
    pub indices: Vec<[u32; 3]>,
    pub wire_indices: Vec<u32>,
}

/// Render data of one scene primitive.
///
/// Vertex arrays are shared by every subset. Arrays are reference counted so
/// consolidation inputs can hold them without copying; setters replace the
/// whole array and flag the subsets dirty.
#[derive(Debug)]
pub struct PrimitiveRenderData {
    pub path: PrimPath,
    pub points: Arc<Vec<Vec3>>,
    pub normals: Arc<Vec<Vec3>>,
    pub uvs: Vec<UvChannel>,
    pub colors: Arc<Vec<Vec3>>,
    pub transform: Affine3A,
    /// Local-space bounds of the points.
    pub extent: Option<BoundingBox>,
    /// World-space bounds, all instances included.
    pub bounding_box: Option<BoundingBox>,
    pub visible: bool,
    pub render_tag_active: bool,
    pub selected: bool,
    pub display_color: Vec3,
    /// Always present; holds no instance for simple primitives.
    pub instancer: InstanceGenerator,
    pub subsets: Vec<SubsetRenderData>,
    /// One wireframe for the whole primitive, spanning all subsets.
    pub wireframe: SubsetGeometry,
    /// Material id → name of the UV set feeding its diffuse colour.
    pub material_diffuse_uv: FxHashMap<PrimPath, String>,
    instanced: bool,
    to_delete: DeletionQueue<SubsetRenderData>,
    stale_buffers: DeletionQueue<VertexBuffer>,
}

impl PrimitiveRenderData {
    pub fn new(path: impl Into<PrimPath>) -> Self {
        Self::with_layout(path.into(), false)
    }

    pub fn new_instanced(path: impl Into<PrimPath>, transforms: Vec<Affine3A>) -> Self {
        let mut data = Self::with_layout(path.into(), true);
        data.instancer.request_update(true, transforms);
        data.update_bounds();
        data
    }

    fn with_layout(path: PrimPath, instanced: bool) -> Self {
        let wireframe = SubsetGeometry::new(DrawGeometry::lines(format!("{path}:wire")), instanced);
        Self {
            path,
            points: Arc::default(),
            normals: Arc::default(),
            uvs: Vec::new(),
            colors: Arc::default(),
            transform: Affine3A::IDENTITY,
            extent: None,
            bounding_box: None,
            visible: true,
            render_tag_active: true,
            selected: false,
            display_color: Vec3::splat(0.7),
            instancer: InstanceGenerator::new(),
            subsets: Vec::new(),
            wireframe,
            material_diffuse_uv: FxHashMap::default(),
            instanced,
            to_delete: DeletionQueue::new(),
            stale_buffers: DeletionQueue::new(),
        }
    }

    pub fn is_instanced(&self) -> bool {
        self.subsets.first().is_some_and(SubsetRenderData::is_instanced)
    }

    /// Points and normals are the minimum needed to draw anything.
    pub fn has_renderable_geometry(&self) -> bool {
        !self.points.is_empty() && !self.normals.is_empty()
    }

    // ========================================================================
    // Scene sync setters
    // ========================================================================

    pub fn add_subset(
        &mut self,
        material_id: impl Into<PrimPath>,
        indices: Vec<[u32; 3]>,
        wire_indices: Vec<u32>,
    ) -> usize {
        let index = self.subsets.len();
        let geometry = self.new_subset_geometry(index);
        self.subsets
            .push(SubsetRenderData::new(material_id.into(), indices, wire_indices, geometry));
        self.on_subset_count_changed();
        index
    }

    /// Replaces the material bindings.
    ///
    /// Subsets whose material is still bound are kept and get the new index
    /// lists; subsets whose binding disappeared go to the pending-deletion
    /// queue.
    pub fn replace_subsets(&mut self, bindings: Vec<SubsetBinding>) {
        let mut previous = std::mem::take(&mut self.subsets);
        let count_changed = previous.len() != bindings.len();

        for (index, binding) in bindings.into_iter().enumerate() {
            let kept = previous.iter().position(|s| s.material_id == binding.material_id);
            let subset = if let Some(position) = kept {
                let mut subset = previous.swap_remove(position);
                replace_indices(&mut subset, binding.indices, binding.wire_indices);
                subset
            } else {
                let geometry = self.new_subset_geometry(index);
                SubsetRenderData::new(binding.material_id, binding.indices, binding.wire_indices, geometry)
            };
            self.subsets.push(subset);
        }

        for retired in previous {
            self.to_delete.push(retired);
        }
        if count_changed {
            self.on_subset_count_changed();
        }
    }

    pub fn set_subset_indices(&mut self, subset: usize, indices: Vec<[u32; 3]>, wire_indices: Vec<u32>) -> Result<()> {
        let target = self.subset_mut(subset)?;
        replace_indices(target, indices, wire_indices);
        Ok(())
    }

    pub fn set_subset_material(
        &mut self,
        subset: usize,
        material_id: impl Into<PrimPath>,
        material_data: Option<MaterialData>,
    ) -> Result<()> {
        let target = self.subset_mut(subset)?;
        target.material_id = material_id.into();
        target.material_data = material_data;
        set_dirty(&mut target.dirty_bits, DirtyBits::MATERIAL);
        Ok(())
    }

    pub fn set_points(&mut self, points: Vec<Vec3>) {
        let resized = points.len() != self.points.len();
        self.points = Arc::new(points);
        self.extent = BoundingBox::from_points(&self.points);
        self.update_bounds();
        self.set_all_subsets_dirty(size_flag(DirtyBits::POINTS, DirtyBits::POINTS_SIZE, resized));
    }

    pub fn set_normals(&mut self, normals: Vec<Vec3>) {
        let resized = normals.len() != self.normals.len();
        self.normals = Arc::new(normals);
        self.set_all_subsets_dirty(size_flag(DirtyBits::NORMALS, DirtyBits::NORMALS_SIZE, resized));
    }

    pub fn set_uvs(&mut self, uvs: Vec<UvChannel>) {
        let resized = uvs.len() != self.uvs.len()
            || uvs.iter().zip(&self.uvs).any(|(new, old)| new.data.len() != old.data.len());
        self.uvs = uvs;
        self.set_all_subsets_dirty(size_flag(DirtyBits::UVS, DirtyBits::UVS_SIZE, resized));
    }

    pub fn set_colors(&mut self, colors: Vec<Vec3>) {
        let resized = colors.len() != self.colors.len();
        self.colors = Arc::new(colors);
        self.set_all_subsets_dirty(size_flag(
            DirtyBits::VERTEX_COLORS,
            DirtyBits::VERTEX_COLORS_SIZE,
            resized,
        ));
    }

    pub fn set_transform(&mut self, transform: Affine3A) {
        self.transform = transform;
        self.update_bounds();
        self.set_all_subsets_dirty(DirtyBits::TRANSFORMS);
    }

    /// New instance transforms. A different count recreates the instances.
    pub fn set_instance_transforms(&mut self, transforms: Vec<Affine3A>) {
        let resized = transforms.len() != self.instancer.num_instances();
        self.instancer.request_update(resized, transforms);
        self.update_bounds();
        self.set_all_subsets_dirty(size_flag(DirtyBits::TRANSFORMS, DirtyBits::TRANSFORMS_SIZE, resized));
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            self.visible = visible;
            self.set_all_subsets_dirty(DirtyBits::VISIBILITY);
        }
    }

    pub fn set_render_tag_active(&mut self, active: bool) {
        if self.render_tag_active != active {
            self.render_tag_active = active;
            self.set_all_subsets_dirty(DirtyBits::VISIBILITY);
        }
    }

    pub fn set_selected(&mut self, selected: bool) {
        if self.selected != selected {
            self.selected = selected;
            self.set_all_subsets_dirty(DirtyBits::SELECTION_HIGHLIGHT);
        }
    }

    /// Selects the given instances only. Flags the selection display.
    pub fn set_instance_selection(&mut self, instances: &[usize]) -> Result<()> {
        self.instancer.reset_selection();
        for &instance in instances {
            self.instancer.select(instance)?;
        }
        self.instancer.request_selection_display_update(false);
        self.set_all_subsets_dirty(DirtyBits::SELECTION_HIGHLIGHT);
        Ok(())
    }

    pub fn set_display_color(&mut self, color: Vec3) {
        if self.display_color != color {
            self.display_color = color;
            self.set_all_subsets_dirty(DirtyBits::MATERIAL);
        }
    }

    pub fn set_material_diffuse_uv(&mut self, material_id: impl Into<PrimPath>, uv_set: impl Into<String>) {
        self.material_diffuse_uv.insert(material_id.into(), uv_set.into());
        self.set_all_subsets_dirty(DirtyBits::UVS);
    }

    pub fn set_all_subsets_dirty(&mut self, flag: DirtyBits) {
        for subset in &mut self.subsets {
            set_dirty(&mut subset.dirty_bits, flag);
        }
    }

    pub fn subset_mut(&mut self, index: usize) -> Result<&mut SubsetRenderData> {
        let count = self.subsets.len();
        let path = &self.path;
        self.subsets.get_mut(index).ok_or_else(|| BatchError::InvalidSubsetIndex {
            prim: path.to_string(),
            index,
            count,
        })
    }

    // ========================================================================
    // Viewport resolution
    // ========================================================================

    /// Index of the UV set feeding `material_id`'s diffuse colour. Defaults to the first set.
    pub fn uv_channel_for(&self, material_id: &PrimPath) -> usize {
        self.material_diffuse_uv
            .get(material_id)
            .and_then(|name| self.uvs.iter().position(|uv| &uv.name == name))
            .unwrap_or(0)
    }

    pub fn display_color_material(&self, instanced: bool, materials: &ColorMaterialCache) -> MaterialRef {
        materials.get(self.display_color, instanced)
    }

    /// Material a subset is drawn with under the given display settings.
    pub fn resolve_viewport_material(
        &self,
        subset: &SubsetRenderData,
        settings: &DisplaySettings,
        instanced: bool,
        materials: &ColorMaterialCache,
    ) -> MaterialRef {
        match settings.mode {
            DisplayMode::DisplayColor => self.display_color_material(instanced, materials),
            DisplayMode::PreviewSurface => subset
                .material_data
                .as_ref()
                .and_then(|data| data.material(instanced))
                .cloned()
                .unwrap_or_else(|| self.display_color_material(instanced, materials)),
            DisplayMode::WireColor => settings.wire_color_material(materials, instanced),
        }
    }

    // ========================================================================
    // Buffer synchronization
    // ========================================================================

    /// Pushes the CPU arrays into the subsets' draw buffers.
    ///
    /// Only streams flagged dirty on at least one subset are touched unless
    /// `full_reload` is set. Same-size streams are copied in place, resized
    /// streams get a new buffer shared by every subset (and the wireframe,
    /// except for UVs). Dirty bits are cleared on return.
    pub fn update_render_geometry(&mut self, full_reload: bool) {
        if self.subsets.is_empty() {
            return;
        }

        let update_indices =
            full_reload || self.subsets.iter().any(|s| check_dirty(s.dirty_bits, DirtyBits::INDICES));
        if update_indices {
            self.load_indices();
        }

        let dirty_selection = full_reload
            || self
                .subsets
                .iter()
                .any(|s| check_dirty(s.dirty_bits, DirtyBits::SELECTION_HIGHLIGHT));
        let selection_fill = if self.selected { Vec3::ONE } else { Vec3::ZERO };
        let selection = dirty_selection.then(|| vec![selection_fill; self.points.len()]);

        // Subsets sharing a UV set share one UV buffer.
        let mut uv_groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        if !self.uvs.is_empty() {
            for (index, subset) in self.subsets.iter().enumerate() {
                uv_groups
                    .entry(self.uv_channel_for(&subset.material_id))
                    .or_default()
                    .push(index);
            }
        }

        let all: Vec<usize> = (0..self.subsets.len()).collect();
        let label = self.path.to_string();
        let mut loader = StreamLoader {
            subsets: &mut self.subsets,
            wireframe: &mut self.wireframe,
            stale_buffers: &self.stale_buffers,
            full_reload,
            cleanup: false,
            reallocated: false,
            label: &label,
        };

        loader.load(&all, VertexStream::Points, &self.points);
        loader.load(&all, VertexStream::Normals, &self.normals);
        if let Some(selection) = &selection {
            loader.load(&all, VertexStream::Selection, selection);
        }
        if self.uvs.is_empty() {
            loader.load(&all, VertexStream::Uvs, &[]);
        } else {
            for (channel, group) in &uv_groups {
                let data = self.uvs.get(*channel).map_or(&[][..], |uv| uv.data.as_slice());
                loader.load(group, VertexStream::Uvs, data);
            }
        }
        let cleanup = loader.cleanup;
        let reallocated = loader.reallocated;

        // Cached instanced items still point at the replaced buffers.
        if self.instanced && (update_indices || reallocated || cleanup) {
            let transforms = self.instancer.transforms().to_vec();
            self.instancer.request_update(true, transforms);
        }

        for subset in &mut self.subsets {
            clear_dirty_bits(&mut subset.dirty_bits);
        }
        if cleanup {
            for subset in &mut self.subsets {
                subset.geometry.draw_geometry_mut().prune_empty_streams();
            }
            self.wireframe.draw_geometry_mut().prune_empty_streams();
        }
    }

    fn load_indices(&mut self) {
        for subset in &mut self.subsets {
            let buffer = (!subset.indices.is_empty()).then(|| {
                IndexBuffer::from_slice(
                    bytemuck::cast_slice(subset.indices.as_slice()),
                    INDEX_USAGE,
                    Some(&format!("{}:{}", self.path, subset.material_id)),
                )
            });
            let geometry = subset.geometry.draw_geometry_mut();
            geometry.set_index_buffer(buffer);
            geometry.set_primitive_count(subset.indices.len());
        }

        let wire: Vec<u32> = self
            .subsets
            .iter()
            .flat_map(|s| s.wire_indices.iter().copied())
            .collect();
        let wire_len = wire.len();
        let geometry = self.wireframe.draw_geometry_mut();
        geometry.set_index_buffer(
            (wire_len > 0).then(|| IndexBuffer::new(wire, INDEX_USAGE, Some(&format!("{}:wire", self.path)))),
        );
        geometry.set_primitive_count(wire_len / 2);
    }

    // ========================================================================
    // Deferred destruction
    // ========================================================================

    /// Moves draining of the deferred queues to `owner`.
    pub(crate) fn set_deletion_owner(&mut self, owner: ThreadId) {
        self.to_delete.set_owner(owner);
        self.stale_buffers.set_owner(owner);
    }

    pub fn pending_deletions(&self) -> usize {
        self.to_delete.len() + self.stale_buffers.len()
    }

    /// Releases retired subsets and emptied buffers. Main thread only.
    pub fn collect_garbage(&self) -> usize {
        let subsets = self.to_delete.drain();
        let buffers = self.stale_buffers.drain();
        match (subsets, buffers) {
            (Ok(subsets), Ok(buffers)) => subsets.len() + buffers.len(),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Garbage collection of '{}' skipped: {e}", self.path);
                0
            }
        }
    }

    fn new_subset_geometry(&self, index: usize) -> SubsetGeometry {
        SubsetGeometry::new(
            DrawGeometry::triangles(format!("{}:subset{index}", self.path)),
            self.instanced,
        )
    }

    fn on_subset_count_changed(&mut self) {
        self.instancer.set_subset_count(self.subsets.len());
        if self.instanced {
            let transforms = self.instancer.transforms().to_vec();
            self.instancer.request_update(true, transforms);
        }
    }

    fn update_bounds(&mut self) {
        self.bounding_box = self.extent.and_then(|extent| {
            if self.instanced {
                self.instancer
                    .transforms()
                    .iter()
                    .map(|t| extent.transform(&(self.transform * *t)))
                    .reduce(|a, b| a.union(&b))
            } else {
                Some(extent.transform(&self.transform))
            }
        });
    }
}

fn size_flag(content: DirtyBits, size: DirtyBits, resized: bool) -> DirtyBits {
    if resized { content | size } else { content }
}

fn replace_indices(subset: &mut SubsetRenderData, indices: Vec<[u32; 3]>, wire_indices: Vec<u32>) {
    let resized = indices.len() != subset.indices.len() || wire_indices.len() != subset.wire_indices.len();
    subset.indices = Arc::new(indices);
    subset.wire_indices = Arc::new(wire_indices);
    set_dirty(
        &mut subset.dirty_bits,
        size_flag(DirtyBits::INDICES, DirtyBits::INDICES_SIZE, resized),
    );
}

/// Loads one vertex stream into a group of subsets sharing the buffer.
struct StreamLoader<'a> {
    subsets: &'a mut [SubsetRenderData],
    wireframe: &'a mut SubsetGeometry,
    stale_buffers: &'a DeletionQueue<VertexBuffer>,
    full_reload: bool,
    cleanup: bool,
    reallocated: bool,
    label: &'a str,
}

impl StreamLoader<'_> {
    fn load(&mut self, group: &[usize], stream: VertexStream, source: &[Vec3]) {
        let Some(&first) = group.first() else {
            return;
        };
        let flag = stream.dirty_flag();
        let dirty = group.iter().any(|&i| check_dirty(self.subsets[i].dirty_bits, flag));
        if !dirty && !self.full_reload {
            return;
        }

        let current = self.subsets[first].geometry.draw_geometry().stream(stream).cloned();
        let buffer = match current {
            Some(buffer) if buffer.len() == source.len() => {
                if let Err(e) = buffer.write_all(source) {
                    log::warn!("Stream '{}' of '{}' not updated: {e}", stream.label(), self.label);
                }
                Some(buffer)
            }
            Some(buffer) if source.is_empty() => {
                buffer.clear();
                self.stale_buffers.push(buffer.clone());
                self.cleanup = true;
                Some(buffer)
            }
            None if source.is_empty() => None,
            _ => {
                self.reallocated = true;
                Some(VertexBuffer::from_slice(
                    source,
                    VERTEX_USAGE,
                    Some(&format!("{}:{}", self.label, stream.label())),
                ))
            }
        };

        if let Some(buffer) = buffer {
            for &i in group {
                self.subsets[i]
                    .geometry
                    .draw_geometry_mut()
                    .set_stream(stream, Some(buffer.clone()));
            }
            if stream != VertexStream::Uvs {
                self.wireframe.draw_geometry_mut().set_stream(stream, Some(buffer));
            }
        }
    }
}
