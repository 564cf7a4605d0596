use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::Vec3;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::consolidation::buffers::{self, MergedStreams};
use crate::consolidation::input::{Cell, Input};
use crate::render_data::{PrimPath, RenderDataKey};
use crate::resources::buffer::{IndexBuffer, VertexBuffer};
use crate::resources::geometry::{DrawGeometry, DrawItem, INDEX_USAGE, RenderVisibility, VertexStream};
use crate::resources::material::MaterialRef;

/// Where one primitive lives inside a merged batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub prim_path: PrimPath,
    /// First vertex of each instance's range.
    pub offsets: SmallVec<[usize; 4]>,
    pub vertex_count: usize,
    pub instance_start: usize,
    pub multipart_index: Option<usize>,
}

impl Mapping {
    pub fn instance_count(&self) -> usize {
        self.offsets.len()
    }

    /// Vertex range spanned by all instances.
    pub fn vertex_range(&self) -> Range<usize> {
        let start = self.offsets.first().copied().unwrap_or(0);
        start..start + self.vertex_count * self.instance_count()
    }

    /// Whether `input` is the slice this mapping was laid out for.
    pub fn covers(&self, input: &Input) -> bool {
        self.multipart_index == input.multipart_index
            && self.instance_start == input.instance_start
            && self.instance_count() == input.num_instances()
    }
}

/// One merged batch.
///
/// Holds four draw items over the same buffers: shaded and wireframe, each
/// with a selection-highlight variant picked while any contained instance is
/// selected.
#[derive(Debug)]
pub struct ConsolidatedGeom {
    material: MaterialRef,
    shaded: DrawItem,
    shaded_selected: DrawItem,
    wire: DrawItem,
    wire_selected: DrawItem,
    streams: MergedStreams,
    mappings: FxHashMap<PrimPath, Mapping>,
    triangle_count: usize,
    has_active_selection: AtomicBool,
}

impl ConsolidatedGeom {
    /// Merges every input of `cell` into new buffers.
    pub fn build(cell: &Cell, material: MaterialRef, wire_material: &MaterialRef, label: &str) -> Self {
        let (streams, mappings, has_selection) = buffers::build_vertex_buffers(cell, label);
        let indices = buffers::build_index_buffer(cell, &mappings, false);
        let wire_indices = buffers::build_index_buffer(cell, &mappings, true);
        let triangle_count = indices.len() / 3;
        let line_count = wire_indices.len() / 2;

        let mut shaded_geometry = DrawGeometry::triangles(label);
        for stream in VertexStream::ALL {
            shaded_geometry.set_stream(stream, Some(streams[stream.index()].clone()));
        }
        shaded_geometry.set_index_buffer(Some(IndexBuffer::new(indices, INDEX_USAGE, Some(label))));
        shaded_geometry.set_primitive_count(triangle_count);

        let mut wire_geometry = DrawGeometry::lines(format!("{label}:wire"));
        for stream in VertexStream::WIREFRAME {
            wire_geometry.set_stream(stream, Some(streams[stream.index()].clone()));
        }
        wire_geometry.set_index_buffer(
            (line_count > 0).then(|| IndexBuffer::new(wire_indices, INDEX_USAGE, Some(&format!("{label}:wire")))),
        );
        wire_geometry.set_primitive_count(line_count);

        let shaded = DrawItem::new(shaded_geometry, Some(material.clone()), RenderVisibility::Shaded);
        let wire = DrawItem::new(wire_geometry, Some(wire_material.clone()), RenderVisibility::Wireframe);
        Self {
            shaded_selected: shaded.clone().with_selection_highlight(true),
            wire_selected: wire.clone().with_selection_highlight(true),
            shaded,
            wire,
            material,
            streams,
            mappings,
            triangle_count,
            has_active_selection: AtomicBool::new(has_selection),
        }
    }

    pub fn material(&self) -> &MaterialRef {
        &self.material
    }

    /// The item to submit this frame.
    pub fn render_item(&self, wireframe: bool) -> &DrawItem {
        match (wireframe, self.has_active_selection()) {
            (false, false) => &self.shaded,
            (false, true) => &self.shaded_selected,
            (true, false) => &self.wire,
            (true, true) => &self.wire_selected,
        }
    }

    pub fn has_active_selection(&self) -> bool {
        self.has_active_selection.load(Ordering::Relaxed)
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    pub fn vertex_count(&self) -> usize {
        self.streams[VertexStream::Points.index()].len()
    }

    pub fn stream(&self, stream: VertexStream) -> &VertexBuffer {
        &self.streams[stream.index()]
    }

    pub fn mapping(&self, prim: &PrimPath) -> Option<&Mapping> {
        self.mappings.get(prim)
    }

    pub fn mappings(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.values()
    }

    /// Rewrites the dirty streams of the given inputs in place.
    pub(crate) fn patch(&self, inputs: &[Input]) {
        if buffers::update_vertex_buffers(&self.streams, inputs, &self.mappings, false).is_some() {
            let selected = self.stream(VertexStream::Selection).read().iter().any(|v| *v != Vec3::ZERO);
            self.has_active_selection.store(selected, Ordering::Relaxed);
        }
    }
}

/// A primitive subset: `(primitive path, subset index)`.
pub type PrimSubsetKey = (PrimPath, usize);

/// Reference to a subset, re-validated by path on use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderDataInfo {
    pub key: RenderDataKey,
    pub prim_path: PrimPath,
    pub subset_index: usize,
}

/// Consolidation result for one time sample.
#[derive(Debug, Clone, Default)]
pub struct Output {
    pub geoms: Vec<Arc<ConsolidatedGeom>>,
    /// Batches drawing each consolidated subset. Split subsets map to several.
    pub prim_to_geom: FxHashMap<PrimSubsetKey, SmallVec<[usize; 2]>>,
    /// Every subset considered by the last build, in visit order.
    pub source_render_data: Vec<RenderDataInfo>,
    /// Every subset drawn by a batch.
    pub consolidated_render_data: Vec<RenderDataInfo>,
}

impl Output {
    pub fn is_consolidated(&self, prim: &PrimPath, subset: usize) -> bool {
        self.prim_to_geom.contains_key(&(prim.clone(), subset))
    }

    pub fn prim_subsets(&self) -> FxHashSet<PrimSubsetKey> {
        self.prim_to_geom.keys().cloned().collect()
    }

    /// Whether this output was built from exactly `sources`, in order.
    pub fn built_from(&self, sources: &[RenderDataInfo]) -> bool {
        self.source_render_data.len() == sources.len()
            && self
                .source_render_data
                .iter()
                .zip(sources)
                .all(|(a, b)| a.prim_path == b.prim_path && a.subset_index == b.subset_index)
    }

    pub fn triangle_count(&self) -> usize {
        self.geoms.iter().map(|g| g.triangle_count()).sum()
    }
}
