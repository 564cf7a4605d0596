//! Draw geometry descriptors.
//!
//! A [`DrawGeometry`] is the CPU-side description of one draw: up to four
//! vertex streams, an optional index buffer and a topology. Buffers are
//! shared handles, so the shaded and wireframe geometries of a primitive (or
//! of a merged batch) can point at the same vertex data.

use glam::{Affine3A, Vec3};
use wgpu::{BufferUsages, IndexFormat, PrimitiveTopology};

use crate::instancing::InstanceBuffer;
use crate::resources::buffer::{IndexBuffer, VertexBuffer};
use crate::resources::change_tracker::DirtyBits;
use crate::resources::material::MaterialRef;

/// Vertex stream slots, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexStream {
    Points = 0,
    Normals = 1,
    /// Per-vertex highlight pseudo-colour, synthesized from selection state.
    Selection = 2,
    Uvs = 3,
}

impl VertexStream {
    pub const COUNT: usize = 4;
    pub const ALL: [Self; Self::COUNT] = [Self::Points, Self::Normals, Self::Selection, Self::Uvs];
    /// Wireframe geometry carries no UVs.
    pub const WIREFRAME: [Self; 3] = [Self::Points, Self::Normals, Self::Selection];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Content flag that marks this stream dirty on a subset.
    #[must_use]
    pub fn dirty_flag(self) -> DirtyBits {
        match self {
            Self::Points => DirtyBits::POINTS,
            Self::Normals => DirtyBits::NORMALS,
            Self::Selection => DirtyBits::SELECTION_HIGHLIGHT,
            Self::Uvs => DirtyBits::UVS,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Normals => "normals",
            Self::Selection => "selection",
            Self::Uvs => "uvs",
        }
    }
}

/// Usage flags for vertex streams that get patched after creation.
pub const VERTEX_USAGE: BufferUsages = BufferUsages::VERTEX.union(BufferUsages::COPY_DST);
pub const INDEX_USAGE: BufferUsages = BufferUsages::INDEX.union(BufferUsages::COPY_DST);

#[derive(Debug, Clone)]
pub struct DrawGeometry {
    label: String,
    topology: PrimitiveTopology,
    streams: [Option<VertexBuffer>; VertexStream::COUNT],
    index_buffer: Option<IndexBuffer>,
    primitive_count: usize,
}

impl DrawGeometry {
    pub fn new(label: impl Into<String>, topology: PrimitiveTopology) -> Self {
        Self {
            label: label.into(),
            topology,
            streams: Default::default(),
            index_buffer: None,
            primitive_count: 0,
        }
    }

    pub fn triangles(label: impl Into<String>) -> Self {
        Self::new(label, PrimitiveTopology::TriangleList)
    }

    pub fn lines(label: impl Into<String>) -> Self {
        Self::new(label, PrimitiveTopology::LineList)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn stream(&self, stream: VertexStream) -> Option<&VertexBuffer> {
        self.streams[stream.index()].as_ref()
    }

    pub fn set_stream(&mut self, stream: VertexStream, buffer: Option<VertexBuffer>) {
        self.streams[stream.index()] = buffer;
    }

    /// Bound streams, in slot order.
    pub fn streams(&self) -> impl Iterator<Item = (VertexStream, &VertexBuffer)> {
        VertexStream::ALL
            .into_iter()
            .filter_map(|s| self.stream(s).map(|b| (s, b)))
    }

    /// Unbinds streams whose buffer holds no element. Returns how many were removed.
    pub fn prune_empty_streams(&mut self) -> usize {
        let mut removed = 0;
        for slot in &mut self.streams {
            if slot.as_ref().is_some_and(VertexBuffer::is_empty) {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }

    pub fn index_buffer(&self) -> Option<&IndexBuffer> {
        self.index_buffer.as_ref()
    }

    pub fn set_index_buffer(&mut self, buffer: Option<IndexBuffer>) {
        self.index_buffer = buffer;
    }

    pub fn index_format(&self) -> IndexFormat {
        IndexFormat::Uint32
    }

    pub fn index_count(&self) -> usize {
        self.index_buffer.as_ref().map_or(0, IndexBuffer::len)
    }

    pub fn primitive_count(&self) -> usize {
        self.primitive_count
    }

    pub fn set_primitive_count(&mut self, count: usize) {
        self.primitive_count = count;
    }

    pub fn vertex_count(&self) -> usize {
        self.stream(VertexStream::Points).map_or(0, VertexBuffer::len)
    }

    /// Points and at least one primitive are required to submit a draw.
    pub fn is_drawable(&self) -> bool {
        self.vertex_count() > 0 && self.primitive_count > 0
    }
}

/// Which display pass an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderVisibility {
    Shaded,
    Wireframe,
}

/// One submission for the draw submitter.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub geometry: DrawGeometry,
    pub material: Option<MaterialRef>,
    pub visibility: RenderVisibility,
    /// Draw with the selection highlight effect.
    pub selection_highlight: bool,
    /// Object-to-world transform; merged batches have their transforms baked.
    pub transform: Affine3A,
    pub instances: Option<InstanceBuffer>,
    pub instance_count: usize,
}

impl DrawItem {
    pub fn new(geometry: DrawGeometry, material: Option<MaterialRef>, visibility: RenderVisibility) -> Self {
        Self {
            geometry,
            material,
            visibility,
            selection_highlight: false,
            transform: Affine3A::IDENTITY,
            instances: None,
            instance_count: 0,
        }
    }

    #[must_use]
    pub fn with_selection_highlight(mut self, highlight: bool) -> Self {
        self.selection_highlight = highlight;
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Affine3A) -> Self {
        self.transform = transform;
        self
    }

    pub fn is_instanced(&self) -> bool {
        self.instances.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Tight box around `points`, `None` when empty.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn transform(&self, matrix: &Affine3A) -> Self {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];

        let mut new_min = Vec3::splat(f32::INFINITY);
        let mut new_max = Vec3::splat(f32::NEG_INFINITY);

        for point in corners {
            let transformed = matrix.transform_point3(point);
            new_min = new_min.min(transformed);
            new_max = new_max.max(transformed);
        }

        Self { min: new_min, max: new_max }
    }
}
