//! Core resource definitions, independent of the GPU backend:
//! - Buffer: typed CPU-side buffer mirrors
//! - Geometry: draw geometry, draw items and bounds
//! - Material: viewport materials and the flat-colour cache
//! - ChangeTracker: dirty bits
//! - Deletion: deferred destruction queue

pub mod buffer;
pub mod change_tracker;
pub mod deletion;
pub mod geometry;
pub mod material;

pub use buffer::{BufferRef, DataBuffer, IndexBuffer, VertexBuffer};
pub use change_tracker::{DirtyBits, check_dirty, clear_dirty_bits, set_dirty};
pub use deletion::DeletionQueue;
pub use geometry::{BoundingBox, DrawGeometry, DrawItem, RenderVisibility, VertexStream};
pub use material::{
    ColorMaterialCache, DisplayMode, DisplaySettings, Material, MaterialData, MaterialRef,
};
