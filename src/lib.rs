//! # Myth Batch
//!
//! Draw-call consolidation for the Myth engine: merges scene primitives that
//! share a material into size-bounded GPU batches and keeps those batches up
//! to date frame to frame, patching in place whenever a change allows it.
//!
//! # Modules
//!
//! - [`resources`]: CPU-side buffers, draw geometry, materials, dirty bits
//! - [`render_data`]: per-primitive render data and its keyed store
//! - [`instancing`]: instance transforms, selection and instanced display
//! - [`consolidation`]: packing, merged buffer building, per-time cache
//! - [`renderer`]: the per-frame loop choosing between batches and individual draws
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_batch::prelude::*;
//!
//! let mut store = RenderDataStore::new();
//! let mut renderer = Renderer::new();
//! let config = ConsolidationConfig::dynamic(100_000, 50_000, 1_000);
//!
//! // ... insert PrimitiveRenderData into the store ...
//!
//! let frame = renderer.render(&mut store, TimeCode::new(1.0), Reprs::SHADED, &config);
//! for item in frame.items() {
//!     // submit
//! }
//! renderer.garbage_collect(&mut store);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod consolidation;
pub mod errors;
pub mod instancing;
pub mod render_data;
pub mod renderer;
pub mod resources;
pub mod utils;

pub use consolidation::{ConsolidatedGeom, ConsolidationConfig, Consolidator, Output, Strategy};
pub use errors::{BatchError, Result};
pub use instancing::{DirtyState, InstanceGenerator, SelectionMaterials};
pub use render_data::{PrimPath, PrimitiveRenderData, RenderDataKey, RenderDataStore, SubsetBinding, UvChannel};
pub use renderer::{FrameDrawList, Renderer, Reprs, StaticDelayTracker};
pub use resources::{DirtyBits, DrawItem, Material, MaterialRef};
pub use utils::TimeCode;

/// Common imports for render loop integration.
pub mod prelude {
    pub use crate::consolidation::{ConsolidationConfig, Strategy};
    pub use crate::render_data::{PrimPath, PrimitiveRenderData, RenderDataStore, SubsetBinding, UvChannel};
    pub use crate::renderer::{FrameDrawList, Renderer, Reprs};
    pub use crate::resources::{DirtyBits, DisplayMode, DisplaySettings};
    pub use crate::utils::TimeCode;
}
