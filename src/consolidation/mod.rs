//! Consolidation
//!
//! Merges subsets that share a material into size-bounded batches so the
//! draw submitter issues one draw per batch instead of one per subset.
//!
//! # Pipeline
//!
//! ```text
//! visible render data
//!   → compute_subset_info    (resolved material, same-material triangle totals)
//!   → generate_inputs        (one input per subset, or per instance slice)
//!   → build_cells            (first-fit bins per material)
//!   → ConsolidatedGeom       (merged vertex/index buffers + mappings)
//!   → Output                 (cached per time sample)
//! ```
//!
//! Frame to frame, [`Consolidator::update_consolidation`] either re-keys a
//! clean output, patches merged vertex buffers in place, or breaks the whole
//! consolidation when the change cannot be patched.

pub mod buffers;
pub mod config;
pub mod consolidator;
pub mod input;
pub mod output;
pub mod packing;

pub use config::{ConsolidationConfig, DEFAULT_STATIC_DELAY, Strategy};
pub use consolidator::Consolidator;
pub use input::{Cell, Input, SubsetInfo, compute_subset_info, generate_inputs};
pub use output::{ConsolidatedGeom, Mapping, Output, PrimSubsetKey, RenderDataInfo};
pub use packing::{CellMap, build_cells};
