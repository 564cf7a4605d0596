//! Per-primitive render data: vertex arrays, material subsets, dirty bits
//! and the draw geometry they feed.

pub mod path;
pub mod primitive;
pub mod store;
pub mod subset;

pub use path::PrimPath;
pub use primitive::{PrimitiveRenderData, SubsetBinding, UvChannel};
pub use store::{RenderDataKey, RenderDataStore};
pub use subset::{SubsetGeometry, SubsetRenderData};
