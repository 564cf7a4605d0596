//! Utility Module
//!
//! - [`time`]: Timeline samples and the platform clock used by the static-delay heuristic

pub mod time;

pub use time::TimeCode;
