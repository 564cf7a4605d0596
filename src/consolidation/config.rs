//! Consolidation Settings
//!
//! [`ConsolidationConfig`] is the value object the render loop hands to the
//! consolidator every frame. A change of any field drops every cached batch.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_batch::consolidation::{ConsolidationConfig, Strategy};
//!
//! // Merge continuously, up to 50k triangles per batch.
//! let config = ConsolidationConfig::dynamic(200_000, 50_000, 1_000);
//!
//! // Merge only once playback settles for a quarter second.
//! let config = ConsolidationConfig::static_(200_000, 50_000, 1_000)
//!     .with_static_delay(Duration::from_millis(250));
//! ```

use crate::resources::material::DisplaySettings;
use crate::utils::time::Duration;

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// When merged batches are built.
///
/// | Strategy  | Time stable              | Time changing                    |
/// |-----------|--------------------------|----------------------------------|
/// | `Static`  | build / update           | reuse cached batches, else none  |
/// | `Dynamic` | build / update           | build / update                   |
/// | `Off`     | never                    | never                            |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Strategy {
    /// Consolidate only once the displayed time stopped changing.
    Static,
    /// Consolidate every frame, patching batches while content animates.
    Dynamic,
    #[default]
    Off,
}

// ---------------------------------------------------------------------------
// ConsolidationConfig
// ---------------------------------------------------------------------------

/// Consolidation limits and policy.
///
/// # Fields
///
/// | Field                | Description                                        | Default  |
/// |----------------------|----------------------------------------------------|----------|
/// | `strategy`           | Build policy, see [`Strategy`]                     | `Off`    |
/// | `visualize`          | Random colour per batch                            | `false`  |
/// | `max_triangles`      | Same-material triangle total admitted per subset   | `0`      |
/// | `max_instance_count` | Instances × same-material subsets admitted         | `0`      |
/// | `max_cell_size`      | Triangle budget of one merged batch                | `0`      |
/// | `static_delay`       | Stable time before a frame counts as static        | 500 ms   |
/// | `display_settings`   | Viewport material resolution                       | default  |
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConsolidationConfig {
    pub strategy: Strategy,

    /// Assign every merged batch a random flat colour instead of its material.
    pub visualize: bool,

    /// Upper bound on the triangle total of all subsets sharing a subset's
    /// material within its primitive. Larger subsets are drawn individually.
    pub max_triangles: usize,

    /// Upper bound on `instance count × same-material subset count`.
    pub max_instance_count: usize,

    /// Triangle budget of one cell, all instances included.
    pub max_cell_size: usize,

    pub static_delay: Duration,

    pub display_settings: DisplaySettings,
}

/// Default stable time before a frame counts as static.
pub const DEFAULT_STATIC_DELAY: Duration = Duration::from_millis(500);

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Off,
            visualize: false,
            max_triangles: 0,
            max_instance_count: 0,
            max_cell_size: 0,
            static_delay: DEFAULT_STATIC_DELAY,
            display_settings: DisplaySettings::default(),
        }
    }
}

impl ConsolidationConfig {
    #[must_use]
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn dynamic(max_triangles: usize, max_cell_size: usize, max_instance_count: usize) -> Self {
        Self::new(Strategy::Dynamic).with_limits(max_triangles, max_cell_size, max_instance_count)
    }

    #[must_use]
    pub fn static_(max_triangles: usize, max_cell_size: usize, max_instance_count: usize) -> Self {
        Self::new(Strategy::Static).with_limits(max_triangles, max_cell_size, max_instance_count)
    }

    #[must_use]
    pub fn with_limits(mut self, max_triangles: usize, max_cell_size: usize, max_instance_count: usize) -> Self {
        self.max_triangles = max_triangles;
        self.max_cell_size = max_cell_size;
        self.max_instance_count = max_instance_count;
        self
    }

    #[must_use]
    pub fn with_static_delay(mut self, delay: Duration) -> Self {
        self.static_delay = delay;
        self
    }

    #[must_use]
    pub fn with_visualize(mut self, visualize: bool) -> Self {
        self.visualize = visualize;
        self
    }

    #[must_use]
    pub fn with_display_settings(mut self, settings: DisplaySettings) -> Self {
        self.display_settings = settings;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.strategy != Strategy::Off
    }
}
