//! Frame Orchestration
//!
//! [`Renderer`] runs once per frame: it decides between building, patching
//! or bypassing merged batches, then collects the draw items of everything
//! the batches do not cover.
//!
//! # Frame Flow
//!
//! ```text
//! render_at(store, time, reprs, config, now)
//!   ├─ consolidate()
//!   │    ├─ config changed?  → reset + set_config
//!   │    │   otherwise       → update_consolidation(last, time)
//!   │    ├─ static?          (StaticDelayTracker)
//!   │    └─ reuse | build | cached-only | none   (per Strategy)
//!   ├─ batch items           (shaded / wireframe per Reprs)
//!   └─ per primitive not fully merged
//!        ├─ update_render_geometry(false)
//!        ├─ shaded: simple items, or InstanceGenerator::generate_instances
//!        └─ wireframe: one item for the whole primitive
//! ```

use std::sync::Arc;

use bitflags::bitflags;

use crate::consolidation::consolidator::source_render_data;
use crate::consolidation::{ConsolidationConfig, Consolidator, Output, Strategy};
use crate::instancing::SelectionMaterials;
use crate::render_data::{PrimitiveRenderData, RenderDataKey, RenderDataStore, SubsetGeometry};
use crate::resources::change_tracker::clear_dirty_bits;
use crate::resources::geometry::{DrawItem, RenderVisibility};
use crate::resources::material::{ColorMaterialCache, DisplaySettings, MaterialRef};
use crate::utils::TimeCode;
use crate::utils::time::{Duration, Instant};

bitflags! {
    /// Display representations requested for a frame.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Reprs: u8 {
        const SHADED    = 1 << 0;
        const WIREFRAME = 1 << 1;
    }
}

impl Default for Reprs {
    fn default() -> Self {
        Self::SHADED
    }
}

// ---------------------------------------------------------------------------
// StaticDelayTracker
// ---------------------------------------------------------------------------

/// Measures how long the displayed time has stayed put.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDelayTracker {
    stable_since: Option<Instant>,
}

impl StaticDelayTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once `time` has equalled `last` for at least `delay`.
    /// A zero delay is always static.
    pub fn is_static(&mut self, last: TimeCode, time: TimeCode, delay: Duration, now: Instant) -> bool {
        if delay.is_zero() {
            return true;
        }
        if last != time {
            self.stable_since = None;
            return false;
        }
        let since = *self.stable_since.get_or_insert(now);
        now.saturating_duration_since(since) >= delay
    }

    pub fn reset(&mut self) {
        self.stable_since = None;
    }
}

// ---------------------------------------------------------------------------
// FrameDrawList
// ---------------------------------------------------------------------------

/// Everything to submit for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameDrawList {
    /// Items of merged batches.
    pub consolidated: Vec<DrawItem>,
    /// Items of subsets drawn on their own.
    pub individual: Vec<DrawItem>,
    /// The consolidation the batch items come from.
    pub consolidation: Option<Arc<Output>>,
}

impl FrameDrawList {
    pub fn draw_count(&self) -> usize {
        self.consolidated.len() + self.individual.len()
    }

    pub fn items(&self) -> impl Iterator<Item = &DrawItem> {
        self.consolidated.iter().chain(&self.individual)
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Renderer {
    consolidator: Consolidator,
    materials: Arc<ColorMaterialCache>,
    selection_materials: SelectionMaterials,
    static_delay: StaticDelayTracker,
    last_time: Option<TimeCode>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_materials(Arc::new(ColorMaterialCache::new()))
    }

    /// Shares an existing colour material cache.
    #[must_use]
    pub fn with_materials(materials: Arc<ColorMaterialCache>) -> Self {
        Self {
            consolidator: Consolidator::new(Arc::clone(&materials)),
            materials,
            selection_materials: SelectionMaterials::default(),
            static_delay: StaticDelayTracker::new(),
            last_time: None,
        }
    }

    #[must_use]
    pub fn with_selection_materials(mut self, selection_materials: SelectionMaterials) -> Self {
        self.selection_materials = selection_materials;
        self
    }

    pub fn consolidator(&self) -> &Consolidator {
        &self.consolidator
    }

    pub fn materials(&self) -> &Arc<ColorMaterialCache> {
        &self.materials
    }

    /// Flat wire-colour material for merged and simple wireframes.
    pub fn wire_material(&self, settings: &DisplaySettings, instanced: bool) -> MaterialRef {
        settings.wire_color_material(&self.materials, instanced)
    }

    /// Picks the batches to draw at `time`.
    ///
    /// Dirty bits of every merged subset are cleared on return; those subsets
    /// are drawn by their batch.
    pub fn consolidate(
        &mut self,
        store: &mut RenderDataStore,
        visible: &[RenderDataKey],
        last: TimeCode,
        time: TimeCode,
        config: &ConsolidationConfig,
        wire_material: &MaterialRef,
        now: Instant,
    ) -> Option<Arc<Output>> {
        if config != self.consolidator.config() {
            log::info!("Consolidation settings changed ({:?}), dropping cached batches", config.strategy);
            self.consolidator.reset(store);
            self.consolidator.set_config(config.clone());
        } else if config.is_enabled() {
            self.consolidator.update_consolidation(store, visible, last, time);
        }

        let is_static = self.static_delay.is_static(last, time, config.static_delay, now);
        let output = match config.strategy {
            Strategy::Off => None,
            Strategy::Dynamic => self.reuse_or_build(store, visible, time, wire_material),
            Strategy::Static if is_static => self.reuse_or_build(store, visible, time, wire_material),
            Strategy::Static => self.consolidator.get_consolidation(time),
        };

        if let Some(output) = &output {
            for info in &output.consolidated_render_data {
                if let Some(subset) = store
                    .safe_get_mut(info.key, &info.prim_path)
                    .and_then(|data| data.subsets.get_mut(info.subset_index))
                {
                    clear_dirty_bits(&mut subset.dirty_bits);
                }
            }
        }
        output
    }

    fn reuse_or_build(
        &mut self,
        store: &mut RenderDataStore,
        visible: &[RenderDataKey],
        time: TimeCode,
        wire_material: &MaterialRef,
    ) -> Option<Arc<Output>> {
        if let Some(existing) = self.consolidator.get_consolidation(time) {
            if existing.built_from(&source_render_data(store, visible)) {
                log::trace!("Reusing consolidation at {time}");
                return Some(existing);
            }
        }
        self.consolidator.build_consolidation(store, visible, time, wire_material)
    }

    pub fn render(
        &mut self,
        store: &mut RenderDataStore,
        time: TimeCode,
        reprs: Reprs,
        config: &ConsolidationConfig,
    ) -> FrameDrawList {
        self.render_at(store, time, reprs, config, Instant::now())
    }

    /// Builds the draw list for `time`. The first frame counts as a frame
    /// without time change.
    pub fn render_at(
        &mut self,
        store: &mut RenderDataStore,
        time: TimeCode,
        reprs: Reprs,
        config: &ConsolidationConfig,
        now: Instant,
    ) -> FrameDrawList {
        let last = self.last_time.replace(time).unwrap_or(time);
        let visible = store.visible_keys();
        let wire_material = self.wire_material(&config.display_settings, false);

        let consolidation = self.consolidate(store, &visible, last, time, config, &wire_material, now);
        let mut list = FrameDrawList {
            consolidation: consolidation.clone(),
            ..Default::default()
        };

        if let Some(output) = &consolidation {
            for geom in &output.geoms {
                if reprs.contains(Reprs::SHADED) {
                    list.consolidated.push(geom.render_item(false).clone());
                }
                if reprs.contains(Reprs::WIREFRAME) && geom.render_item(true).geometry.is_drawable() {
                    list.consolidated.push(geom.render_item(true).clone());
                }
            }
        }

        let total_subsets: usize = visible
            .iter()
            .filter_map(|&key| store.get(key))
            .map(|data| data.subsets.len())
            .sum();
        let merged_subsets = consolidation.as_ref().map_or(0, |o| o.prim_to_geom.len());
        if total_subsets == merged_subsets {
            return list;
        }

        for &key in &visible {
            let Some(data) = store.get_mut(key) else {
                continue;
            };
            let merged: Vec<bool> = (0..data.subsets.len())
                .map(|i| consolidation.as_ref().is_some_and(|o| o.is_consolidated(&data.path, i)))
                .collect();
            if merged.iter().all(|m| *m) {
                continue;
            }

            data.update_render_geometry(false);
            if !data.has_renderable_geometry() {
                continue;
            }

            if reprs.contains(Reprs::SHADED) {
                self.emit_shaded(data, &merged, &config.display_settings, &mut list.individual);
                data.instancer.set_clean(false);
            }
            if reprs.contains(Reprs::WIREFRAME) {
                self.emit_wireframe(data, &config.display_settings, &mut list.individual);
                data.instancer.set_clean(true);
            }
        }
        list
    }

    fn emit_shaded(
        &self,
        data: &mut PrimitiveRenderData,
        merged: &[bool],
        settings: &DisplaySettings,
        out: &mut Vec<DrawItem>,
    ) {
        let instanced = data.is_instanced();
        let materials: Vec<MaterialRef> = data
            .subsets
            .iter()
            .map(|subset| data.resolve_viewport_material(subset, settings, instanced, &self.materials))
            .collect();

        let transform = data.transform;
        let selected = data.selected;
        let PrimitiveRenderData { subsets, instancer, .. } = data;
        for (index, subset) in subsets.iter_mut().enumerate() {
            if merged.get(index).copied().unwrap_or(false) {
                continue;
            }
            match &mut subset.geometry {
                SubsetGeometry::Simple(geometry) => {
                    if !geometry.is_drawable() {
                        continue;
                    }
                    out.push(
                        DrawItem::new(geometry.clone(), Some(materials[index].clone()), RenderVisibility::Shaded)
                            .with_selection_highlight(selected)
                            .with_transform(transform),
                    );
                }
                SubsetGeometry::Instanced(geometry) => {
                    let start = out.len();
                    instancer.generate_instances(
                        geometry,
                        Some(&materials[index]),
                        &self.selection_materials,
                        false,
                        index,
                        out,
                    );
                    for item in &mut out[start..] {
                        item.transform = transform;
                    }
                }
            }
        }
    }

    fn emit_wireframe(&self, data: &mut PrimitiveRenderData, settings: &DisplaySettings, out: &mut Vec<DrawItem>) {
        let transform = data.transform;
        let selected = data.selected;
        let instanced = data.wireframe.is_instanced();
        let material = self.wire_material(settings, instanced);
        let PrimitiveRenderData { wireframe, instancer, .. } = data;
        match wireframe {
            SubsetGeometry::Simple(geometry) => {
                if geometry.is_drawable() {
                    out.push(
                        DrawItem::new(geometry.clone(), Some(material), RenderVisibility::Wireframe)
                            .with_selection_highlight(selected)
                            .with_transform(transform),
                    );
                }
            }
            SubsetGeometry::Instanced(geometry) => {
                let start = out.len();
                instancer.generate_instances(geometry, Some(&material), &self.selection_materials, true, 0, out);
                for item in &mut out[start..] {
                    item.transform = transform;
                }
            }
        }
    }

    /// Drops all cached batches.
    pub fn reset(&mut self, store: &mut RenderDataStore) {
        self.consolidator.reset(store);
        self.static_delay.reset();
    }

    /// Releases retired render data and buffers. Main thread only.
    pub fn garbage_collect(&self, store: &mut RenderDataStore) -> usize {
        store.garbage_collect()
    }
}
