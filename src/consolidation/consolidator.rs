use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::consolidation::config::{ConsolidationConfig, Strategy};
use crate::consolidation::input::{Input, compute_subset_info, generate_inputs};
use crate::consolidation::output::{ConsolidatedGeom, Output, PrimSubsetKey, RenderDataInfo};
use crate::consolidation::packing;
use crate::render_data::{RenderDataKey, RenderDataStore};
use crate::resources::change_tracker::{DirtyBits, set_dirty};
use crate::resources::material::{ColorMaterialCache, Material, MaterialRef};
use crate::utils::TimeCode;

const VISUALIZE_SEED: u64 = 0x6261_7463_6865_7321;

/// Builds merged batches and keeps them per time sample.
///
/// The consolidator is the only writer of the cache and of the subsets'
/// `in_consolidation` flags. Render data itself stays in the
/// [`RenderDataStore`]; batches refer to it by key and path.
#[derive(Debug)]
pub struct Consolidator {
    config: ConsolidationConfig,
    cache: FxHashMap<TimeCode, Arc<Output>>,
    materials: Arc<ColorMaterialCache>,
    rng: StdRng,
}

impl Consolidator {
    pub fn new(materials: Arc<ColorMaterialCache>) -> Self {
        Self {
            config: ConsolidationConfig::default(),
            cache: FxHashMap::default(),
            materials,
            rng: StdRng::seed_from_u64(VISUALIZE_SEED),
        }
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Replaces the configuration. Cached batches are not touched; callers
    /// changing the configuration [`reset`](Self::reset) first.
    pub fn set_config(&mut self, config: ConsolidationConfig) {
        self.config = config;
    }

    /// Drops every cached batch and re-dirties every subset they covered.
    pub fn reset(&mut self, store: &mut RenderDataStore) {
        for output in self.cache.values() {
            for info in &output.consolidated_render_data {
                let Some(data) = store.safe_get_mut(info.key, &info.prim_path) else {
                    continue;
                };
                if let Some(subset) = data.subsets.get_mut(info.subset_index) {
                    set_dirty(&mut subset.dirty_bits, DirtyBits::ALL_DIRTY);
                    subset.in_consolidation = false;
                }
            }
        }
        if !self.cache.is_empty() {
            log::debug!("Consolidation reset, {} cached outputs dropped", self.cache.len());
        }
        self.cache.clear();
    }

    pub fn get_consolidation(&self, time: TimeCode) -> Option<Arc<Output>> {
        self.cache.get(&time).cloned()
    }

    pub fn consolidated_prim_subsets(&self, time: TimeCode) -> FxHashSet<PrimSubsetKey> {
        self.cache.get(&time).map(|output| output.prim_subsets()).unwrap_or_default()
    }

    pub fn cached_times(&self) -> Vec<TimeCode> {
        self.cache.keys().copied().collect()
    }

    /// Packs the visible, not yet consolidated subsets into new batches.
    ///
    /// New batches are appended to the output cached for `time`, if any.
    /// Returns `None` when no batch exists for `time` afterwards.
    pub fn build_consolidation(
        &mut self,
        store: &mut RenderDataStore,
        visible: &[RenderDataKey],
        time: TimeCode,
        wire_material: &MaterialRef,
    ) -> Option<Arc<Output>> {
        let cells = packing::build_cells(store, visible, &self.config, &self.materials);

        let mut output = self.cache.get(&time).map(|o| Output::clone(o)).unwrap_or_default();
        let previous_geoms = output.geoms.len();

        for cell in cells.into_values().flatten() {
            if !cell.is_mergeable() {
                continue;
            }
            let geom_index = output.geoms.len();
            let material = if self.config.visualize {
                self.random_material()
            } else {
                cell.material.clone()
            };
            let label = format!("Consolidation#{geom_index}");
            let geom = ConsolidatedGeom::build(&cell, material, wire_material, &label);

            for input in &cell.inputs {
                let entry = output
                    .prim_to_geom
                    .entry((input.prim_path.clone(), input.subset_index))
                    .or_default();
                if entry.contains(&geom_index) {
                    continue;
                }
                let first = entry.is_empty();
                entry.push(geom_index);
                if !first {
                    continue;
                }

                if let Some(subset) = store
                    .get_mut(input.key)
                    .and_then(|data| data.subsets.get_mut(input.subset_index))
                {
                    subset.in_consolidation = true;
                }
                output.consolidated_render_data.push(RenderDataInfo {
                    key: input.key,
                    prim_path: input.prim_path.clone(),
                    subset_index: input.subset_index,
                });
            }
            output.geoms.push(Arc::new(geom));
        }

        output.source_render_data = source_render_data(store, visible);

        if output.geoms.is_empty() {
            return None;
        }
        log::debug!(
            "Built {} batches at {time} ({} total, {} subsets merged)",
            output.geoms.len() - previous_geoms,
            output.geoms.len(),
            output.prim_to_geom.len()
        );
        let output = Arc::new(output);
        self.cache.insert(time, Arc::clone(&output));
        Some(output)
    }

    /// Carries the batches cached for `previous` over to `new`.
    ///
    /// Clean batches move as they are. Content-only changes are patched into
    /// the merged vertex buffers. Membership changes, unpatchable dirty bits,
    /// and content changes across a time change outside the dynamic strategy
    /// break the consolidation: everything is [`reset`](Self::reset).
    pub fn update_consolidation(
        &mut self,
        store: &mut RenderDataStore,
        visible: &[RenderDataKey],
        previous: TimeCode,
        new: TimeCode,
    ) {
        let Some(output) = self.cache.get(&previous).cloned() else {
            return;
        };
        if output.geoms.is_empty() {
            return;
        }

        let mut consolidated = 0;
        let mut dirty = Vec::new();
        let mut dirty_bits = DirtyBits::CLEAN;
        for &key in visible {
            let Some(data) = store.get(key) else {
                continue;
            };
            for (index, subset) in data.subsets.iter().enumerate() {
                if !subset.in_consolidation {
                    continue;
                }
                consolidated += 1;
                if !subset.dirty_bits.is_clean() {
                    dirty_bits |= subset.dirty_bits;
                    dirty.push((key, index));
                }
            }
        }

        let reason = if consolidated != output.prim_to_geom.len() {
            Some("consolidated subsets changed")
        } else if !dirty.is_empty() && previous != new && self.config.strategy != Strategy::Dynamic {
            Some("content changed while time moved")
        } else if dirty_bits.intersects(DirtyBits::UNPATCHABLE) {
            Some("unpatchable change")
        } else {
            None
        };
        if let Some(reason) = reason {
            log::debug!("Consolidation at {previous} broken: {reason}");
            self.reset(store);
            return;
        }

        if !dirty.is_empty() {
            self.patch(store, &output, &dirty);
        }

        if previous != new {
            if let Some(output) = self.cache.remove(&previous) {
                self.cache.insert(new, output);
            }
        }
    }

    fn patch(&self, store: &RenderDataStore, output: &Output, dirty: &[(RenderDataKey, usize)]) {
        // Inputs per batch, in material order.
        let mut per_material: BTreeMap<u64, Vec<Input>> = BTreeMap::new();
        let mut info_cache = FxHashMap::default();
        for &(key, subset_index) in dirty {
            let Some(data) = store.get(key) else {
                continue;
            };
            let info = info_cache
                .entry(key)
                .or_insert_with(|| compute_subset_info(data, &self.config.display_settings, &self.materials));
            let Some(material) = info.materials.get(subset_index) else {
                continue;
            };
            let inputs = generate_inputs(
                key,
                data,
                subset_index,
                info.material_triangles(subset_index),
                self.config.max_cell_size,
            );
            per_material.entry(material.id()).or_default().extend(inputs);
        }

        let mut per_geom: BTreeMap<usize, Vec<Input>> = BTreeMap::new();
        for input in per_material.into_values().flatten() {
            let Some(geoms) = output.prim_to_geom.get(&(input.prim_path.clone(), input.subset_index)) else {
                log::trace!("'{}' subset {} has no batch", input.prim_path, input.subset_index);
                continue;
            };
            for &geom in geoms {
                per_geom.entry(geom).or_default().push(input.clone());
            }
        }

        for (geom, inputs) in &per_geom {
            if let Some(geom) = output.geoms.get(*geom) {
                geom.patch(inputs);
            }
        }
        log::debug!("Patched {} batches", per_geom.len());
    }

    fn random_material(&mut self) -> MaterialRef {
        let color = Vec3::new(
            self.rng.random_range(0.0..1.0f32),
            self.rng.random_range(0.0..1.0f32),
            self.rng.random_range(0.0..1.0f32),
        );
        MaterialRef::new(Material::from_display_color(color, false))
    }
}

/// Every subset of the visible primitives, in visit order.
pub(crate) fn source_render_data(store: &RenderDataStore, visible: &[RenderDataKey]) -> Vec<RenderDataInfo> {
    visible
        .iter()
        .filter_map(|&key| store.get(key).map(|data| (key, data)))
        .flat_map(|(key, data)| {
            (0..data.subsets.len()).map(move |subset_index| RenderDataInfo {
                key,
                prim_path: data.path.clone(),
                subset_index,
            })
        })
        .collect()
}
