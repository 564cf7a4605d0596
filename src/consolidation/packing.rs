//! Bin packing of subsets into cells.
//!
//! Cells are first-fit per material under two budgets: triangles
//! (`max_cell_size`) and instances (`max_instance_count`). When a primitive
//! has a split subset, each of its slices only goes into a cell holding
//! nothing but the same slice of the same primitive, so per-instance vertex
//! data is never duplicated across cells.

use std::collections::BTreeMap;

use crate::consolidation::config::ConsolidationConfig;
use crate::consolidation::input::{Cell, Input, compute_subset_info, generate_inputs};
use crate::errors::{BatchError, Result};
use crate::render_data::{RenderDataKey, RenderDataStore};
use crate::resources::material::{ColorMaterialCache, MaterialRef};

/// Cells per material ID. Ordered so the partition is reproducible.
pub type CellMap = BTreeMap<u64, Vec<Cell>>;

/// Packs every admissible, not yet consolidated subset of `keys`.
pub fn build_cells(
    store: &RenderDataStore,
    keys: &[RenderDataKey],
    config: &ConsolidationConfig,
    materials: &ColorMaterialCache,
) -> CellMap {
    let mut cells = CellMap::new();

    for &key in keys {
        let Some(prim) = store.get(key) else {
            continue;
        };
        if !prim.has_renderable_geometry() {
            continue;
        }

        let info = compute_subset_info(prim, &config.display_settings, materials);
        let num_instances = if prim.is_instanced() { prim.instancer.num_instances() } else { 1 };
        let mut has_split = false;

        for (index, subset) in prim.subsets.iter().enumerate() {
            let material_triangles = info.material_triangles(index);
            if material_triangles > config.max_triangles
                || info.triangles[index] > config.max_cell_size
                || num_instances * info.material_subset_count(index) > config.max_instance_count
                || subset.in_consolidation
                || !subset.has_geometry()
            {
                continue;
            }

            let inputs = generate_inputs(key, prim, index, material_triangles, config.max_cell_size);
            has_split |= inputs.len() > 1;

            let material = &info.materials[index];
            let material_cells = cells.entry(material.id()).or_default();
            for input in inputs {
                if let Err(e) = place_input(material_cells, material, input, config, has_split) {
                    log::warn!("Input skipped: {e}");
                }
            }
        }
    }

    if log::log_enabled!(log::Level::Debug) {
        for (material, material_cells) in &cells {
            log::debug!("Material #{material}: {} cells", material_cells.len());
        }
    }
    cells
}

/// Places `input` in the first cell with room, opening a new cell otherwise.
pub(crate) fn place_input(
    cells: &mut Vec<Cell>,
    material: &MaterialRef,
    input: Input,
    config: &ConsolidationConfig,
    has_split: bool,
) -> Result<()> {
    let triangles = input.triangle_count();
    if triangles > config.max_cell_size || input.num_instances() > config.max_instance_count {
        return Err(BatchError::CellCapacityExceeded {
            prim: input.prim_path.to_string(),
            triangles,
            max_cell_size: config.max_cell_size,
        });
    }

    let target = cells.iter_mut().find(|cell| {
        cell.num_tris + triangles <= config.max_cell_size
            && cell.num_instances + input.num_instances() <= config.max_instance_count
            && (!has_split || cell.inputs.iter().all(|other| other.same_slice(&input)))
    });

    log::trace!(
        "Placing '{}' subset {} ({} triangles)",
        input.prim_path,
        input.subset_index,
        triangles
    );
    match target {
        Some(cell) => cell.push(input),
        None => cells.push(Cell::new(material.clone(), input)),
    }
    Ok(())
}
