use glam::Affine3A;

use crate::errors::{BatchError, Result};
use crate::instancing::display::{InstanceDisplay, InstanceGeometry, SelectionMaterials};
use crate::resources::geometry::{BoundingBox, DrawItem};
use crate::resources::material::MaterialRef;

/// Pending work on instanced draw data, in increasing cost order.
///
/// Flagging never lowers a state: the stored state is always the maximum of
/// the current and the requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DirtyState {
    #[default]
    Clean,
    /// Same instance count, new transforms.
    NeedUpdate,
    /// Instance count, topology or materials changed.
    NeedRecreate,
}

impl DirtyState {
    #[inline]
    fn flag(&mut self, requested: DirtyState) {
        *self = (*self).max(requested);
    }
}

/// Input for one instance display object.
#[derive(Debug, Clone, Default)]
pub struct InstanceData {
    pub transforms: Vec<Affine3A>,
    pub num_instances: usize,
    pub viewport_material: Option<MaterialRef>,
}

impl InstanceData {
    fn set_matrices(&mut self, transforms: &[Affine3A]) {
        self.transforms.clear();
        self.transforms.extend_from_slice(transforms);
        self.num_instances = transforms.len();
    }
}

/// Instance transforms and selection of one primitive.
///
/// State is tracked separately for shaded and wireframe display, and for the
/// all-instances and selected-instances variants of each.
#[derive(Debug, Default)]
pub struct InstanceGenerator {
    transforms: Vec<Affine3A>,
    selected_transforms: Vec<Affine3A>,
    selection: Vec<bool>,

    shaded_data: InstanceData,
    shaded_selection_data: InstanceData,
    wire_data: InstanceData,
    wire_selection_data: InstanceData,

    shaded_state: DirtyState,
    shaded_selection_state: DirtyState,
    wire_state: DirtyState,
    wire_selection_state: DirtyState,

    cached_shaded: Vec<Vec<DrawItem>>,
    cached_selection_shaded: Vec<Vec<DrawItem>>,
    cached_wire: Vec<DrawItem>,
    cached_selection_wire: Vec<DrawItem>,
}

impl InstanceGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_clean(&mut self, wire: bool) {
        if wire {
            self.wire_state = DirtyState::Clean;
            self.wire_selection_state = DirtyState::Clean;
        } else {
            self.shaded_state = DirtyState::Clean;
            self.shaded_selection_state = DirtyState::Clean;
        }
    }

    pub fn num_instances(&self) -> usize {
        self.transforms.len()
    }

    pub fn transforms(&self) -> &[Affine3A] {
        &self.transforms
    }

    pub fn selected_transforms(&self) -> &[Affine3A] {
        &self.selected_transforms
    }

    pub fn state(&self, wire: bool) -> DirtyState {
        if wire { self.wire_state } else { self.shaded_state }
    }

    pub fn selection_state(&self, wire: bool) -> DirtyState {
        if wire { self.wire_selection_state } else { self.shaded_selection_state }
    }

    /// Stores new instance transforms.
    ///
    /// `recreate_instances` must be set when the topology, the material count
    /// or the instance count changed.
    pub fn request_update(&mut self, recreate_instances: bool, transforms: Vec<Affine3A>) {
        self.transforms = transforms;
        self.selection.resize(self.transforms.len(), false);

        let requested = if recreate_instances { DirtyState::NeedRecreate } else { DirtyState::NeedUpdate };
        self.shaded_state.flag(requested);
        self.wire_state.flag(requested);

        self.shaded_data.set_matrices(&self.transforms);
        self.wire_data.set_matrices(&self.transforms);

        self.request_selection_display_update(recreate_instances);
    }

    /// Recomputes the selected-instance transforms and flags the selection
    /// display. A different number of selected instances needs a recreate.
    pub fn request_selection_display_update(&mut self, recreate: bool) {
        let previous = self.shaded_selection_data.num_instances;

        self.selected_transforms = self
            .transforms
            .iter()
            .zip(&self.selection)
            .filter_map(|(transform, selected)| selected.then_some(*transform))
            .collect();

        let requested = if recreate || self.selected_transforms.len() != previous {
            DirtyState::NeedRecreate
        } else {
            DirtyState::NeedUpdate
        };
        self.shaded_selection_state.flag(requested);
        self.wire_selection_state.flag(requested);

        self.shaded_selection_data.set_matrices(&self.selected_transforms);
        self.wire_selection_data.set_matrices(&self.selected_transforms);
    }

    pub fn select(&mut self, instance: usize) -> Result<()> {
        let count = self.selection.len();
        let slot = self
            .selection
            .get_mut(instance)
            .ok_or(BatchError::InvalidInstanceIndex { index: instance, count })?;
        *slot = true;
        Ok(())
    }

    pub fn reset_selection(&mut self) {
        self.selection.clear();
        self.selection.resize(self.num_instances(), false);
    }

    pub fn selection(&self) -> &[bool] {
        &self.selection
    }

    pub fn set_subset_count(&mut self, subset_count: usize) {
        self.cached_shaded.resize_with(subset_count, Vec::new);
        self.cached_selection_shaded.resize_with(subset_count, Vec::new);
    }

    pub fn subset_count(&self) -> usize {
        self.cached_shaded.len()
    }

    /// World bounds of the selected instances, given the prototype extent.
    pub fn compute_selection_bounding_box(&self, extent: &BoundingBox) -> Option<BoundingBox> {
        if extent.is_empty() {
            return None;
        }
        self.selected_transforms
            .iter()
            .map(|transform| extent.transform(transform))
            .reduce(|a, b| a.union(&b))
    }

    /// Appends the draw items of one subset (or of the wireframe) to `out`.
    ///
    /// Instance data is created or updated according to the pending state;
    /// cached items are reused untouched while the state is clean. Returns
    /// the number of items appended.
    pub fn generate_instances(
        &mut self,
        geometry: &mut InstanceGeometry,
        material: Option<&MaterialRef>,
        selection_materials: &SelectionMaterials,
        wireframe: bool,
        subset: usize,
        out: &mut Vec<DrawItem>,
    ) -> usize {
        if !wireframe && subset >= self.cached_shaded.len() {
            log::warn!(
                "Invalid subset index {subset} for instancer with {} subsets",
                self.cached_shaded.len()
            );
            return 0;
        }

        let state = self.state(wireframe);
        if state == DirtyState::NeedRecreate {
            geometry.rebuild(false);
        }

        let (data, selection_data, selection_state, cached, cached_selection) = if wireframe {
            (
                &mut self.wire_data,
                &mut self.wire_selection_data,
                self.wire_selection_state,
                &mut self.cached_wire,
                &mut self.cached_selection_wire,
            )
        } else {
            (
                &mut self.shaded_data,
                &mut self.shaded_selection_data,
                self.shaded_selection_state,
                &mut self.cached_shaded[subset],
                &mut self.cached_selection_shaded[subset],
            )
        };

        data.viewport_material = material.cloned();
        let selection_material = selection_materials.get(wireframe);
        selection_data.viewport_material = Some(selection_material.clone());

        create_or_update(state, geometry.display_mut(false), data, cached);
        if cached.is_empty() {
            *cached = geometry
                .display()
                .generate_items(geometry.base(), material, wireframe, false);
        }
        let mut added = cached.len();
        out.extend(cached.iter().cloned());

        if selection_data.num_instances > 0 {
            // Geometry changes reach the selection display even when the selection did not change.
            let effective = state.max(selection_state);
            if effective == DirtyState::NeedRecreate {
                geometry.rebuild(true);
            }
            create_or_update(effective, geometry.display_mut(true), selection_data, cached_selection);
            if cached_selection.is_empty() {
                *cached_selection = geometry.selection_display().generate_items(
                    geometry.base(),
                    Some(selection_material),
                    wireframe,
                    true,
                );
            }
            added += cached_selection.len();
            out.extend(cached_selection.iter().cloned());
        }
        added
    }
}

fn create_or_update(
    state: DirtyState,
    display: &mut InstanceDisplay,
    data: &InstanceData,
    cached: &mut Vec<DrawItem>,
) {
    match state {
        DirtyState::NeedRecreate => {
            display.create_data(data);
            cached.clear();
        }
        DirtyState::NeedUpdate => {
            display.update_data(data);
            cached.clear();
        }
        DirtyState::Clean => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flagging_keeps_the_highest_state() {
        let mut state = DirtyState::NeedRecreate;
        state.flag(DirtyState::NeedUpdate);
        assert_eq!(state, DirtyState::NeedRecreate);

        let mut state = DirtyState::Clean;
        state.flag(DirtyState::NeedUpdate);
        assert_eq!(state, DirtyState::NeedUpdate);
    }

    #[test]
    fn selection_count_change_requires_recreate() {
        let mut generator = InstanceGenerator::new();
        generator.request_update(true, vec![Affine3A::IDENTITY; 3]);
        generator.set_clean(false);
        generator.set_clean(true);

        generator.select(1).unwrap();
        generator.request_selection_display_update(false);
        assert_eq!(generator.selection_state(false), DirtyState::NeedRecreate);
        generator.set_clean(false);

        // Same count, different instance.
        generator.reset_selection();
        generator.select(2).unwrap();
        generator.request_selection_display_update(false);
        assert_eq!(generator.selection_state(false), DirtyState::NeedUpdate);
    }
}
