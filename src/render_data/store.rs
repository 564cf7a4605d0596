//! Keyed storage of primitive render data.
//!
//! Keys are generational, so a key held across a frame boundary safely
//! misses once its primitive is removed. Lookups that hold both a key and a
//! path go through [`RenderDataStore::safe_get`], which falls back to the
//! path when the key went stale.

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{SlotMap, new_key_type};

use crate::render_data::path::PrimPath;
use crate::render_data::primitive::PrimitiveRenderData;
use crate::resources::deletion::DeletionQueue;

new_key_type! {
    /// Handle to a [`PrimitiveRenderData`] in a [`RenderDataStore`].
    pub struct RenderDataKey;
}

#[derive(Debug)]
pub struct RenderDataStore {
    data: SlotMap<RenderDataKey, PrimitiveRenderData>,
    index: FxHashMap<PrimPath, RenderDataKey>,
    pending: DeletionQueue<PrimitiveRenderData>,
}

impl Default for RenderDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDataStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: SlotMap::with_key(),
            index: FxHashMap::default(),
            pending: DeletionQueue::new(),
        }
    }

    /// Inserts `data`, replacing any entry with the same path.
    ///
    /// The store's thread becomes the one releasing `data`'s retired
    /// resources, whichever thread built it.
    pub fn insert(&mut self, mut data: PrimitiveRenderData) -> RenderDataKey {
        data.set_deletion_owner(self.pending.owner());
        let path = data.path.clone();
        if let Some(previous) = self.index.remove(&path) {
            if let Some(old) = self.data.remove(previous) {
                self.pending.push(old);
            }
        }
        let key = self.data.insert(data);
        self.index.insert(path, key);
        key
    }

    /// Removes the entry. Its storage is released at the next garbage collection.
    pub fn remove(&mut self, path: &PrimPath) -> bool {
        let Some(key) = self.index.remove(path) else {
            return false;
        };
        match self.data.remove(key) {
            Some(old) => {
                self.pending.push(old);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: RenderDataKey) -> Option<&PrimitiveRenderData> {
        self.data.get(key)
    }

    pub fn get_mut(&mut self, key: RenderDataKey) -> Option<&mut PrimitiveRenderData> {
        self.data.get_mut(key)
    }

    pub fn key_of(&self, path: &PrimPath) -> Option<RenderDataKey> {
        self.index.get(path).copied()
    }

    pub fn by_path(&self, path: &PrimPath) -> Option<&PrimitiveRenderData> {
        self.key_of(path).and_then(|key| self.data.get(key))
    }

    pub fn by_path_mut(&mut self, path: &PrimPath) -> Option<&mut PrimitiveRenderData> {
        let key = self.key_of(path)?;
        self.data.get_mut(key)
    }

    /// Resolves `key` if it still designates `path`, otherwise looks `path` up.
    pub fn safe_get(&self, key: RenderDataKey, path: &PrimPath) -> Option<&PrimitiveRenderData> {
        match self.data.get(key) {
            Some(data) if &data.path == path => Some(data),
            _ => self.by_path(path),
        }
    }

    pub fn safe_get_mut(&mut self, key: RenderDataKey, path: &PrimPath) -> Option<&mut PrimitiveRenderData> {
        let key = match self.data.get(key) {
            Some(data) if &data.path == path => key,
            _ => self.key_of(path)?,
        };
        self.data.get_mut(key)
    }

    /// Keys of the entries that produce draws this frame, in path order.
    pub fn visible_keys(&self) -> Vec<RenderDataKey> {
        let mut visible: Vec<(&PrimPath, RenderDataKey)> = self
            .data
            .iter()
            .filter(|(_, data)| is_drawn(data))
            .map(|(key, data)| (&data.path, key))
            .collect();
        visible.sort_unstable_by(|a, b| a.0.cmp(b.0));
        visible.into_iter().map(|(_, key)| key).collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RenderDataKey, &PrimitiveRenderData)> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RenderDataKey, &mut PrimitiveRenderData)> {
        self.data.iter_mut()
    }

    /// Applies a viewport selection.
    ///
    /// `selection` maps primitive paths to selected instance indices; an
    /// empty list selects the whole primitive. Entries not named are
    /// deselected.
    pub fn apply_selection(&mut self, selection: &FxHashMap<PrimPath, Vec<usize>>) {
        let mut touched = FxHashSet::default();
        for (path, instances) in selection {
            let Some(data) = self.by_path_mut(path) else {
                log::debug!("Selection names unknown primitive '{path}'");
                continue;
            };
            if data.is_instanced() && !instances.is_empty() {
                data.set_selected(false);
                if let Err(e) = data.set_instance_selection(instances) {
                    log::warn!("Selection of '{path}' ignored: {e}");
                }
            } else {
                data.set_selected(true);
            }
            touched.insert(path.clone());
        }

        for data in self.data.values_mut() {
            if touched.contains(&data.path) {
                continue;
            }
            data.set_selected(false);
            if data.instancer.selection().iter().any(|s| *s) {
                // Cannot fail: no index is selected.
                let _ = data.set_instance_selection(&[]);
            }
        }
    }

    /// Releases removed entries and their retired buffers. Main thread only.
    pub fn garbage_collect(&mut self) -> usize {
        let mut released = 0;
        match self.pending.drain() {
            Ok(removed) => {
                released += removed.iter().map(|data| data.collect_garbage() + 1).sum::<usize>();
            }
            Err(e) => log::warn!("Render data garbage collection skipped: {e}"),
        }
        for data in self.data.values() {
            released += data.collect_garbage();
        }
        if released > 0 {
            log::debug!("Released {released} retired render objects");
        }
        released
    }
}

fn is_drawn(data: &PrimitiveRenderData) -> bool {
    data.visible
        && data.render_tag_active
        && !data.subsets.is_empty()
        && !(data.is_instanced() && data.instancer.num_instances() == 0)
}
