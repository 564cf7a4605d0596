//! Render Data Tests
//!
//! Tests for:
//! - Setter dirty flags (content vs. size)
//! - UpdateRenderGeometry: in-place copy, reallocation, empty streams, sharing
//! - Selection stream synthesis and UV channel grouping
//! - Subset replacement and deferred destruction, including data built off the store thread
//! - RenderDataStore: stale keys, visibility filter, selection
//! - BoundingBox helpers

use glam::{Affine3A, Vec3};
use rustc_hash::FxHashMap;

use myth_batch::render_data::{PrimPath, PrimitiveRenderData, RenderDataStore, SubsetBinding, UvChannel};
use myth_batch::resources::geometry::{BoundingBox, VertexStream};
use myth_batch::resources::{ColorMaterialCache, DirtyBits, DisplayMode, DisplaySettings, Material, MaterialData, MaterialRef};

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    approx(a.x, b.x) && approx(a.y, b.y) && approx(a.z, b.z)
}

fn quad(path: &str) -> PrimitiveRenderData {
    let mut prim = PrimitiveRenderData::new(path);
    prim.set_points(vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y]);
    prim.set_normals(vec![Vec3::Z; 4]);
    prim.add_subset(
        "/materials/a",
        vec![[0, 1, 2]],
        vec![0, 1, 1, 2, 2, 0],
    );
    prim.add_subset("/materials/b", vec![[0, 2, 3]], vec![2, 3, 3, 0]);
    prim
}

fn points_buffer(prim: &PrimitiveRenderData, subset: usize) -> myth_batch::resources::VertexBuffer {
    prim.subsets[subset]
        .geometry
        .draw_geometry()
        .stream(VertexStream::Points)
        .cloned()
        .unwrap()
}

// ============================================================================
// Dirty Flags
// ============================================================================

#[test]
fn new_subsets_start_fully_dirty() {
    let prim = quad("/quad");
    assert!(prim.subsets.iter().all(|s| s.dirty_bits == DirtyBits::ALL_DIRTY));
}

#[test]
fn same_size_points_only_flag_content() {
    let mut prim = quad("/quad");
    prim.update_render_geometry(false);

    prim.set_points(vec![Vec3::ONE; 4]);
    let bits = prim.subsets[0].dirty_bits;
    assert!(bits.contains(DirtyBits::POINTS));
    assert!(!bits.contains(DirtyBits::POINTS_SIZE));

    prim.set_points(vec![Vec3::ONE; 5]);
    assert!(prim.subsets[0].dirty_bits.contains(DirtyBits::POINTS_SIZE));
}

#[test]
fn unchanged_visibility_is_not_flagged() {
    let mut prim = quad("/quad");
    prim.update_render_geometry(false);
    prim.set_visible(true);
    assert!(prim.subsets[0].dirty_bits.is_clean());
    prim.set_visible(false);
    assert!(prim.subsets[0].dirty_bits.contains(DirtyBits::VISIBILITY));
}

#[test]
fn invalid_subset_index_is_an_error() {
    let mut prim = quad("/quad");
    assert!(prim.set_subset_indices(7, Vec::new(), Vec::new()).is_err());
}

// ============================================================================
// UpdateRenderGeometry
// ============================================================================

#[test]
fn update_clears_dirty_bits_and_shares_buffers() {
    let mut prim = quad("/quad");
    prim.update_render_geometry(false);

    assert!(prim.subsets.iter().all(|s| s.dirty_bits.is_clean()));
    let a = points_buffer(&prim, 0);
    let b = points_buffer(&prim, 1);
    assert!(a.ptr_eq(&b));

    let wire = prim.wireframe.draw_geometry();
    assert!(wire.stream(VertexStream::Points).unwrap().ptr_eq(&a));
    assert!(wire.stream(VertexStream::Uvs).is_none());
    // Both subsets' wire indices in one buffer.
    assert_eq!(wire.index_count(), 10);
    assert_eq!(wire.primitive_count(), 5);
}

#[test]
fn same_size_update_copies_in_place() {
    let mut prim = quad("/quad");
    prim.update_render_geometry(false);
    let before = points_buffer(&prim, 0);
    let version = before.version();

    prim.set_points(vec![Vec3::splat(2.0); 4]);
    prim.update_render_geometry(false);

    let after = points_buffer(&prim, 0);
    assert!(after.ptr_eq(&before));
    assert!(after.version() > version);
    assert_eq!(after.to_vec(), vec![Vec3::splat(2.0); 4]);
}

#[test]
fn resized_stream_is_reallocated_for_every_subset() {
    let mut prim = quad("/quad");
    prim.update_render_geometry(false);
    let before = points_buffer(&prim, 0);

    prim.set_points(vec![Vec3::ONE; 6]);
    prim.update_render_geometry(false);

    let a = points_buffer(&prim, 0);
    let b = points_buffer(&prim, 1);
    assert!(!a.ptr_eq(&before));
    assert!(a.ptr_eq(&b));
    assert_eq!(a.len(), 6);
}

#[test]
fn emptied_stream_is_pruned_and_queued_for_deletion() {
    let mut prim = quad("/quad");
    prim.update_render_geometry(false);
    let normals = prim.subsets[0]
        .geometry
        .draw_geometry()
        .stream(VertexStream::Normals)
        .cloned()
        .unwrap();

    prim.set_normals(Vec::new());
    prim.update_render_geometry(false);

    assert!(normals.is_empty());
    assert!(prim.subsets[0].geometry.draw_geometry().stream(VertexStream::Normals).is_none());
    assert!(prim.wireframe.draw_geometry().stream(VertexStream::Normals).is_none());
    assert_eq!(prim.pending_deletions(), 1);
    assert_eq!(prim.collect_garbage(), 1);
    assert_eq!(prim.pending_deletions(), 0);
}

#[test]
fn clean_update_touches_nothing() {
    let mut prim = quad("/quad");
    prim.update_render_geometry(false);
    let buffer = points_buffer(&prim, 0);
    let version = buffer.version();

    prim.update_render_geometry(false);
    assert_eq!(buffer.version(), version);

    prim.update_render_geometry(true);
    assert!(buffer.version() > version);
}

#[test]
fn selection_stream_is_synthesized() {
    let mut prim = quad("/quad");
    prim.update_render_geometry(false);
    let selection = prim.subsets[0]
        .geometry
        .draw_geometry()
        .stream(VertexStream::Selection)
        .cloned()
        .unwrap();
    assert_eq!(selection.to_vec(), vec![Vec3::ZERO; 4]);

    prim.set_selected(true);
    prim.update_render_geometry(false);
    assert_eq!(selection.to_vec(), vec![Vec3::ONE; 4]);
}

#[test]
fn subsets_read_the_uv_set_of_their_material() {
    let mut prim = quad("/quad");
    prim.set_uvs(vec![
        UvChannel::new("st", vec![Vec3::ZERO; 4]),
        UvChannel::new("st1", vec![Vec3::ONE; 4]),
    ]);
    prim.set_material_diffuse_uv("/materials/b", "st1");
    prim.update_render_geometry(false);

    let uv = |subset: usize| {
        prim.subsets[subset]
            .geometry
            .draw_geometry()
            .stream(VertexStream::Uvs)
            .cloned()
            .unwrap()
    };
    assert_eq!(uv(0).to_vec(), vec![Vec3::ZERO; 4]);
    assert_eq!(uv(1).to_vec(), vec![Vec3::ONE; 4]);
    assert!(!uv(0).ptr_eq(&uv(1)));
    assert_eq!(prim.uv_channel_for(&PrimPath::new("/materials/unknown")), 0);
}

// ============================================================================
// Subsets & Materials
// ============================================================================

#[test]
fn replaced_subsets_keep_surviving_bindings() {
    let mut prim = quad("/quad");
    prim.update_render_geometry(false);

    prim.replace_subsets(vec![SubsetBinding {
        material_id: PrimPath::new("/materials/b"),
        indices: vec![[0, 2, 3], [0, 1, 2]],
        wire_indices: Vec::new(),
    }]);

    assert_eq!(prim.subsets.len(), 1);
    assert_eq!(prim.subsets[0].material_id.as_str(), "/materials/b");
    assert!(prim.subsets[0].dirty_bits.contains(DirtyBits::INDICES_SIZE));
    assert_eq!(prim.pending_deletions(), 1);
    assert_eq!(prim.instancer.subset_count(), 1);
    assert_eq!(prim.collect_garbage(), 1);
}

#[test]
fn viewport_material_follows_display_mode() -> anyhow::Result<()> {
    let materials = ColorMaterialCache::new();
    let mut prim = quad("/quad");
    let surface = MaterialRef::new(Material::new("surface", Vec3::ONE, Vec3::ZERO, false));
    prim.set_subset_material(
        0,
        "/materials/a",
        Some(MaterialData {
            shaded: Some(surface.clone()),
            instanced: None,
        }),
    )?;

    let display = DisplaySettings::default();
    let color = prim.resolve_viewport_material(&prim.subsets[0], &display, false, &materials);
    assert_eq!(color, materials.get(prim.display_color, false));

    let preview = DisplaySettings {
        mode: DisplayMode::PreviewSurface,
        ..Default::default()
    };
    assert_eq!(prim.resolve_viewport_material(&prim.subsets[0], &preview, false, &materials), surface);
    // No preview material bound: falls back to display colour.
    assert_eq!(
        prim.resolve_viewport_material(&prim.subsets[1], &preview, false, &materials),
        materials.get(prim.display_color, false)
    );

    let wire = DisplaySettings {
        mode: DisplayMode::WireColor,
        wire_color: Vec3::new(0.1, 0.2, 0.3),
    };
    assert_eq!(
        prim.resolve_viewport_material(&prim.subsets[0], &wire, false, &materials),
        materials.get(Vec3::new(0.1, 0.2, 0.3), false)
    );
    Ok(())
}

// ============================================================================
// RenderDataStore
// ============================================================================

#[test]
fn stale_key_falls_back_to_path() {
    let mut store = RenderDataStore::new();
    let old_key = store.insert(quad("/quad"));
    let path = PrimPath::new("/quad");

    assert!(store.remove(&path));
    assert!(store.safe_get(old_key, &path).is_none());

    let new_key = store.insert(quad("/quad"));
    assert_ne!(old_key, new_key);
    assert!(store.get(old_key).is_none());
    let found = store.safe_get(old_key, &path).unwrap();
    assert_eq!(found.path, path);

    // Key valid, path different: the path wins.
    store.insert(quad("/other"));
    assert_eq!(store.safe_get(new_key, &PrimPath::new("/other")).unwrap().path.as_str(), "/other");
    assert!(store.safe_get(new_key, &PrimPath::new("/missing")).is_none());
}

#[test]
fn visible_keys_filter_and_order() {
    let mut store = RenderDataStore::new();
    store.insert(quad("/b"));
    store.insert(quad("/a"));

    let mut hidden = quad("/hidden");
    hidden.set_visible(false);
    store.insert(hidden);

    let mut untagged = quad("/untagged");
    untagged.set_render_tag_active(false);
    store.insert(untagged);

    store.insert(PrimitiveRenderData::new("/empty"));

    let mut no_instances = PrimitiveRenderData::new_instanced("/instancer", Vec::new());
    no_instances.add_subset("/materials/a", vec![[0, 1, 2]], Vec::new());
    store.insert(no_instances);

    let paths: Vec<&str> = store
        .visible_keys()
        .into_iter()
        .map(|key| store.get(key).unwrap().path.as_str())
        .collect();
    assert_eq!(paths, vec!["/a", "/b"]);
}

#[test]
fn removed_data_is_released_by_garbage_collection() {
    let mut store = RenderDataStore::new();
    store.insert(quad("/quad"));
    store.remove(&PrimPath::new("/quad"));
    assert!(store.is_empty());
    assert_eq!(store.garbage_collect(), 1);
    assert_eq!(store.garbage_collect(), 0);
}

#[test]
fn data_built_on_a_worker_is_released_by_the_store_thread() {
    let built = std::thread::spawn(|| {
        let mut prim = quad("/worker");
        prim.update_render_geometry(false);
        prim
    })
    .join()
    .unwrap();

    let mut store = RenderDataStore::new();
    store.insert(built);
    let prim = store.by_path_mut(&PrimPath::new("/worker")).unwrap();
    prim.replace_subsets(vec![SubsetBinding {
        material_id: PrimPath::new("/materials/a"),
        indices: vec![[0, 1, 2]],
        wire_indices: Vec::new(),
    }]);
    assert_eq!(prim.pending_deletions(), 1);

    assert_eq!(store.garbage_collect(), 1);
    assert_eq!(store.by_path(&PrimPath::new("/worker")).unwrap().pending_deletions(), 0);
    assert_eq!(store.garbage_collect(), 0);
}

#[test]
fn selection_is_applied_and_cleared() {
    let mut store = RenderDataStore::new();
    store.insert(quad("/a"));
    store.insert(quad("/b"));
    let mut instanced = PrimitiveRenderData::new_instanced("/inst", vec![Affine3A::IDENTITY; 3]);
    instanced.add_subset("/materials/a", vec![[0, 1, 2]], Vec::new());
    store.insert(instanced);

    let mut selection = FxHashMap::default();
    selection.insert(PrimPath::new("/a"), Vec::new());
    selection.insert(PrimPath::new("/inst"), vec![2]);
    store.apply_selection(&selection);

    assert!(store.by_path(&PrimPath::new("/a")).unwrap().selected);
    assert!(!store.by_path(&PrimPath::new("/b")).unwrap().selected);
    let inst = store.by_path(&PrimPath::new("/inst")).unwrap();
    assert_eq!(inst.instancer.selection(), &[false, false, true]);
    assert_eq!(inst.instancer.selected_transforms().len(), 1);

    store.apply_selection(&FxHashMap::default());
    assert!(!store.by_path(&PrimPath::new("/a")).unwrap().selected);
    let inst = store.by_path(&PrimPath::new("/inst")).unwrap();
    assert!(inst.instancer.selection().iter().all(|s| !s));
}

// ============================================================================
// Bounds
// ============================================================================

#[test]
fn world_bounds_follow_transform() {
    let mut prim = quad("/quad");
    prim.set_transform(Affine3A::from_translation(Vec3::new(10.0, 0.0, 0.0)));
    let bb = prim.bounding_box.unwrap();
    assert!(vec3_approx(bb.min, Vec3::new(10.0, 0.0, 0.0)));
    assert!(vec3_approx(bb.max, Vec3::new(11.0, 1.0, 0.0)));
}

#[test]
fn instanced_bounds_cover_every_instance() {
    let mut prim = PrimitiveRenderData::new_instanced(
        "/inst",
        vec![
            Affine3A::IDENTITY,
            Affine3A::from_translation(Vec3::new(0.0, 5.0, 0.0)),
        ],
    );
    prim.set_points(vec![Vec3::ZERO, Vec3::ONE]);
    let bb = prim.bounding_box.unwrap();
    assert!(vec3_approx(bb.min, Vec3::ZERO));
    assert!(vec3_approx(bb.max, Vec3::new(1.0, 6.0, 1.0)));
}

#[test]
fn bbox_from_points_and_union() {
    assert!(BoundingBox::from_points(&[]).is_none());
    let a = BoundingBox::from_points(&[Vec3::ZERO, Vec3::ONE]).unwrap();
    let b = BoundingBox::from_points(&[Vec3::splat(-1.0)]).unwrap();
    let u = a.union(&b);
    assert!(vec3_approx(u.min, Vec3::splat(-1.0)));
    assert!(vec3_approx(u.max, Vec3::ONE));
    assert!(vec3_approx(u.center(), Vec3::ZERO));
    assert!(vec3_approx(u.size(), Vec3::splat(2.0)));
}
