//! Change Tracker and Buffer Tests
//!
//! Tests for:
//! - Dirty bit set / check / clear helpers
//! - Content vs. size flag groups
//! - In-place buffer writes, range locking and versioning
//! - Deferred deletion queue ownership

use glam::Vec3;

use myth_batch::errors::BatchError;
use myth_batch::resources::change_tracker::{DirtyBits, check_dirty, clear_dirty_bits, set_dirty};
use myth_batch::resources::{DeletionQueue, VertexBuffer};

// ============================================================================
// Dirty Bits
// ============================================================================

#[test]
fn set_and_check_dirty() {
    let mut bits = DirtyBits::CLEAN;
    assert!(bits.is_clean());

    set_dirty(&mut bits, DirtyBits::POINTS);
    assert!(check_dirty(bits, DirtyBits::POINTS));
    assert!(!check_dirty(bits, DirtyBits::NORMALS));
    // Any overlap counts.
    assert!(check_dirty(bits, DirtyBits::POINTS | DirtyBits::NORMALS));
}

#[test]
fn clear_resets_everything() {
    let mut bits = DirtyBits::ALL_DIRTY;
    clear_dirty_bits(&mut bits);
    assert_eq!(bits, DirtyBits::CLEAN);
}

#[test]
fn content_changes_are_patchable() {
    for flag in [
        DirtyBits::POINTS,
        DirtyBits::NORMALS,
        DirtyBits::UVS,
        DirtyBits::TRANSFORMS,
        DirtyBits::SELECTION_HIGHLIGHT,
    ] {
        assert!(!flag.intersects(DirtyBits::UNPATCHABLE), "{flag:?}");
    }
}

#[test]
fn size_material_and_visibility_changes_are_not_patchable() {
    for flag in [
        DirtyBits::POINTS_SIZE,
        DirtyBits::NORMALS_SIZE,
        DirtyBits::UVS_SIZE,
        DirtyBits::TRANSFORMS_SIZE,
        DirtyBits::INDICES,
        DirtyBits::VISIBILITY,
        DirtyBits::MATERIAL,
    ] {
        assert!(flag.intersects(DirtyBits::UNPATCHABLE), "{flag:?}");
    }
    assert!(DirtyBits::SIZE_CHANGES.contains(DirtyBits::POINTS_SIZE | DirtyBits::INDICES_SIZE));
}

// ============================================================================
// Buffers
// ============================================================================

#[test]
fn write_all_requires_matching_length() {
    let buffer = VertexBuffer::from_slice(&[Vec3::ZERO; 3], wgpu::BufferUsages::VERTEX, Some("points"));
    buffer.write_all(&[Vec3::ONE; 3]).unwrap();
    assert_eq!(buffer.to_vec(), vec![Vec3::ONE; 3]);
    assert_eq!(buffer.version(), 1);

    let err = buffer.write_all(&[Vec3::ONE; 2]).unwrap_err();
    assert_eq!(
        err,
        BatchError::BufferSizeMismatch {
            label: "points".to_string(),
            expected: 3,
            actual: 2,
        }
    );
    assert_eq!(buffer.version(), 1);
}

#[test]
fn range_lock_exposes_only_the_range() {
    let buffer = VertexBuffer::zeroed(6, wgpu::BufferUsages::VERTEX, None);
    let len = buffer
        .with_range_mut(2..5, |dest| {
            dest.fill(Vec3::X);
            dest.len()
        })
        .unwrap();
    assert_eq!(len, 3);

    let data = buffer.to_vec();
    assert_eq!(data[1], Vec3::ZERO);
    assert_eq!(data[2], Vec3::X);
    assert_eq!(data[4], Vec3::X);
    assert_eq!(data[5], Vec3::ZERO);
}

#[test]
fn clones_share_storage_and_identity() {
    let a = VertexBuffer::zeroed(2, wgpu::BufferUsages::VERTEX, None);
    let b = a.clone();
    let c = VertexBuffer::zeroed(2, wgpu::BufferUsages::VERTEX, None);
    assert_eq!(a, b);
    assert!(a.ptr_eq(&b));
    assert_ne!(a, c);

    b.clear();
    assert!(a.is_empty());
}

// ============================================================================
// Deletion Queue
// ============================================================================

#[test]
fn deletion_queue_drains_on_owner_thread() {
    let queue = DeletionQueue::new();
    queue.push(1u32);
    queue.push(2u32);
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.drain().unwrap(), vec![1, 2]);
    assert!(queue.is_empty());
}
