use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;
use glam::Vec3;
use parking_lot::{RwLock, RwLockReadGuard};

use crate::errors::{BatchError, Result};

// Global buffer ID generator
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

/// Typed CPU-side mirror of a GPU buffer.
///
/// Holds the element data behind a lock together with a version counter that
/// is bumped on every write, so an uploader can skip buffers whose version it
/// has already seen.
pub struct DataBuffer<T: Pod> {
    pub id: u64,
    pub label: String,
    version: AtomicU64,
    data: RwLock<Vec<T>>,
    pub usage: wgpu::BufferUsages,
}

/// Cheap, shareable handle to a [`DataBuffer`].
///
/// Equality and hashing use the buffer ID, not the contents.
pub struct BufferRef<T: Pod>(Arc<DataBuffer<T>>);

/// Vertex stream element buffer (points, normals, selection, uvs).
pub type VertexBuffer = BufferRef<Vec3>;

/// 32-bit index buffer.
pub type IndexBuffer = BufferRef<u32>;

impl<T: Pod> Clone for BufferRef<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Pod> PartialEq for BufferRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl<T: Pod> Eq for BufferRef<T> {}

impl<T: Pod> std::hash::Hash for BufferRef<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl<T: Pod> fmt::Debug for BufferRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRef")
            .field("id", &self.0.id)
            .field("label", &self.0.label)
            .field("len", &self.len())
            .field("version", &self.version())
            .finish()
    }
}

impl<T: Pod> BufferRef<T> {
    pub fn new(data: Vec<T>, usage: wgpu::BufferUsages, label: Option<&str>) -> Self {
        Self(Arc::new(DataBuffer {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            label: label.unwrap_or("Buffer").to_string(),
            version: AtomicU64::new(0),
            data: RwLock::new(data),
            usage,
        }))
    }

    pub fn from_slice(data: &[T], usage: wgpu::BufferUsages, label: Option<&str>) -> Self {
        Self::new(data.to_vec(), usage, label)
    }

    /// Allocates `len` zeroed elements.
    pub fn zeroed(len: usize, usage: wgpu::BufferUsages, label: Option<&str>) -> Self {
        Self::new(vec![T::zeroed(); len], usage, label)
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.0.version.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn usage(&self) -> wgpu::BufferUsages {
        self.0.usage
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn len(&self) -> usize {
        self.0.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.data.read().is_empty()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.0.data.read()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.0.data.read().clone()
    }

    /// Copies `data` over the whole buffer. The element count must match.
    pub fn write_all(&self, data: &[T]) -> Result<()> {
        {
            let mut inner = self.0.data.write();
            if inner.len() != data.len() {
                return Err(BatchError::BufferSizeMismatch {
                    label: self.0.label.clone(),
                    expected: inner.len(),
                    actual: data.len(),
                });
            }
            inner.copy_from_slice(data);
        }
        self.bump();
        Ok(())
    }

    /// Copies `data` starting at element `offset`.
    pub fn write_range(&self, offset: usize, data: &[T]) -> Result<()> {
        self.with_range_mut(offset..offset + data.len(), |dest| dest.copy_from_slice(data))
    }

    /// Locks `range` for writing and hands it to `f`.
    ///
    /// The lock is held for the duration of `f`; the version is bumped once
    /// afterwards.
    pub fn with_range_mut<R>(&self, range: Range<usize>, f: impl FnOnce(&mut [T]) -> R) -> Result<R> {
        let result = {
            let mut inner = self.0.data.write();
            let capacity = inner.len();
            let Some(dest) = inner.get_mut(range.clone()) else {
                return Err(BatchError::BufferRangeOutOfBounds {
                    label: self.0.label.clone(),
                    offset: range.start,
                    len: range.len(),
                    capacity,
                });
            };
            f(dest)
        };
        self.bump();
        Ok(result)
    }

    /// Drops every element. The buffer becomes invalid for drawing and
    /// is pruned from its geometry at the next cleanup.
    pub fn clear(&self) {
        self.0.data.write().clear();
        self.bump();
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn bump(&self) {
        self.0.version.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T: Pod> std::ops::Deref for BufferRef<T> {
    type Target = DataBuffer<T>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
