//! Error Types
//!
//! This module defines the error types used throughout the batching layer.
//!
//! # Overview
//!
//! The main error type [`BatchError`] covers the failure modes of the
//! lower-level helpers:
//! - CPU-side buffer range and size checks
//! - Out-of-range subset and instance lookups
//! - Packing capacity violations
//! - Resource destruction requested from a foreign thread
//!
//! The consolidator itself never surfaces these to the draw submitter. They
//! are logged and the affected primitive is drawn individually for the frame.
//!
//! # Usage
//!
//! Fallible helpers return [`Result<T>`] which is an alias for
//! `std::result::Result<T, BatchError>`.
//!
//! ```rust,ignore
//! use myth_batch::errors::Result;
//!
//! fn patch(buffer: &VertexBuffer, data: &[Vec3]) -> Result<()> {
//!     buffer.write_range(0, data)
//! }
//! ```

use thiserror::Error;

/// The main error type for the batching layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    // ========================================================================
    // Buffer Errors
    // ========================================================================
    /// A write or lock touched elements past the end of a buffer.
    #[error("Buffer '{label}' range out of bounds: offset {offset} + len {len} > capacity {capacity}")]
    BufferRangeOutOfBounds {
        /// Debug label of the buffer
        label: String,
        /// First element of the requested range
        offset: usize,
        /// Number of elements requested
        len: usize,
        /// Number of elements held by the buffer
        capacity: usize,
    },

    /// An in-place copy was attempted with a source of a different length.
    #[error("Buffer '{label}' size mismatch: expected {expected} elements, got {actual}")]
    BufferSizeMismatch {
        /// Debug label of the buffer
        label: String,
        /// Element count of the buffer
        expected: usize,
        /// Element count of the source data
        actual: usize,
    },

    /// Two fill jobs were assigned overlapping destination ranges.
    #[error("Overlapping destination ranges at vertex {start}")]
    OverlappingRanges {
        /// First vertex of the offending range
        start: usize,
    },

    // ========================================================================
    // Packing Errors
    // ========================================================================
    /// An input does not fit any cell, even an empty one.
    #[error("Input for '{prim}' needs {triangles} triangles, cell capacity is {max_cell_size}")]
    CellCapacityExceeded {
        /// Path of the primitive that produced the input
        prim: String,
        /// Triangle count of the input, all instances included
        triangles: usize,
        /// Configured cell capacity
        max_cell_size: usize,
    },

    // ========================================================================
    // Render Data Errors
    // ========================================================================
    /// Subset index out of range for a primitive.
    #[error("Invalid subset index {index} for '{prim}' ({count} subsets)")]
    InvalidSubsetIndex {
        /// Path of the primitive
        prim: String,
        /// The invalid index
        index: usize,
        /// Number of subsets the primitive holds
        count: usize,
    },

    /// Instance index out of range for an instancer.
    #[error("Invalid instance index {index} ({count} instances)")]
    InvalidInstanceIndex {
        /// The invalid index
        index: usize,
        /// Number of instances held by the instancer
        count: usize,
    },

    // ========================================================================
    // Threading Errors
    // ========================================================================
    /// A pending-deletion queue was drained from a thread that does not own it.
    #[error("Deletion queue drained from a foreign thread: {0}")]
    ForeignThread(String),
}

/// Alias for `Result<T, BatchError>`.
pub type Result<T> = std::result::Result<T, BatchError>;
