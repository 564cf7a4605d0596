//! Dirty-bit tracking for primitive subsets.
//!
//! Every [`SubsetRenderData`](crate::render_data::SubsetRenderData) carries a
//! [`DirtyBits`] mask describing what changed since its buffers were last
//! synchronized. Content flags (`POINTS`) and size flags (`POINTS_SIZE`) are
//! kept apart: a content change can be patched in place, a size change needs
//! new buffers.

use bitflags::bitflags;

bitflags! {
    /// Change flags for one subset.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirtyBits: u32 {
        const POINTS              = 1 << 0;
        const POINTS_SIZE         = 1 << 1;
        const NORMALS             = 1 << 2;
        const NORMALS_SIZE        = 1 << 3;
        const UVS                 = 1 << 4;
        const UVS_SIZE            = 1 << 5;
        const VERTEX_COLORS       = 1 << 6;
        const VERTEX_COLORS_SIZE  = 1 << 7;
        const INDICES             = 1 << 8;
        const INDICES_SIZE        = 1 << 9;
        const TRANSFORMS          = 1 << 10;
        const TRANSFORMS_SIZE     = 1 << 11;
        const VISIBILITY          = 1 << 12;
        const MATERIAL            = 1 << 13;
        const SELECTION_HIGHLIGHT = 1 << 14;
    }
}

impl DirtyBits {
    pub const CLEAN: Self = Self::empty();
    pub const ALL_DIRTY: Self = Self::all();

    /// Every flag reporting an element-count change.
    pub const SIZE_CHANGES: Self = Self::POINTS_SIZE
        .union(Self::NORMALS_SIZE)
        .union(Self::UVS_SIZE)
        .union(Self::VERTEX_COLORS_SIZE)
        .union(Self::INDICES_SIZE)
        .union(Self::TRANSFORMS_SIZE);

    /// Changes a merged batch cannot absorb with an in-place vertex patch.
    pub const UNPATCHABLE: Self = Self::SIZE_CHANGES
        .union(Self::INDICES)
        .union(Self::VISIBILITY)
        .union(Self::MATERIAL);

    #[inline]
    #[must_use]
    pub fn is_clean(self) -> bool {
        self.is_empty()
    }
}

/// Adds `flag` to `bits`.
#[inline]
pub fn set_dirty(bits: &mut DirtyBits, flag: DirtyBits) {
    bits.insert(flag);
}

/// Returns `true` when `bits` contains any of the flags in `flag`.
#[inline]
#[must_use]
pub fn check_dirty(bits: DirtyBits, flag: DirtyBits) -> bool {
    bits.intersects(flag)
}

#[inline]
pub fn clear_dirty_bits(bits: &mut DirtyBits) {
    *bits = DirtyBits::CLEAN;
}
