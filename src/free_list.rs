//! The intrusive free list: a LIFO stack of previously released cells,
//! linked through nodes written into the cells themselves.

use core::ptr::NonNull;

/// A free-list node. Written into a cell's storage when the cell is on the
/// free list; overwritten by the next object constructed in that cell.
#[repr(C)]
pub(crate) struct FreeNode {
    pub(crate) next: Option<NonNull<FreeNode>>,
}
