//! Slab carving: a large region split into fixed, aligned cells, handed out
//! in bump order. A slab has no notion of which of its cells are live vs
//! free — that bookkeeping lives one layer up, in the free list — it only
//! ever hands out the next never-used cell.

use core::alloc::Layout;
use core::mem::{align_of, size_of, ManuallyDrop};
use core::ptr::NonNull;

use crate::free_list::FreeNode;
use crate::pool::Config;

/// Header prefixed to every slab region, followed immediately (after
/// alignment padding) by `Config::CELLS_PER_SLAB` cells.
#[repr(C)]
pub(crate) struct SlabHeader {
    /// Intrusive link to the next-older slab in the pool's slab list.
    pub(crate) next: Option<NonNull<SlabHeader>>,
    /// Count of cells already handed out from this slab, in carve order.
    pub(crate) next_unused: u32,
}

/// A cell's storage: either a live object or a free-list node, whichever is
/// current. `object` must be the first union field — and `payload` must be
/// the first field of [`Cell`] — so that a pointer to the dispensed object
/// and a pointer to its owning cell are one and the same address, letting
/// the raw pointer flavor recover its cell without any extra bookkeeping.
#[repr(C)]
pub(crate) union Payload<T> {
    object: ManuallyDrop<T>,
    free: ManuallyDrop<FreeNode>,
}

/// One allocation unit within a slab.
///
/// Sized `max(size_of(T), size_of(FreeNode))` for the payload, plus an
/// intrusive refcount (used only by the shared pointer flavor) and an
/// origin back-reference (zero-sized for static pools, one pointer for
/// instanced ones — see [`crate::origin`]).
#[repr(C)]
pub(crate) struct Cell<C: Config> {
    payload: Payload<C::Object>,
    pub(crate) refcount: core::sync::atomic::AtomicUsize,
    pub(crate) origin: C::Origin,
}

impl<C: Config> Cell<C> {
    /// The object pointer for a cell, valid once `payload.object` has been
    /// written. Same address as the cell itself (see [`Payload`] doc).
    #[inline]
    pub(crate) fn object_ptr(cell: NonNull<Cell<C>>) -> NonNull<C::Object> {
        cell.cast()
    }

    /// Recover a cell pointer from an object pointer previously produced by
    /// [`Cell::object_ptr`]. Caller must ensure `ptr` actually originated
    /// from a cell of this pool's configuration.
    #[inline]
    pub(crate) unsafe fn from_object_ptr(ptr: NonNull<C::Object>) -> NonNull<Cell<C>> {
        ptr.cast()
    }

    #[inline]
    pub(crate) fn free_node_ptr(cell: NonNull<Cell<C>>) -> NonNull<FreeNode> {
        cell.cast()
    }
}

/// The `Layout` of one whole slab (header + cell array), and the byte
/// offset from the slab's base to its first cell.
pub(crate) fn slab_layout<C: Config>() -> (Layout, usize) {
    let header = Layout::new::<SlabHeader>();
    let cells = Layout::array::<Cell<C>>(C::CELLS_PER_SLAB)
        .expect("slab_pool: cell array layout overflow");
    let (total, cells_offset) = header
        .extend(cells)
        .expect("slab_pool: slab layout overflow");
    (total.pad_to_align(), cells_offset)
}

/// How many cells fit after the header, given a target slab size. May
/// underestimate slightly relative to the exact padded layout — a few
/// bytes of trailing slack at the end of a slab is acceptable; handing out
/// a cell that doesn't fit is not.
pub(crate) const fn cells_per_slab(slab_bytes: usize, cell_size: usize) -> usize {
    let header_size = size_of::<SlabHeader>();
    if cell_size == 0 || slab_bytes <= header_size {
        return 0;
    }
    (slab_bytes - header_size) / cell_size
}

/// Carve the next never-used cell from `slab`, or `None` if it is full.
///
/// # Safety
/// `slab` must point to a live slab allocated with the layout returned by
/// [`slab_layout::<C>`], and `cells_offset` must be that layout's cell
/// offset.
pub(crate) unsafe fn carve<C: Config>(
    slab: NonNull<SlabHeader>,
    cells_offset: usize,
) -> Option<NonNull<Cell<C>>> {
    let hdr = slab.as_ptr();
    let next_unused = (*hdr).next_unused;
    if next_unused as usize >= C::CELLS_PER_SLAB {
        return None;
    }
    let base = (slab.as_ptr() as *mut u8).add(cells_offset) as *mut Cell<C>;
    let cell = base.add(next_unused as usize);
    (*hdr).next_unused = next_unused + 1;
    Some(NonNull::new_unchecked(cell))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Spin;
    use crate::origin::Untagged;
    use crate::pool::{PoolKind, PoolState};

    struct Small([u8; 4]);

    struct SmallConfig;
    impl Config for SmallConfig {
        type Object = Small;
        type Origin = Untagged;
        type Lock = Spin<PoolState<Self>>;
        const SLAB_BYTES: usize = 256;
        const KIND: PoolKind = PoolKind::Static;
    }

    #[test]
    fn cells_per_slab_excludes_header() {
        let header = size_of::<SlabHeader>();
        let cell = size_of::<Cell<SmallConfig>>();
        assert_eq!(cells_per_slab(256, cell), (256 - header) / cell);
    }

    #[test]
    fn zero_sized_cell_yields_zero_cells() {
        assert_eq!(cells_per_slab(256, 0), 0);
    }

    #[test]
    fn slab_too_small_for_header_yields_zero_cells() {
        let header = size_of::<SlabHeader>();
        assert_eq!(cells_per_slab(header, 1), 0);
    }

    #[test]
    fn carve_bumps_until_exhausted_then_returns_none() {
        let (layout, cells_offset) = slab_layout::<SmallConfig>();
        let raw = unsafe { alloc::alloc::alloc(layout) };
        let hdr = NonNull::new(raw as *mut SlabHeader).unwrap();
        unsafe {
            hdr.as_ptr().write(SlabHeader {
                next: None,
                next_unused: 0,
            });
        }

        let mut seen = alloc::vec::Vec::new();
        for _ in 0..SmallConfig::CELLS_PER_SLAB {
            let cell = unsafe { carve::<SmallConfig>(hdr, cells_offset) }
                .expect("slab should yield CELLS_PER_SLAB cells");
            assert_eq!(cell.as_ptr().align_offset(align_of::<Cell<SmallConfig>>()), 0);
            assert!(!seen.contains(&cell));
            seen.push(cell);
        }
        assert!(unsafe { carve::<SmallConfig>(hdr, cells_offset) }.is_none());

        unsafe { alloc::alloc::dealloc(raw, layout) };
    }
}
