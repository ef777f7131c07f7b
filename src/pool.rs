//! The core allocator: slab list, free list, slab-count ceiling, and lock,
//! combined behind `acquire_cell`/`release_cell`, with `construct_*` methods
//! layered on top to dispense the configured pointer flavor.

use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::flavor::{Shared, Unique};
use crate::free_list::FreeNode;
use crate::origin::Origin as OriginTrait;
use crate::slab::{carve, cells_per_slab, slab_layout, Cell, SlabHeader};
use crate::lock::RawLock;

/// Whether a pool is a runtime value owned by the caller, or a single
/// process-wide instance reached through the configured type alone.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PoolKind {
    /// A runtime value; each instance carries its own `max_slabs` quota and
    /// its own accounting. Every dispensed cell is tagged with the pool's
    /// address so destruction can route back to the right one.
    Instanced,
    /// One pool per configured type, process-wide. No per-cell tag is
    /// needed or stored — see [`Config::static_pool`].
    Static,
}

/// The compile-time configuration record: object type, pointer-flavor
/// adapter knobs, slab size, lock kind, and pool kind.
///
/// Pointer flavor itself is not a type parameter here — it is selected per
/// call by invoking `construct_raw`, `construct_unique`, or
/// `construct_shared`, all three of which share one `Pool<C>` and one cell
/// layout, so none is paid for unless used (see `DESIGN.md`).
pub trait Config: Sized + 'static {
    /// The type of object this pool dispenses.
    type Object;

    /// Origin back-reference storage: [`crate::Tagged`] for instanced
    /// pools, [`crate::Untagged`] for static ones.
    type Origin: OriginTrait;

    /// The synchronization primitive guarding this pool's state. The
    /// `ConstNewState` bound lets [`Pool::uninit`] build one in a `const`
    /// context, so a static pool's backing `Pool` can itself live in a
    /// `static` declaration.
    type Lock: RawLock<PoolState<Self>> + ConstNewState<Self>;

    /// Target slab size in bytes. Defaults to 16 KiB.
    const SLAB_BYTES: usize = 16 * 1024;

    /// Instanced or static.
    const KIND: PoolKind;

    /// Number of cells carved from one slab. A compile-time constant;
    /// referencing [`Config::ASSERT_CELLS_PER_SLAB`] anywhere forces the
    /// "at least one cell per slab" check to run at build time.
    const CELLS_PER_SLAB: usize = cells_per_slab(Self::SLAB_BYTES, core::mem::size_of::<Cell<Self>>());

    /// Evaluating this associated const is a compile error if
    /// `CELLS_PER_SLAB` would be zero — the configured object plus its
    /// bookkeeping doesn't fit in one slab of `SLAB_BYTES`. `Pool::uninit`
    /// references it so every concrete `Config` is checked.
    const ASSERT_CELLS_PER_SLAB: () = assert!(
        Self::CELLS_PER_SLAB >= 1,
        "slab_pool: SLAB_BYTES too small to fit even one cell of this Config"
    );

    /// For `PoolKind::Static` configs, the single process-wide pool,
    /// declared by the embedding program as a plain `static` and returned
    /// here. Never called for `PoolKind::Instanced` configs.
    fn static_pool() -> &'static Pool<Self> {
        unreachable!(
            "slab_pool: Config::static_pool must be overridden by PoolKind::Static configurations"
        )
    }
}

/// All of a pool's mutable bookkeeping, guarded by `C::Lock`.
pub struct PoolState<C: Config> {
    slabs: Option<NonNull<SlabHeader>>,
    free: Option<NonNull<FreeNode>>,
    slab_count: usize,
    max_slabs: usize,
    /// Sum of `next_unused` across every slab ever carved from. Monotonic.
    total_cells: usize,
    #[cfg(debug_assertions)]
    free_count: usize,
    _marker: PhantomData<C>,
}

impl<C: Config> PoolState<C> {
    const fn empty() -> Self {
        PoolState {
            slabs: None,
            free: None,
            slab_count: 0,
            max_slabs: 0,
            total_cells: 0,
            #[cfg(debug_assertions)]
            free_count: 0,
            _marker: PhantomData,
        }
    }
}

// SAFETY: `PoolState` only ever holds intrusive pointers into slab memory
// owned exclusively by the pool that created it; concurrent access is
// serialized by `C::Lock`.
unsafe impl<C: Config> Send for PoolState<C> {}

/// The typed slab pool.
///
/// Construct an instanced pool with [`Pool::new`]; for a static pool,
/// declare `static POOL: Pool<MyConfig> = Pool::uninit();` and call
/// [`Pool::init`] once during startup.
pub struct Pool<C: Config> {
    state: C::Lock,
}

impl<C: Config> Pool<C> {
    /// Build an uninitialized pool suitable for a `static` declaration.
    /// Call [`Pool::init`] before constructing anything from it.
    pub const fn uninit() -> Self {
        // Force the build-time "at least one cell per slab" check.
        let _ = C::ASSERT_CELLS_PER_SLAB;
        Pool {
            state: <C::Lock as ConstNewState<C>>::CONST_NEW,
        }
    }

    /// Build and immediately initialize an instanced pool.
    ///
    /// `max_slabs` bounds total memory at `max_slabs * SLAB_BYTES`. If
    /// `pre_allocate` is set, one cell is acquired and released up front so
    /// the first slab exists before any `construct_*` call — combined with
    /// `max_slabs == 1` this makes every later acquisition non-allocating.
    pub fn new(max_slabs: usize, pre_allocate: bool) -> Self {
        let pool = Self::uninit();
        pool.init(max_slabs, pre_allocate);
        pool
    }

    /// Set this pool's slab-count ceiling and optionally pre-allocate its
    /// first slab. Safe to call more than once; later calls only raise or
    /// lower the ceiling, they never shrink an already-allocated slab list.
    pub fn init(&self, max_slabs: usize, pre_allocate: bool) {
        assert!(max_slabs > 0, "slab_pool: max_slabs must be positive");
        self.state.with_lock(|s| s.max_slabs = max_slabs);
        if pre_allocate {
            if let Some(cell) = self.acquire_cell() {
                self.release_cell(cell);
            }
        }
    }

    /// The configured slab-count ceiling.
    pub fn max_slabs(&self) -> usize {
        self.state.with_lock(|s| s.max_slabs)
    }

    /// Cells carved from one slab.
    pub const fn cells_per_slab() -> usize {
        C::CELLS_PER_SLAB
    }

    /// Acquire path: free list, then active-slab bump, then a fresh slab.
    /// `None` once `max_slabs` slabs are full and the free list is empty.
    pub(crate) fn acquire_cell(&self) -> Option<NonNull<Cell<C>>> {
        self.state.with_lock(|s| acquire_locked::<C>(s))
    }

    /// Push a cell back onto the free list.
    pub(crate) fn release_cell(&self, cell: NonNull<Cell<C>>) {
        self.state.with_lock(|s| release_locked::<C>(s, cell));
    }

    /// Dispense a raw pointer to a newly constructed object. The caller is
    /// responsible for calling [`crate::delete_raw`] exactly once.
    pub fn construct_raw(&self, value: C::Object) -> Option<NonNull<C::Object>> {
        match self.try_construct_raw::<core::convert::Infallible>(move || Ok(value)) {
            Ok(ptr) => ptr,
            Err(never) => match never {},
        }
    }

    /// Like [`Pool::construct_raw`], but the object is produced by `init`,
    /// and a failed `init` routes the just-acquired cell back to the free
    /// list before the error propagates.
    pub fn try_construct_raw<E>(
        &self,
        init: impl FnOnce() -> Result<C::Object, E>,
    ) -> Result<Option<NonNull<C::Object>>, E> {
        let Some(cell) = self.acquire_cell() else {
            return Ok(None);
        };
        match init() {
            Ok(value) => {
                let obj_ptr = Cell::<C>::object_ptr(cell);
                unsafe {
                    obj_ptr.as_ptr().write(value);
                    if matches!(C::KIND, PoolKind::Instanced) {
                        let mut tagged = cell;
                        tagged.as_mut().origin.write(NonNull::from(self).cast());
                    }
                }
                Ok(Some(obj_ptr))
            }
            Err(err) => {
                self.release_cell(cell);
                Err(err)
            }
        }
    }

    /// Dispense a move-only owner whose scope end releases the cell.
    pub fn construct_unique(&self, value: C::Object) -> Option<Unique<C>> {
        self.construct_raw(value)
            .map(|ptr| unsafe { Unique::from_object_ptr(ptr) })
    }

    /// Fallible counterpart of [`Pool::construct_unique`].
    pub fn try_construct_unique<E>(
        &self,
        init: impl FnOnce() -> Result<C::Object, E>,
    ) -> Result<Option<Unique<C>>, E> {
        self.try_construct_raw(init)
            .map(|opt| opt.map(|ptr| unsafe { Unique::from_object_ptr(ptr) }))
    }

    /// Dispense a reference-counted owner (initial count 1); the last drop
    /// releases the cell.
    pub fn construct_shared(&self, value: C::Object) -> Option<Shared<C>> {
        self.construct_raw(value)
            .map(|ptr| unsafe { Shared::from_object_ptr(ptr) })
    }

    /// Fallible counterpart of [`Pool::construct_shared`].
    pub fn try_construct_shared<E>(
        &self,
        init: impl FnOnce() -> Result<C::Object, E>,
    ) -> Result<Option<Shared<C>>, E> {
        self.try_construct_raw(init)
            .map(|opt| opt.map(|ptr| unsafe { Shared::from_object_ptr(ptr) }))
    }
}

impl<C: Config> Drop for Pool<C> {
    fn drop(&mut self) {
        self.state.with_lock(|s| {
            #[cfg(debug_assertions)]
            {
                assert_eq!(
                    s.free_count, s.total_cells,
                    "slab_pool: pool destroyed while objects are still live (leak)"
                );
            }
            let (layout, _) = slab_layout::<C>();
            let mut cur = s.slabs.take();
            while let Some(hdr) = cur {
                unsafe {
                    let next = hdr.as_ref().next;
                    alloc::alloc::dealloc(hdr.as_ptr() as *mut u8, layout);
                    cur = next;
                }
            }
            s.slab_count = 0;
            // Free-list nodes lived inside the slab memory just released;
            // don't walk them, just drop the reference.
            s.free = None;
        });
    }
}

fn acquire_locked<C: Config>(s: &mut PoolState<C>) -> Option<NonNull<Cell<C>>> {
    if let Some(node) = s.free {
        unsafe {
            s.free = node.as_ref().next;
        }
        #[cfg(debug_assertions)]
        {
            s.free_count -= 1;
        }
        log::trace!("slab_pool: reused cell from free list");
        return Some(node.cast());
    }

    let (_, cells_offset) = slab_layout::<C>();

    if let Some(active) = s.slabs {
        if let Some(cell) = unsafe { carve::<C>(active, cells_offset) } {
            s.total_cells += 1;
            return Some(cell);
        }
    }

    if s.slab_count >= s.max_slabs {
        log::debug!(
            "slab_pool: exhausted ({} of {} max slabs full, free list empty)",
            s.slab_count,
            s.max_slabs
        );
        return None;
    }

    let (layout, cells_offset) = slab_layout::<C>();
    let raw = unsafe { alloc::alloc::alloc(layout) };
    let hdr = NonNull::new(raw as *mut SlabHeader)?;
    unsafe {
        hdr.as_ptr().write(SlabHeader {
            next: s.slabs,
            next_unused: 0,
        });
    }
    s.slabs = Some(hdr);
    s.slab_count += 1;
    log::debug!(
        "slab_pool: allocated slab {} of {} ({} cells, {} bytes)",
        s.slab_count,
        s.max_slabs,
        C::CELLS_PER_SLAB,
        layout.size()
    );
    let cell = unsafe { carve::<C>(hdr, cells_offset) }?;
    s.total_cells += 1;
    Some(cell)
}

fn release_locked<C: Config>(s: &mut PoolState<C>, cell: NonNull<Cell<C>>) {
    #[cfg(debug_assertions)]
    {
        let target = Cell::<C>::free_node_ptr(cell);
        let mut cur = s.free;
        while let Some(node) = cur {
            assert_ne!(node, target, "slab_pool: double free of the same cell");
            cur = unsafe { node.as_ref().next };
        }
    }
    unsafe {
        Cell::<C>::free_node_ptr(cell)
            .as_ptr()
            .write(FreeNode { next: s.free });
    }
    s.free = Some(Cell::<C>::free_node_ptr(cell));
    #[cfg(debug_assertions)]
    {
        s.free_count += 1;
    }
}

/// Resolve the owning pool of a cell, per `C::KIND`.
pub(crate) fn resolve_pool<C: Config>(cell: NonNull<Cell<C>>) -> NonNull<Pool<C>> {
    match C::KIND {
        PoolKind::Instanced => unsafe {
            cell.as_ref()
                .origin
                .read()
                .expect("slab_pool: missing origin back-reference (double free or misuse)")
                .cast()
        },
        PoolKind::Static => NonNull::from(C::static_pool()),
    }
}

/// Helper trait giving `Pool::uninit` a `const` value for any `RawLock`
/// impl, without requiring `RawLock::new` itself to be `const fn` (trait
/// methods can't be `const` on stable yet).
#[doc(hidden)]
pub trait ConstNewState<C: Config> {
    const CONST_NEW: Self;
}

impl<C: Config> ConstNewState<C> for crate::lock::Spin<PoolState<C>> {
    const CONST_NEW: Self = crate::lock::Spin::new(PoolState::empty());
}

impl<C: Config> ConstNewState<C> for crate::lock::Null<PoolState<C>> {
    const CONST_NEW: Self = crate::lock::Null::new(PoolState::empty());
}

#[cfg(feature = "std")]
impl<C: Config> ConstNewState<C> for crate::lock::StdMutex<PoolState<C>> {
    const CONST_NEW: Self = crate::lock::StdMutex::new(PoolState::empty());
}
