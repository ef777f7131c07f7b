//! Pointer-flavor adapters layered over the raw cell returned by
//! [`Pool::construct_raw`](crate::Pool::construct_raw): a move-only owner
//! ([`Unique`]), a reference-counted owner ([`Shared`]), and the explicit
//! free function ([`delete_raw`]) for the raw flavor itself. All three share
//! one pool and one cell layout; the flavor is chosen per call, not baked
//! into `Config`.

use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use core::sync::atomic::Ordering;

use crate::pool::{resolve_pool, Config};
use crate::slab::Cell;

/// Release a cell dispensed by [`Pool::construct_raw`](crate::Pool::construct_raw).
///
/// # Safety
/// `ptr` must have come from a live `construct_raw` call on a pool of this
/// exact `Config`, and must not already have been passed to `delete_raw`,
/// dropped via [`Unique`]/[`Shared`], or otherwise released.
pub unsafe fn delete_raw<C: Config>(ptr: NonNull<C::Object>) {
    core::ptr::drop_in_place(ptr.as_ptr());
    let cell = Cell::<C>::from_object_ptr(ptr);
    let pool = resolve_pool::<C>(cell);
    pool.as_ref().release_cell(cell);
}

/// A move-only owning handle. Dropping it drops the object in place and
/// returns its cell to the owning pool's free list.
pub struct Unique<C: Config> {
    ptr: NonNull<C::Object>,
    _marker: PhantomData<C>,
}

impl<C: Config> Unique<C> {
    /// # Safety
    /// Same preconditions as [`delete_raw`], except ownership transfers to
    /// the returned `Unique` instead of being released immediately.
    pub(crate) unsafe fn from_object_ptr(ptr: NonNull<C::Object>) -> Self {
        Unique {
            ptr,
            _marker: PhantomData,
        }
    }
}

impl<C: Config> Deref for Unique<C> {
    type Target = C::Object;

    #[inline]
    fn deref(&self) -> &C::Object {
        unsafe { self.ptr.as_ref() }
    }
}

impl<C: Config> DerefMut for Unique<C> {
    #[inline]
    fn deref_mut(&mut self) -> &mut C::Object {
        unsafe { self.ptr.as_mut() }
    }
}

impl<C: Config> Drop for Unique<C> {
    fn drop(&mut self) {
        unsafe {
            core::ptr::drop_in_place(self.ptr.as_ptr());
            let cell = Cell::<C>::from_object_ptr(self.ptr);
            let pool = resolve_pool::<C>(cell);
            pool.as_ref().release_cell(cell);
        }
    }
}

// SAFETY: `Unique` behaves like `Box<C::Object>` — exclusive ownership of
// one object, so it inherits exactly `C::Object`'s own Send/Sync bounds.
unsafe impl<C: Config> Send for Unique<C> where C::Object: Send {}
unsafe impl<C: Config> Sync for Unique<C> where C::Object: Sync {}

/// A reference-counted owning handle, sharing one cell across clones. The
/// count lives in the cell itself ([`Cell::refcount`](crate::slab::Cell)),
/// not in a separately allocated control block, so cloning and dropping
/// never touch the global allocator.
pub struct Shared<C: Config> {
    ptr: NonNull<C::Object>,
    _marker: PhantomData<C>,
}

impl<C: Config> Shared<C> {
    /// # Safety
    /// Same preconditions as [`delete_raw`]; additionally, the cell's
    /// refcount must not already be in use by another `Shared` tracking it
    /// (this call initializes the count to 1).
    pub(crate) unsafe fn from_object_ptr(ptr: NonNull<C::Object>) -> Self {
        let cell = Cell::<C>::from_object_ptr(ptr);
        cell.as_ref().refcount.store(1, Ordering::Release);
        Shared {
            ptr,
            _marker: PhantomData,
        }
    }
}

impl<C: Config> Clone for Shared<C> {
    fn clone(&self) -> Self {
        unsafe {
            let cell = Cell::<C>::from_object_ptr(self.ptr);
            cell.as_ref().refcount.fetch_add(1, Ordering::Relaxed);
        }
        Shared {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<C: Config> Deref for Shared<C> {
    type Target = C::Object;

    #[inline]
    fn deref(&self) -> &C::Object {
        unsafe { self.ptr.as_ref() }
    }
}

impl<C: Config> Drop for Shared<C> {
    fn drop(&mut self) {
        unsafe {
            let cell = Cell::<C>::from_object_ptr(self.ptr);
            if cell.as_ref().refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
                core::ptr::drop_in_place(self.ptr.as_ptr());
                let pool = resolve_pool::<C>(cell);
                pool.as_ref().release_cell(cell);
            }
        }
    }
}

// SAFETY: mirrors `alloc::sync::Arc`'s bounds — shared access from multiple
// threads requires the object itself to be thread-safe to share and send.
unsafe impl<C: Config> Send for Shared<C> where C::Object: Send + Sync {}
unsafe impl<C: Config> Sync for Shared<C> where C::Object: Send + Sync {}
