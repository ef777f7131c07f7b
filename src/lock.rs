//! Lock-kind abstraction: mutex vs. no-op synchronization for a pool's
//! internal state.
//!
//! A trait rather than a fixed `spin::Mutex` field, so a pool can be
//! configured for single-threaded use with a true no-op lock instead of
//! paying for synchronization it never needs.

/// A lock guarding a value of type `T`, acquired for the whole duration of
/// one acquire/release call — never held across user code (constructors or
/// destructors of the pooled object never run while the lock is held).
pub trait RawLock<T> {
    /// Build the lock in its initial, const-constructible state.
    fn new(value: T) -> Self;

    /// Run `f` with exclusive access to the protected value.
    fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

/// A spinlock-backed lock kind, for pools shared across threads.
pub struct Spin<T>(spin::Mutex<T>);

impl<T> Spin<T> {
    /// `const fn` constructor, so a `Pool` built on `Spin` can live in a
    /// `static` and be initialized before any runtime code executes.
    pub const fn new(value: T) -> Self {
        Spin(spin::Mutex::new(value))
    }
}

impl<T> RawLock<T> for Spin<T> {
    fn new(value: T) -> Self {
        Spin::new(value)
    }

    #[inline]
    fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.0.lock();
        f(&mut guard)
    }
}

/// A no-op lock kind, for pools only ever touched from a single thread.
///
/// Not `Sync` unless `T` already is and the caller otherwise guarantees
/// single-threaded access; there is no synchronization here at all.
pub struct Null<T>(core::cell::UnsafeCell<T>);

impl<T> Null<T> {
    pub const fn new(value: T) -> Self {
        Null(core::cell::UnsafeCell::new(value))
    }
}

impl<T> RawLock<T> for Null<T> {
    fn new(value: T) -> Self {
        Null::new(value)
    }

    #[inline]
    fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        // SAFETY: `Null` is only sound under the caller's single-threaded
        // usage contract; no other call can be in flight concurrently.
        let value = unsafe { &mut *self.0.get() };
        f(value)
    }
}

// SAFETY: guarded by an UnsafeCell with no internal aliasing beyond the
// single call in flight; the caller is responsible for single-threaded use.
unsafe impl<T: Send> Send for Null<T> {}

/// A `std::sync::Mutex`-backed lock kind, available under the `std` feature
/// for embedders that would rather not pull in `spin`'s busy-wait semantics.
#[cfg(feature = "std")]
pub struct StdMutex<T>(std::sync::Mutex<T>);

#[cfg(feature = "std")]
impl<T> StdMutex<T> {
    pub const fn new(value: T) -> Self {
        StdMutex(std::sync::Mutex::new(value))
    }
}

#[cfg(feature = "std")]
impl<T> RawLock<T> for StdMutex<T> {
    fn new(value: T) -> Self {
        StdMutex::new(value)
    }

    #[inline]
    fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(|poison| poison.into_inner());
        f(&mut guard)
    }
}
