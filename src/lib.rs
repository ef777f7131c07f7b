//! A typed slab allocator.
//!
//! Carves large, page-sized memory regions ("slabs") into uniformly sized,
//! aligned cells, dispenses cells as constructed objects, and recycles freed
//! cells through an intrusive free list. Meant for systems code that creates
//! and destroys many short-lived objects of a single type and wants
//! predictable allocation cost and a bounded memory footprint.
//!
//! # Shape
//!
//! [`Pool<C>`] is the core allocator. `C` is a [`Config`] resolved entirely
//! at compile time: the object type, the lock kind, the slab size, and
//! whether the pool is *instanced* (a runtime value, one pool per instance)
//! or *static* (one pool per configured type, process-wide). Dispensing
//! flavor — raw pointer, unique owner, or shared reference — is chosen per
//! call by which `construct_*` method is invoked; all three share the same
//! pool and the same cell layout.
//!
//! ```
//! use slab_pool::{Config, Pool, PoolKind, Tagged};
//! use slab_pool::lock::Spin;
//! use slab_pool::pool::PoolState;
//!
//! struct Widget { id: u32 }
//!
//! struct WidgetConfig;
//! impl Config for WidgetConfig {
//!     type Object = Widget;
//!     type Origin = Tagged;
//!     type Lock = Spin<PoolState<Self>>;
//!     const KIND: PoolKind = PoolKind::Instanced;
//! }
//!
//! let pool: Pool<WidgetConfig> = Pool::new(4, false);
//! let handle = pool.construct_unique(Widget { id: 7 }).expect("pool exhausted");
//! assert_eq!(handle.id, 7);
//! ```
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod flavor;
pub mod free_list;
pub mod lock;
pub mod origin;
pub mod pool;
pub mod slab;

pub use flavor::{delete_raw, Shared, Unique};
pub use origin::{Origin, Tagged, Untagged};
pub use pool::{Config, Pool, PoolKind};

/// Declare the process-wide `static` backing a [`PoolKind::Static`] config,
/// the same shape as a hand-written
/// `pub static FD_TABLE_SLAB: SlabCache = SlabCache::uninit();` — this macro
/// only spares the caller from repeating `Pool::<$config>::uninit()`.
///
/// The declared static still has to be wired up by hand in the config's
/// [`Config::static_pool`] override, since a macro can't add a method to an
/// `impl` block that doesn't exist yet at expansion time:
///
/// ```ignore
/// slab_pool::static_slab_pool!(HANDLE_POOL: HandleConfig);
///
/// impl Config for HandleConfig {
///     // ...
///     fn static_pool() -> &'static Pool<Self> { &HANDLE_POOL }
/// }
/// ```
#[macro_export]
macro_rules! static_slab_pool {
    ($name:ident : $config:ty) => {
        static $name: $crate::Pool<$config> = $crate::Pool::uninit();
    };
}
