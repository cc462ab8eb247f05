//! The priority-driven frame cache.
//!
//! At any point in time there is exactly one current cache, accessible
//! via [`with_current`]. It can usually be left untouched, but
//! [`swap`] lets the harness install a configured cache and tests
//! juggle several.

pub mod entry;
pub mod policy;
pub mod queue;
pub mod stats;
pub mod store;
pub mod visualise;

pub use entry::CacheEntry;
pub use policy::{CacheAlgorithm, EvictionPolicy};
pub use queue::{MiddleRecentlyUsedQueue, RecentlyUsedQueue};
pub use stats::CacheStats;
pub use store::FrameCache;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

static CURRENT_CACHE: Lazy<Mutex<FrameCache>> = Lazy::new(|| {
    Mutex::new(FrameCache::new(
        100 * 1024 * 1024,
        CacheAlgorithm::Specialised,
        false,
    ))
});

/// Run `f` with exclusive access to the current cache. Callers must not
/// render frames inside `f`; rendering re-enters the cache.
pub fn with_current<R>(f: impl FnOnce(&mut FrameCache) -> R) -> R {
    f(&mut CURRENT_CACHE.lock())
}

/// Replace the current cache, returning the old one.
pub fn swap(new_cache: FrameCache) -> FrameCache {
    std::mem::replace(&mut *CURRENT_CACHE.lock(), new_cache)
}
