//! Generator-backed cache with pinning and LRU eviction.
//!
//! Register a [`Generator`] with [`Cache::insert`] to get a [`Handle`]. The
//! first [`Handle::value`] call generates the value; later calls return the
//! resident copy until it is evicted. Each returned [`CacheGuard`] pins the
//! value for as long as it lives.

mod generator;
mod handle;
mod stats;
mod store;
mod types;

pub use generator::{FnGenerator, Generator};
pub use handle::{CacheGuard, Handle};
pub use stats::CacheStats;
pub use store::Cache;
pub use types::{CacheError, DEFAULT_CACHE_SIZE};
