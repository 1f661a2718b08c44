//! Bounded LRU store of generated values.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::cache::generator::Generator;
use crate::cache::handle::{Entry, Handle};
use crate::cache::stats::CacheStats;
use crate::cache::types::{check_max_size, CacheError};

/// Type-erased view of an entry, as seen by the eviction pass.
pub(crate) trait CacheLine: Send + Sync {
    fn id(&self) -> u64;

    /// Drop the resident value if it is valid and unpinned.
    ///
    /// Returns the number of bytes freed.
    fn try_invalidate(&self) -> Option<usize>;

    /// Decrement the pin count, returning the remaining pins.
    fn unpin(&self) -> usize;
}

/// Cache of lazily generated values with a soft byte budget.
///
/// Values are produced by [`Generator`]s registered with [`Cache::insert`].
/// A value is generated on first dereference, at most once per residency,
/// and stays resident until evicted. Eviction drops the least recently used
/// value whose pin count is zero; pinned values are never evicted, so the
/// budget may be exceeded while every resident value is in use.
///
/// `Cache` is a cheap handle; clones share the same store.
///
/// # Locking
///
/// The store lock is always taken before any entry lock. Entries take their
/// own lock without the store lock while generating, so generation of
/// distinct entries runs concurrently.
#[derive(Clone)]
pub struct Cache {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    next_id: AtomicU64,
}

struct State {
    max_size: usize,
    resident_size: usize,
    /// Recency counter; larger is more recent.
    tick: u64,
    /// Resident entries ordered from least to most recently used.
    lru: BTreeMap<u64, Arc<dyn CacheLine>>,
    /// Entry id to its current key in `lru`.
    ticks: HashMap<u64, u64>,
    stats: CacheStats,
}

impl State {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Evict unpinned entries, oldest first, until resident size is at most
    /// `target`.
    fn evict_to(&mut self, target: usize) -> u64 {
        if self.resident_size <= target {
            return 0;
        }
        let mut resident = self.resident_size;
        let mut victims = Vec::new();
        for (&tick, line) in &self.lru {
            if resident <= target {
                break;
            }
            if let Some(freed) = line.try_invalidate() {
                resident -= freed;
                victims.push((tick, line.id(), freed));
            }
        }
        for &(tick, id, freed) in &victims {
            self.lru.remove(&tick);
            self.ticks.remove(&id);
            debug!(entry = id, bytes = freed, "evicted cache entry");
        }
        self.resident_size = resident;
        let count = victims.len() as u64;
        self.stats.record_evictions(count);
        count
    }

    fn evict(&mut self) -> u64 {
        self.evict_to(self.max_size)
    }
}

impl Cache {
    /// Create a cache that keeps roughly `max_size` bytes resident.
    pub fn new(max_size: usize) -> Result<Self, CacheError> {
        let max_size = check_max_size(max_size)?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    max_size,
                    resident_size: 0,
                    tick: 0,
                    lru: BTreeMap::new(),
                    ticks: HashMap::new(),
                    stats: CacheStats::new(max_size),
                }),
                next_id: AtomicU64::new(0),
            }),
        })
    }

    /// Register a generator. Nothing is generated until the handle is
    /// dereferenced.
    pub fn insert<G: Generator>(&self, generator: G) -> Handle<G> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        Handle::new(Arc::new(Entry::new(id, generator)), self.clone())
    }

    pub fn max_size(&self) -> usize {
        self.shared.state.lock().max_size
    }

    /// Change the budget and evict down to it.
    pub fn set_max_size(&self, max_size: usize) -> Result<(), CacheError> {
        let max_size = check_max_size(max_size)?;
        let mut state = self.shared.state.lock();
        let old = state.max_size;
        state.max_size = max_size;
        state.stats.max_bytes = max_size;
        let evicted = state.evict();
        info!(old, new = max_size, evicted, "cache budget changed");
        Ok(())
    }

    /// Bytes currently charged against the budget.
    pub fn resident_size(&self) -> usize {
        self.shared.state.lock().resident_size
    }

    /// Number of resident values.
    pub fn resident_entries(&self) -> usize {
        self.shared.state.lock().lru.len()
    }

    /// Evict every unpinned value.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        let evicted = state.evict_to(0);
        debug!(evicted, "cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        let mut stats = state.stats.clone();
        stats.resident_bytes = state.resident_size;
        stats.resident_entries = state.lru.len();
        stats.max_bytes = state.max_size;
        stats
    }

    /// Account a freshly generated value and make room for it.
    pub(crate) fn admit(&self, line: Arc<dyn CacheLine>, size: usize) {
        let mut state = self.shared.state.lock();
        let tick = state.next_tick();
        let id = line.id();
        if let Some(old) = state.ticks.insert(id, tick) {
            state.lru.remove(&old);
        }
        state.lru.insert(tick, line);
        state.resident_size += size;
        state.stats.record_generation();
        debug!(entry = id, bytes = size, resident = state.resident_size, "cache entry generated");
        state.evict();
    }

    /// Mark a resident entry as most recently used.
    pub(crate) fn touch(&self, id: u64) {
        let mut state = self.shared.state.lock();
        state.stats.record_hit();
        let Some(old) = state.ticks.get(&id).copied() else {
            return;
        };
        let tick = state.next_tick();
        if let Some(line) = state.lru.remove(&old) {
            state.lru.insert(tick, line);
            state.ticks.insert(id, tick);
        }
    }

    pub(crate) fn record_failure(&self) {
        self.shared.state.lock().stats.record_failure();
    }

    /// Run an eviction pass after pins were released.
    pub(crate) fn evict(&self) {
        self.shared.state.lock().evict();
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Cache")
            .field("max_size", &state.max_size)
            .field("resident_size", &state.resident_size)
            .field("entries", &state.lru.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FnGenerator;
    use crate::error::RasterError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn counting(
        size: usize,
        value: u32,
        calls: &Arc<AtomicUsize>,
    ) -> FnGenerator<Vec<u32>, impl Fn() -> Result<Vec<u32>, RasterError> + Send + Sync + 'static>
    {
        let calls = Arc::clone(calls);
        FnGenerator::new(size, move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![value; 4])
        })
    }

    #[test]
    fn test_new_rejects_zero() {
        assert!(matches!(Cache::new(0), Err(CacheError::InvalidConfig(_))));
        assert!(Cache::new(1).is_ok());
    }

    #[test]
    fn test_insert_is_lazy() {
        let cache = Cache::new(100).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = cache.insert(counting(10, 1, &calls));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!handle.is_valid());
        assert_eq!(cache.resident_size(), 0);
    }

    #[test]
    fn test_generate_once_then_hit() {
        let cache = Cache::new(100).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = cache.insert(counting(10, 5, &calls));

        let first = handle.value().unwrap();
        assert_eq!(first[0], 5);
        drop(first);
        let second = handle.value().unwrap();
        assert_eq!(second[3], 5);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resident_size(), 10);
        let stats = cache.stats();
        assert_eq!(stats.generations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.resident_entries, 1);
    }

    #[test]
    fn test_concurrent_dereference_generates_once() {
        let cache = Cache::new(1000).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let slow_calls = Arc::clone(&calls);
        let handle = cache.insert(FnGenerator::new(8, move || {
            slow_calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(20));
            Ok(vec![9u8; 8])
        }));

        let barrier = Arc::new(Barrier::new(8));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let guard = handle.value().unwrap();
                    Arc::clone(guard.value())
                })
            })
            .collect();
        let values: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for v in &values {
            assert!(Arc::ptr_eq(v, &values[0]));
        }
        assert_eq!(handle.generation_count(), 1);
    }

    #[test]
    fn test_pinned_value_survives_pressure() {
        let cache = Cache::new(20).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let a = cache.insert(counting(10, 1, &calls));
        let pinned = a.value().unwrap();
        assert_eq!(a.pin_count(), 1);

        let others: Vec<_> = (0..5).map(|i| cache.insert(counting(10, i, &calls))).collect();
        for h in &others {
            let _ = h.value().unwrap();
        }
        assert!(a.is_valid());
        assert_eq!(pinned[0], 1);
        assert!(cache.resident_size() <= 20);
    }

    #[test]
    fn test_soft_limit_when_everything_pinned() {
        let cache = Cache::new(10).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let a = cache.insert(counting(10, 1, &calls));
        let b = cache.insert(counting(10, 2, &calls));
        let ga = a.value().unwrap();
        let gb = b.value().unwrap();
        assert_eq!(cache.resident_size(), 20);

        drop(ga);
        assert_eq!(cache.resident_size(), 10);
        assert!(!a.is_valid());
        assert!(b.is_valid());
        gb.release();
    }

    #[test]
    fn test_lru_order_follows_access() {
        let cache = Cache::new(30).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let a = cache.insert(counting(10, 1, &calls));
        let b = cache.insert(counting(10, 2, &calls));
        let c = cache.insert(counting(10, 3, &calls));
        for h in [&a, &b, &c] {
            let _ = h.value().unwrap();
        }
        // Refresh `a`, making `b` the oldest.
        let _ = a.value().unwrap();

        let d = cache.insert(counting(10, 4, &calls));
        let _ = d.value().unwrap();

        assert!(a.is_valid());
        assert!(!b.is_valid());
        assert!(c.is_valid());
        assert!(d.is_valid());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_evicted_entry_regenerates() {
        let cache = Cache::new(10).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let a = cache.insert(counting(10, 1, &calls));
        let b = cache.insert(counting(10, 2, &calls));
        let _ = a.value().unwrap();
        let _ = b.value().unwrap();
        assert!(!a.is_valid());
        assert_eq!(a.value().unwrap()[0], 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(a.generation_count(), 2);
    }

    #[test]
    fn test_failed_generation_is_retryable() {
        let cache = Cache::new(100).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let handle = cache.insert(FnGenerator::new(4, move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RasterError::source("transient"))
            } else {
                Ok(42u32)
            }
        }));

        assert!(handle.value().is_err());
        assert!(!handle.is_valid());
        assert_eq!(cache.resident_size(), 0);
        assert_eq!(*handle.value().unwrap(), 42);

        let stats = cache.stats();
        assert_eq!(stats.failed_generations, 1);
        assert_eq!(stats.generations, 1);
    }

    #[test]
    fn test_panicking_generator_reverts_entry() {
        let cache = Cache::new(100).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let handle = cache.insert(FnGenerator::new(4, move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("generator blew up");
            }
            Ok(1u8)
        }));

        let err = handle.value().unwrap_err();
        assert!(matches!(err, RasterError::GenerationPanicked(ref m) if m == "generator blew up"));
        assert!(!handle.is_valid());
        assert_eq!(*handle.value().unwrap(), 1);
    }

    #[test]
    fn test_set_max_size_evicts() {
        let cache = Cache::new(100).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..5).map(|i| cache.insert(counting(10, i, &calls))).collect();
        for h in &handles {
            let _ = h.value().unwrap();
        }
        assert_eq!(cache.resident_size(), 50);

        cache.set_max_size(25).unwrap();
        assert_eq!(cache.resident_size(), 20);
        assert_eq!(cache.max_size(), 25);
        assert!(!handles[0].is_valid());
        assert!(handles[4].is_valid());
        assert!(cache.set_max_size(0).is_err());
    }

    #[test]
    fn test_clear_keeps_pinned() {
        let cache = Cache::new(100).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let a = cache.insert(counting(10, 1, &calls));
        let b = cache.insert(counting(10, 2, &calls));
        let _ = a.value().unwrap();
        let held = b.value().unwrap();

        cache.clear();
        assert!(!a.is_valid());
        assert!(b.is_valid());
        assert_eq!(cache.resident_size(), 10);
        assert_eq!(cache.resident_entries(), 1);
        drop(held);
    }

    #[test]
    fn test_clones_share_store() {
        let cache = Cache::new(100).unwrap();
        let other = cache.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let h = other.insert(counting(10, 1, &calls));
        let _ = h.value().unwrap();
        assert_eq!(cache.resident_size(), 10);
        assert!(format!("{:?}", cache).contains("resident_size: 10"));
    }
}
