//! Cache entries, handles and pins.

use std::fmt;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::cache::generator::Generator;
use crate::cache::store::{Cache, CacheLine};
use crate::error::{panic_message, RasterError};

enum Slot<V> {
    Empty,
    Generating,
    Valid { value: Arc<V>, size: usize },
}

struct EntryState<V> {
    slot: Slot<V>,
    pins: usize,
    generations: u64,
}

pub(crate) struct Entry<G: Generator> {
    id: u64,
    generator: G,
    state: Mutex<EntryState<G::Value>>,
    /// Signalled whenever a generation attempt finishes.
    ready: Condvar,
}

impl<G: Generator> Entry<G> {
    pub(crate) fn new(id: u64, generator: G) -> Self {
        Self {
            id,
            generator,
            state: Mutex::new(EntryState {
                slot: Slot::Empty,
                pins: 0,
                generations: 0,
            }),
            ready: Condvar::new(),
        }
    }
}

impl<G: Generator> CacheLine for Entry<G> {
    fn id(&self) -> u64 {
        self.id
    }

    fn try_invalidate(&self) -> Option<usize> {
        let mut state = self.state.lock();
        if state.pins > 0 {
            return None;
        }
        match std::mem::replace(&mut state.slot, Slot::Empty) {
            Slot::Valid { size, .. } => Some(size),
            other => {
                state.slot = other;
                None
            }
        }
    }

    fn unpin(&self) -> usize {
        let mut state = self.state.lock();
        state.pins = state.pins.saturating_sub(1);
        state.pins
    }
}

/// Reference to a registered generator and its cached value.
///
/// Handles are cheap to clone and never pin anything by themselves; pins are
/// held by the [`CacheGuard`]s that [`Handle::value`] returns.
pub struct Handle<G: Generator> {
    entry: Arc<Entry<G>>,
    cache: Cache,
}

impl<G: Generator> Handle<G> {
    pub(crate) fn new(entry: Arc<Entry<G>>, cache: Cache) -> Self {
        Self { entry, cache }
    }

    /// Pin the value, generating it first if it is not resident.
    ///
    /// Concurrent callers on an entry that is being generated wait for that
    /// generation instead of starting their own. If generation fails or
    /// panics the entry goes back to empty and the next caller retries.
    pub fn value(&self) -> Result<CacheGuard<G::Value>, RasterError> {
        let entry = &self.entry;
        let mut state = entry.state.lock();
        loop {
            if let Slot::Valid { value, .. } = &state.slot {
                let value = Arc::clone(value);
                state.pins += 1;
                drop(state);
                self.cache.touch(entry.id);
                return Ok(self.guard(value));
            }
            if matches!(state.slot, Slot::Generating) {
                entry.ready.wait(&mut state);
                continue;
            }
            break;
        }
        state.slot = Slot::Generating;
        drop(state);

        trace!(entry = entry.id, "generating cache entry");
        let result = match catch_unwind(AssertUnwindSafe(|| entry.generator.generate())) {
            Ok(result) => result,
            Err(panic) => Err(RasterError::GenerationPanicked(panic_message(panic.as_ref()))),
        };

        let mut state = entry.state.lock();
        match result {
            Ok(value) => {
                let value = Arc::new(value);
                let size = entry.generator.size();
                state.slot = Slot::Valid {
                    value: Arc::clone(&value),
                    size,
                };
                state.pins += 1;
                state.generations += 1;
                drop(state);
                entry.ready.notify_all();

                self.cache.admit(self.line(), size);
                Ok(self.guard(value))
            }
            Err(err) => {
                state.slot = Slot::Empty;
                drop(state);
                entry.ready.notify_all();

                self.cache.record_failure();
                warn!(entry = entry.id, error = %err, "cache entry generation failed");
                Err(err)
            }
        }
    }

    /// True while a generated value is resident.
    pub fn is_valid(&self) -> bool {
        matches!(self.entry.state.lock().slot, Slot::Valid { .. })
    }

    pub fn pin_count(&self) -> usize {
        self.entry.state.lock().pins
    }

    /// Number of successful generations over the entry's lifetime.
    pub fn generation_count(&self) -> u64 {
        self.entry.state.lock().generations
    }

    pub fn generator(&self) -> &G {
        &self.entry.generator
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    fn line(&self) -> Arc<dyn CacheLine> {
        Arc::clone(&self.entry) as Arc<dyn CacheLine>
    }

    fn guard(&self, value: Arc<G::Value>) -> CacheGuard<G::Value> {
        CacheGuard {
            value,
            line: self.line(),
            cache: self.cache.clone(),
        }
    }
}

impl<G: Generator> Clone for Handle<G> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
            cache: self.cache.clone(),
        }
    }
}

impl<G: Generator> fmt::Debug for Handle<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.entry.state.lock();
        let slot = match state.slot {
            Slot::Empty => "empty",
            Slot::Generating => "generating",
            Slot::Valid { .. } => "valid",
        };
        f.debug_struct("Handle")
            .field("id", &self.entry.id)
            .field("slot", &slot)
            .field("pins", &state.pins)
            .finish()
    }
}

/// A pinned cache value.
///
/// The value cannot be evicted while any guard for it is alive. Dropping the
/// guard releases the pin and lets the cache reclaim space if it is over
/// budget.
pub struct CacheGuard<V: Send + Sync + 'static> {
    value: Arc<V>,
    line: Arc<dyn CacheLine>,
    cache: Cache,
}

impl<V: Send + Sync + 'static> CacheGuard<V> {
    pub fn value(&self) -> &Arc<V> {
        &self.value
    }

    /// Release the pin now.
    pub fn release(self) {}
}

impl<V: Send + Sync + 'static> Deref for CacheGuard<V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

impl<V: Send + Sync + 'static> Drop for CacheGuard<V> {
    fn drop(&mut self) {
        if self.line.unpin() == 0 {
            self.cache.evict();
        }
    }
}

impl<V: Send + Sync + fmt::Debug + 'static> fmt::Debug for CacheGuard<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheGuard").field(&self.value).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FnGenerator;

    #[test]
    fn test_guards_count_pins() {
        let cache = Cache::new(64).unwrap();
        let handle = cache.insert(FnGenerator::new(8, || Ok(3u64)));
        assert_eq!(handle.pin_count(), 0);

        let g1 = handle.value().unwrap();
        let g2 = handle.value().unwrap();
        assert_eq!(handle.pin_count(), 2);
        assert_eq!(*g1 + *g2, 6);

        g1.release();
        assert_eq!(handle.pin_count(), 1);
        drop(g2);
        assert_eq!(handle.pin_count(), 0);
        assert!(handle.is_valid());
    }

    #[test]
    fn test_handle_clone_shares_entry() {
        let cache = Cache::new(64).unwrap();
        let handle = cache.insert(FnGenerator::new(8, || Ok(String::from("block"))));
        let clone = handle.clone();
        let _ = handle.value().unwrap();
        assert!(clone.is_valid());
        assert_eq!(clone.generation_count(), 1);
        assert_eq!(clone.generator().size(), 8);
    }

    #[test]
    fn test_debug_reports_slot() {
        let cache = Cache::new(64).unwrap();
        let handle = cache.insert(FnGenerator::new(8, || Ok(1u8)));
        assert!(format!("{:?}", handle).contains("empty"));
        let guard = handle.value().unwrap();
        assert!(format!("{:?}", handle).contains("valid"));
        assert_eq!(format!("{:?}", guard), "CacheGuard(1)");
    }

    #[test]
    fn test_waiters_block_until_generated() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::thread;
        use std::time::Duration;

        let cache = Cache::new(64).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = cache.insert(FnGenerator::new(8, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            Ok(11u32)
        }));

        let first = {
            let handle = handle.clone();
            thread::spawn(move || *handle.value().unwrap())
        };
        thread::sleep(Duration::from_millis(10));
        let second = *handle.value().unwrap();

        assert_eq!(first.join().unwrap(), 11);
        assert_eq!(second, 11);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
