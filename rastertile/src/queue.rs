//! Blocking multi-producer, multi-consumer FIFO.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Unbounded FIFO shared between any number of producers and consumers.
///
/// Items come out in the order they were pushed. Consumers can block
/// indefinitely ([`ThreadQueue::wait_pop`]), up to a timeout
/// ([`ThreadQueue::timed_wait_pop`]), or not at all ([`ThreadQueue::try_pop`]).
pub struct ThreadQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> Default for ThreadQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ThreadQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Append an item and wake one waiting consumer.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    /// Block until an item is available and remove the oldest one.
    pub fn wait_pop(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.available.wait(&mut items);
        }
    }

    /// Like [`ThreadQueue::wait_pop`] but gives up after `timeout`.
    ///
    /// A zero timeout never blocks.
    pub fn timed_wait_pop(&self, timeout: Duration) -> Option<T> {
        let mut items = self.items.lock();
        if let Some(item) = items.pop_front() {
            return Some(item);
        }
        if timeout.is_zero() {
            return None;
        }
        let deadline = Instant::now() + timeout;
        loop {
            let timed_out = self
                .available
                .wait_until(&mut items, deadline)
                .timed_out();
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if timed_out {
                return None;
            }
        }
    }

    /// Remove the oldest item without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Snapshot; may be stale by the time the caller acts on it.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Snapshot of the current length.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let q = ThreadQueue::new();
        assert!(q.is_empty());
        for i in 0..50u32 {
            q.push(i);
        }
        assert!(!q.is_empty());
        assert_eq!(q.len(), 50);
        for i in 0..50u32 {
            assert!(!q.is_empty());
            assert_eq!(q.wait_pop(), i);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn test_threaded_producers_each_item_popped_once() {
        let q = Arc::new(ThreadQueue::<u32>::new());
        let producers: Vec<_> = (0..20u32)
            .map(|value| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for _ in 0..10 {
                        q.push(value);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut counts = vec![0u32; 20];
        while !q.is_empty() {
            let value = q.timed_wait_pop(Duration::ZERO).unwrap();
            counts[value as usize] += 1;
        }
        assert!(q.timed_wait_pop(Duration::ZERO).is_none());
        assert!(counts.iter().all(|&c| c == 10));
    }

    #[test]
    fn test_concurrent_consumers_split_items() {
        let q = Arc::new(ThreadQueue::<usize>::new());
        for i in 0..1000 {
            q.push(i);
        }
        let consumers: Vec<_> = (0..8)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Some(v) = q.try_pop() {
                        got.push(v);
                    }
                    got
                })
            })
            .collect();
        let mut all: Vec<usize> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_timeout_does_not_block() {
        let q = ThreadQueue::<u8>::new();
        let start = Instant::now();
        assert!(q.timed_wait_pop(Duration::ZERO).is_none());
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_timed_wait_pop_times_out() {
        let q = ThreadQueue::<u8>::new();
        let start = Instant::now();
        assert!(q.timed_wait_pop(Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_pop_wakes_on_push() {
        let q = Arc::new(ThreadQueue::<&'static str>::new());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.wait_pop())
        };
        thread::sleep(Duration::from_millis(20));
        q.push("block");
        assert_eq!(consumer.join().unwrap(), "block");
    }

    #[test]
    fn test_timed_wait_pop_receives_late_item() {
        let q = Arc::new(ThreadQueue::<u32>::new());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.timed_wait_pop(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        q.push(7);
        assert_eq!(consumer.join().unwrap(), Some(7));
    }
}
