//! Single-flight concurrent cache.
//!
//! A [`SharedCache`] maps keys to computed values. When several threads ask for
//! the same missing key at once, exactly one of them runs the producer; the
//! others block until it finishes and then read its result.
//!
//! The map lock is only held for short slot inspections. While a value is being
//! produced its slot holds an in-flight marker, so unrelated keys are never
//! serialized behind a slow computation.
//!
//! A failed (or panicking) producer removes its marker and wakes the waiters,
//! which then retry the computation themselves. Failures are never cached.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// State of one cache slot.
enum Slot<V> {
    Ready(V),
    InFlight(Arc<Flight>),
}

/// Marker for a value being produced.
///
/// `done` flips to true once the producer has stored its result (or given up).
#[derive(Default)]
struct Flight {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Flight {
    fn wait(&self) {
        let mut done = lock(&self.done);
        while !*done {
            done = self
                .signal
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn finish(&self) {
        *lock(&self.done) = true;
        self.signal.notify_all();
    }
}

/// Concurrent key → value map with at-most-one computation per key.
pub struct SharedCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for SharedCache<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> std::fmt::Debug for SharedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = lock(&self.slots);
        let ready = slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count();
        f.debug_struct("SharedCache")
            .field("ready", &ready)
            .field("in_flight", &(slots.len() - ready))
            .finish()
    }
}

/// Outcome of a slot inspection under the map lock.
enum Probe<V> {
    Hit(V),
    Wait(Arc<Flight>),
    Produce(Arc<Flight>),
}

impl<K, V> SharedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached value, waiting for an in-flight computation if there is one.
    pub fn get(&self, key: &K) -> Option<V> {
        loop {
            let flight = {
                let slots = lock(&self.slots);
                match slots.get(key) {
                    Some(Slot::Ready(value)) => return Some(value.clone()),
                    Some(Slot::InFlight(flight)) => Arc::clone(flight),
                    None => return None,
                }
            };
            flight.wait();
        }
    }

    /// Get the value for `key`, producing it with `produce` if it is missing.
    ///
    /// `produce` runs without any cache lock held. It must not request the same
    /// key from this cache, since that would wait on itself.
    pub fn get_or_try_insert_with<E, F>(&self, key: K, produce: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        // Waiters loop back here when the producer they waited on failed
        let flight = loop {
            match self.probe(&key) {
                Probe::Hit(value) => return Ok(value),
                Probe::Wait(flight) => flight.wait(),
                Probe::Produce(flight) => break flight,
            }
        };

        let mut guard = FlightGuard {
            cache: self,
            key: Some(key),
            flight,
        };
        let value = produce()?;
        guard.complete(value.clone());
        Ok(value)
    }

    /// Infallible form of [`get_or_try_insert_with`](Self::get_or_try_insert_with).
    pub fn get_or_insert_with<F>(&self, key: K, produce: F) -> V
    where
        F: FnOnce() -> V,
    {
        match self.get_or_try_insert_with::<std::convert::Infallible, _>(key, || Ok(produce())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Store a value, replacing whatever was there.
    ///
    /// An in-flight producer for the same key is not interrupted; its result
    /// overwrites this one when it completes.
    pub fn insert(&self, key: K, value: V) {
        let mut slots = lock(&self.slots);
        if let Some(Slot::InFlight(_)) = slots.get(&key) {
            return;
        }
        slots.insert(key, Slot::Ready(value));
    }

    /// Remove a ready value. In-flight slots are left alone.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut slots = lock(&self.slots);
        match slots.get(key) {
            Some(Slot::Ready(_)) => match slots.remove(key) {
                Some(Slot::Ready(value)) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    /// Drop all ready values.
    pub fn clear(&self) {
        lock(&self.slots).retain(|_, slot| matches!(slot, Slot::InFlight(_)));
    }

    /// Number of ready values.
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn probe(&self, key: &K) -> Probe<V> {
        let mut slots = lock(&self.slots);
        match slots.get(key) {
            Some(Slot::Ready(value)) => Probe::Hit(value.clone()),
            Some(Slot::InFlight(flight)) => Probe::Wait(Arc::clone(flight)),
            None => {
                let flight = Arc::new(Flight::default());
                slots.insert(key.clone(), Slot::InFlight(Arc::clone(&flight)));
                Probe::Produce(flight)
            }
        }
    }
}

/// Releases an in-flight slot when the producer returns, fails or panics.
struct FlightGuard<'a, K: Eq + Hash, V> {
    cache: &'a SharedCache<K, V>,
    key: Option<K>,
    flight: Arc<Flight>,
}

impl<K: Eq + Hash, V> FlightGuard<'_, K, V> {
    fn complete(&mut self, value: V) {
        if let Some(key) = self.key.take() {
            lock(&self.cache.slots).insert(key, Slot::Ready(value));
            self.flight.finish();
        }
    }
}

impl<K: Eq + Hash, V> Drop for FlightGuard<'_, K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.cache.slots).remove(&key);
            self.flight.finish();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_get_missing() {
        let cache: SharedCache<String, u32> = SharedCache::new();
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_produce_once_then_hit() {
        let cache = SharedCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let value = cache.get_or_insert_with("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                42
            });
            assert_eq!(value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&"k"), Some(42));
    }

    #[test]
    fn test_concurrent_callers_share_one_computation() {
        let cache = Arc::new(SharedCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_insert_with("shared".to_string(), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        "value".to_string()
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().expect("thread panicked"), "value");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_is_not_cached() {
        let cache: SharedCache<&str, u32> = SharedCache::new();
        let result: Result<u32, String> = cache.get_or_try_insert_with("k", || Err("boom".into()));
        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(cache.get(&"k"), None);

        let result: Result<u32, String> = cache.get_or_try_insert_with("k", || Ok(7));
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn test_waiters_retry_after_failure() {
        let cache = Arc::new(SharedCache::<&str, u32>::new());
        let started = Arc::new(Barrier::new(2));

        let failing = {
            let cache = Arc::clone(&cache);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                cache.get_or_try_insert_with("k", || {
                    started.wait();
                    thread::sleep(Duration::from_millis(50));
                    Err::<u32, _>("failed")
                })
            })
        };

        started.wait();
        let value: Result<u32, &str> = cache.get_or_try_insert_with("k", || Ok(9));
        assert_eq!(value, Ok(9));
        assert_eq!(failing.join().expect("thread panicked"), Err("failed"));
        assert_eq!(cache.get(&"k"), Some(9));
    }

    #[test]
    fn test_panicking_producer_releases_slot() {
        let cache = Arc::new(SharedCache::<&str, u32>::new());
        let panicking = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get_or_insert_with("k", || panic!("producer panicked")))
        };
        assert!(panicking.join().is_err());
        assert_eq!(cache.get(&"k"), None);
        assert_eq!(cache.get_or_insert_with("k", || 1), 1);
    }

    #[test]
    fn test_unrelated_keys_do_not_block() {
        let cache = Arc::new(SharedCache::<u32, u32>::new());
        let inside = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let slow = {
            let cache = Arc::clone(&cache);
            let inside = Arc::clone(&inside);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                cache.get_or_insert_with(1, || {
                    inside.wait();
                    release.wait();
                    10
                })
            })
        };

        inside.wait();
        // Key 1 is in flight; key 2 must still be computable
        assert_eq!(cache.get_or_insert_with(2, || 20), 20);
        release.wait();
        assert_eq!(slow.join().expect("thread panicked"), 10);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = SharedCache::new();
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.remove(&"a"), Some(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
