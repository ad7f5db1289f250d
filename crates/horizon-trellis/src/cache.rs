//! The shared instance cache.
//!
//! Externally-loaded, read-only instances are cached across sessions, keyed
//! by their [`InstanceCaching`] descriptor (resolved URL + parameter
//! fingerprint). The cache is the one structure in the engine accessed by
//! concurrent sessions, and its contract is:
//!
//! - **single-flight**: concurrent requests for the same key observe at
//!   most one physical fetch — one caller loads, the rest wait;
//! - **immutable entries**: a cached tree is frozen before publication, so
//!   readers never see partial results;
//! - **bounded**: beyond capacity, the oldest-inserted entries are evicted.
//!
//! A load failure is returned to the caller that performed the fetch;
//! waiters for the failed key re-enter the protocol and one of them retries
//! the fetch as the new leader (each caller performs at most one fetch).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use horizon_trellis_core::DataTree;

use crate::instance::InstanceCaching;
use crate::load::{InstanceLoader, LoadError};

/// Default entry capacity.
pub const DEFAULT_CAPACITY: usize = 64;

/// An in-flight fetch other callers can wait on.
struct Flight {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.signal.wait(&mut done);
        }
    }

    fn complete(&self) {
        *self.done.lock() = true;
        self.signal.notify_all();
    }
}

enum Slot {
    Ready(Arc<DataTree>),
    InFlight(Arc<Flight>),
}

struct CacheState {
    entries: HashMap<InstanceCaching, Slot>,
    /// Ready keys in insertion order, for eviction.
    order: VecDeque<InstanceCaching>,
}

/// Cross-session cache for externally-loaded read-only instances.
pub struct SharedInstanceCache {
    state: Mutex<CacheState>,
    capacity: usize,
}

impl SharedInstanceCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a cache bounded to `capacity` ready entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Return the cached content for the descriptor, fetching it through
    /// `loader` on a miss. Concurrent callers with the same descriptor share
    /// one fetch.
    pub fn find_content_or_load(
        &self,
        caching: &InstanceCaching,
        loader: &dyn InstanceLoader,
        follow_includes: bool,
    ) -> Result<Arc<DataTree>, LoadError> {
        loop {
            let flight = {
                let mut state = self.state.lock();
                match state.entries.get(caching) {
                    Some(Slot::Ready(tree)) => {
                        tracing::trace!(
                            target: "horizon_trellis::cache",
                            url = caching.resolved_url(),
                            "cache hit"
                        );
                        return Ok(tree.clone());
                    }
                    Some(Slot::InFlight(flight)) => flight.clone(),
                    None => {
                        let flight = Arc::new(Flight::new());
                        state
                            .entries
                            .insert(caching.clone(), Slot::InFlight(flight.clone()));
                        drop(state);
                        return self.fill(caching, loader, follow_includes, &flight);
                    }
                }
            };
            flight.wait();
        }
    }

    /// Perform the physical fetch as the flight leader and publish the
    /// outcome.
    fn fill(
        &self,
        caching: &InstanceCaching,
        loader: &dyn InstanceLoader,
        follow_includes: bool,
        flight: &Flight,
    ) -> Result<Arc<DataTree>, LoadError> {
        tracing::debug!(
            target: "horizon_trellis::cache",
            url = caching.resolved_url(),
            "cache miss, loading"
        );
        let result = loader
            .load(caching.resolved_url(), follow_includes, true)
            .map(|mut tree| {
                // Entries are immutable once cached.
                tree.make_read_only();
                Arc::new(tree)
            });

        {
            let mut state = self.state.lock();
            match &result {
                Ok(tree) => {
                    state.entries.insert(caching.clone(), Slot::Ready(tree.clone()));
                    state.order.push_back(caching.clone());
                    while state.order.len() > self.capacity {
                        let Some(oldest) = state.order.pop_front() else {
                            break;
                        };
                        if oldest == *caching {
                            state.order.push_back(oldest);
                            break;
                        }
                        tracing::trace!(
                            target: "horizon_trellis::cache",
                            url = oldest.resolved_url(),
                            "evicting oldest entry"
                        );
                        state.entries.remove(&oldest);
                    }
                }
                Err(_) => {
                    state.entries.remove(caching);
                }
            }
        }
        flight.complete();
        result
    }

    /// Number of ready entries.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Whether the cache holds no ready entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the ready entry for the descriptor, if present. Returns whether
    /// an entry was removed.
    pub fn remove(&self, caching: &InstanceCaching) -> bool {
        let mut state = self.state.lock();
        if matches!(state.entries.get(caching), Some(Slot::Ready(_))) {
            state.entries.remove(caching);
            state.order.retain(|key| key != caching);
            true
        } else {
            false
        }
    }

    /// Drop every ready entry. In-flight fetches are left to finish.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state
            .entries
            .retain(|_, slot| matches!(slot, Slot::InFlight(_)));
        state.order.clear();
    }
}

impl Default for SharedInstanceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        fetches: AtomicUsize,
        fail: bool,
    }

    impl CountingLoader {
        fn new() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl InstanceLoader for CountingLoader {
        fn load(
            &self,
            resolved_url: &str,
            _follow_includes: bool,
            _read_only: bool,
        ) -> Result<DataTree, LoadError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(LoadError::fetch(resolved_url, "boom"))
            } else {
                Ok(DataTree::new("data"))
            }
        }
    }

    fn descriptor(url: &str) -> InstanceCaching {
        InstanceCaching::new(url, Vec::new())
    }

    #[test]
    fn test_second_lookup_is_a_hit() {
        let cache = SharedInstanceCache::new();
        let loader = CountingLoader::new();
        let key = descriptor("http://example.org/a.xml");

        let first = cache.find_content_or_load(&key, &loader, false).unwrap();
        let second = cache.find_content_or_load(&key, &loader, false).unwrap();

        assert_eq!(loader.count(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is_read_only());
    }

    #[test]
    fn test_different_parameters_fetch_independently() {
        let cache = SharedInstanceCache::new();
        let loader = CountingLoader::new();
        let plain = descriptor("http://example.org/a.xml");
        let with_param = InstanceCaching::new(
            "http://example.org/a.xml",
            vec![("lang".into(), "fr".into())],
        );

        cache.find_content_or_load(&plain, &loader, false).unwrap();
        cache.find_content_or_load(&with_param, &loader, false).unwrap();

        assert_eq!(loader.count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failed_load_leaves_no_entry() {
        let cache = SharedInstanceCache::new();
        let loader = CountingLoader::failing();
        let key = descriptor("http://example.org/a.xml");

        assert!(cache.find_content_or_load(&key, &loader, false).is_err());
        assert!(cache.is_empty());

        // The next caller becomes a new leader and fetches again.
        assert!(cache.find_content_or_load(&key, &loader, false).is_err());
        assert_eq!(loader.count(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = SharedInstanceCache::with_capacity(2);
        let loader = CountingLoader::new();
        let a = descriptor("http://example.org/a.xml");
        let b = descriptor("http://example.org/b.xml");
        let c = descriptor("http://example.org/c.xml");

        cache.find_content_or_load(&a, &loader, false).unwrap();
        cache.find_content_or_load(&b, &loader, false).unwrap();
        cache.find_content_or_load(&c, &loader, false).unwrap();
        assert_eq!(cache.len(), 2);

        // `a` was evicted, so it loads again.
        cache.find_content_or_load(&a, &loader, false).unwrap();
        assert_eq!(loader.count(), 4);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = SharedInstanceCache::new();
        let loader = CountingLoader::new();
        let key = descriptor("http://example.org/a.xml");

        cache.find_content_or_load(&key, &loader, false).unwrap();
        assert!(cache.remove(&key));
        assert!(!cache.remove(&key));
        cache.find_content_or_load(&key, &loader, false).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
