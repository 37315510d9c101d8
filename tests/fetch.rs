use std::io;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lru::LruCache;
use stampede::{Cache, CacheEntry, CacheError, MemoryCache, StampedeGuard};

/// A bounded backing store: the guard is indifferent to eviction, an
/// evicted key is simply a miss that triggers recomputation.
struct LruStore<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
}

impl<V> LruStore<V> {
    fn with_capacity(cap: usize) -> LruStore<V> {
        LruStore {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(cap).unwrap())),
        }
    }
}

impl<V: Clone> Cache for LruStore<V> {
    type Value = V;

    fn get(&self, key: &str) -> Result<CacheEntry<V>, CacheError> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(CacheError::Miss)
    }

    fn set(&self, key: &str, entry: CacheEntry<V>) -> Result<(), CacheError> {
        self.entries.lock().unwrap().put(key.to_owned(), entry);
        Ok(())
    }
}

#[test]
fn cold_fetch_computes_and_records_cost() {
    let cache = Arc::new(MemoryCache::new());
    let guard = StampedeGuard::new(Arc::clone(&cache), 1.0);
    let delay = Duration::from_millis(50);
    let ttl = Duration::from_secs(10);

    let before = Instant::now();
    let value: String = guard
        .fetch("k", || -> Result<_, io::Error> {
            thread::sleep(delay);
            Ok(("v1".to_string(), ttl))
        })
        .unwrap();
    let after = Instant::now();
    assert_eq!(value, "v1");

    let entry = cache.get("k").unwrap();
    assert_eq!(*entry.value(), "v1");
    assert!(entry.recompute_cost() >= delay);
    assert!(entry.recompute_cost() <= after - before);
    assert!(entry.expiry() >= before + ttl);
    assert!(entry.expiry() <= after + ttl);
}

#[test]
fn recompute_error_reaches_the_caller() {
    let guard = StampedeGuard::new(MemoryCache::new(), 1.0);

    let err = guard
        .fetch("k", || -> Result<(String, Duration), io::Error> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "db down"))
        })
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
}

#[test]
fn zero_ttl_recomputes_on_every_read() {
    let guard = StampedeGuard::new(MemoryCache::new(), 1.0);
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        thread::sleep(Duration::from_millis(2));
        let value: u64 = guard
            .fetch("k", || -> Result<_, io::Error> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok((7, Duration::from_secs(0)))
            })
            .unwrap();
        assert_eq!(value, 7);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn eviction_is_just_a_miss() {
    let guard = StampedeGuard::new(LruStore::with_capacity(1), 1.0);
    let calls = AtomicUsize::new(0);
    let fetch = |key: &str| -> u64 {
        guard
            .fetch(key, || -> Result<_, io::Error> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok((1, Duration::from_secs(60)))
            })
            .unwrap()
    };

    fetch("a");
    fetch("b"); // evicts "a"
    fetch("a"); // recomputed, evicts "b"
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn concurrent_readers_share_a_fresh_entry() {
    let guard = Arc::new(StampedeGuard::new(MemoryCache::new(), 1.0));
    guard
        .fetch("hot", || -> Result<_, io::Error> {
            Ok((42u64, Duration::from_secs(600)))
        })
        .unwrap();

    let recomputes = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let guard = Arc::clone(&guard);
        let recomputes = Arc::clone(&recomputes);
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                let value = guard
                    .fetch("hot", || -> Result<_, io::Error> {
                        recomputes.fetch_add(1, Ordering::SeqCst);
                        Ok((42u64, Duration::from_secs(600)))
                    })
                    .unwrap();
                assert_eq!(value, 42);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // The entry's recompute cost is microseconds and its expiry minutes
    // away; the random lead is bounded by roughly 37 times the cost, so
    // no reader should have volunteered this far from expiry.
    assert_eq!(recomputes.load(Ordering::SeqCst), 0);
}
