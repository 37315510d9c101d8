use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::entry::CacheEntry;

/// Boxed backend error, opaque to the guard.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported by a backing cache.
///
/// The guard treats both variants identically: a failed read triggers an
/// unconditional recompute and a failed write is absorbed (see
/// [`StampedeGuardBuilder::on_write_error`]). The distinction exists for
/// observers and logs only.
///
/// [`StampedeGuardBuilder::on_write_error`]: struct.StampedeGuardBuilder.html#method.on_write_error
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key is not present in the cache.
    #[error("cache miss")]
    Miss,
    /// The backing store failed to serve the request.
    #[error("cache backend error: {0}")]
    Backend(#[source] BoxError),
}

/// Minimal read/write contract a backing store must satisfy.
///
/// Anything from a process-local map to a distributed key-value store
/// qualifies; storage, eviction, replication and persistence are entirely
/// the implementation's business. Both methods take `&self` so a store
/// handle can be shared between the guard and other users; interior
/// mutability is the implementor's concern.
///
/// A `set` for a key is assumed to eventually be visible to subsequent
/// `get`s for that key. Nothing stronger is required: two concurrent
/// writers for the same key may race, and whichever write the store
/// keeps, wins.
pub trait Cache {
    /// The value type stored under each key.
    type Value;

    /// Read the current entry for `key`.
    fn get(&self, key: &str) -> Result<CacheEntry<Self::Value>, CacheError>;

    /// Replace the entry stored under `key`.
    fn set(&self, key: &str, entry: CacheEntry<Self::Value>) -> Result<(), CacheError>;
}

impl<'a, C: Cache + ?Sized> Cache for &'a C {
    type Value = C::Value;

    fn get(&self, key: &str) -> Result<CacheEntry<Self::Value>, CacheError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, entry: CacheEntry<Self::Value>) -> Result<(), CacheError> {
        (**self).set(key, entry)
    }
}

impl<C: Cache + ?Sized> Cache for Arc<C> {
    type Value = C::Value;

    fn get(&self, key: &str) -> Result<CacheEntry<Self::Value>, CacheError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, entry: CacheEntry<Self::Value>) -> Result<(), CacheError> {
        (**self).set(key, entry)
    }
}

/// An unbounded in-process [`Cache`](trait.Cache.html) over a hash map.
///
/// Suitable for tests, benches and hosts whose working set is small
/// enough not to need eviction. Entries are never dropped except by
/// replacement.
pub struct MemoryCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V> Default for MemoryCache<V> {
    fn default() -> MemoryCache<V> {
        MemoryCache::new()
    }
}

impl<V> MemoryCache<V> {
    /// Create an empty cache.
    pub fn new() -> MemoryCache<V> {
        MemoryCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> Cache for MemoryCache<V> {
    type Value = V;

    fn get(&self, key: &str) -> Result<CacheEntry<V>, CacheError> {
        self.lock().get(key).cloned().ok_or(CacheError::Miss)
    }

    fn set(&self, key: &str, entry: CacheEntry<V>) -> Result<(), CacheError> {
        self.lock().insert(key.to_owned(), entry);
        Ok(())
    }
}
