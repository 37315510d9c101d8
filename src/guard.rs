use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cache::{Cache, CacheError};
use crate::entry::CacheEntry;
use crate::DEFAULT_BETA;

/// A single recomputation of a cached value.
///
/// The guard invokes the recomputer synchronously, at most once per
/// [`fetch`](struct.StampedeGuard.html#method.fetch) call, enforced by
/// the consuming receiver. On success it yields the fresh value together
/// with the duration the value should be considered valid; errors are
/// propagated verbatim to the `fetch` caller, so retries are the
/// recomputer's own business.
///
/// The trait is blanket-implemented for closures, which is the usual way
/// to supply one:
///
/// ```rust
/// use std::time::Duration;
/// # use stampede::{MemoryCache, StampedeGuard};
/// # let guard = StampedeGuard::new(MemoryCache::new(), 1.0);
/// let value: Result<u64, std::io::Error> =
///     guard.fetch("answer", || Ok((42, Duration::from_secs(600))));
/// assert_eq!(value.unwrap(), 42);
/// ```
pub trait Recomputer {
    /// The value produced.
    type Value;
    /// The failure reported when the value cannot be produced.
    type Error;

    /// Produce a fresh value and its time-to-live.
    ///
    /// A zero time-to-live yields an entry that is already expired and
    /// causes an unconditional recompute on the next read.
    fn recompute(self) -> Result<(Self::Value, Duration), Self::Error>;
}

impl<V, E, F> Recomputer for F
where
    F: FnOnce() -> Result<(V, Duration), E>,
{
    type Value = V;
    type Error = E;

    fn recompute(self) -> Result<(V, Duration), E> {
        self()
    }
}

type WriteErrorHook = Box<dyn Fn(&str, &CacheError) + Send + Sync>;

/// Stampede protection for values in a backing cache.
///
/// The guard wraps a [`Cache`](trait.Cache.html) and serves reads
/// through [`fetch`](#method.fetch), refreshing entries probabilistically
/// ahead of their hard expiry. It holds no per-key state of its own; all
/// freshness bookkeeping lives in the [`CacheEntry`] owned by the store,
/// so one process-scoped guard is shared by every caller.
///
/// `fetch` may be invoked concurrently, including for the same key. No
/// exclusion is performed across callers: the algorithm trades a small,
/// tunable probability of duplicate recomputation for freedom from lock
/// contention and from slow recomputations blocking unrelated callers.
///
/// [`CacheEntry`]: struct.CacheEntry.html
pub struct StampedeGuard<C, R = StdRng> {
    cache: C,
    beta: f64,
    rng: Mutex<R>,
    on_write_error: Option<WriteErrorHook>,
}

impl<C: Cache> StampedeGuard<C> {
    /// Return a new guard protecting `cache`.
    ///
    /// The `beta` parameter controls early expiration vs. stampede
    /// prevention: `0` degenerates to exact-TTL expiration, larger
    /// values recompute earlier and more often. `1` is a good default.
    /// The randomness source is seeded from system entropy.
    pub fn new(cache: C, beta: f64) -> StampedeGuard<C> {
        StampedeGuard::builder(cache).with_beta(beta).build()
    }

    /// Return a [`StampedeGuardBuilder`](struct.StampedeGuardBuilder.html)
    /// for a guard protecting `cache`.
    pub fn builder(cache: C) -> StampedeGuardBuilder<C> {
        StampedeGuardBuilder {
            cache,
            beta: DEFAULT_BETA,
            rng: StdRng::from_entropy(),
            on_write_error: None,
        }
    }
}

impl<C, R> StampedeGuard<C, R>
where
    C: Cache,
    R: Rng,
{
    /// The configured sensitivity coefficient.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Retrieve the value for `key`, recomputing it if needed.
    ///
    /// The cached entry is served unless it fails the probabilistic
    /// early-expiration test (or the read misses or faults), in which
    /// case `recompute` runs synchronously on the calling thread and its
    /// result is written back under `key` with
    /// `expiry = recompute start + ttl` and the measured recomputation
    /// cost. The test draws fresh randomness on every call.
    ///
    /// A recompute failure is returned verbatim and leaves the store
    /// untouched, so the previous entry, stale as it was judged, remains
    /// visible to subsequent callers. A write failure is not surfaced:
    /// the freshly computed value is returned regardless, and the
    /// failure goes to the observer hook or the log (see
    /// [`StampedeGuardBuilder::on_write_error`]).
    ///
    /// [`StampedeGuardBuilder::on_write_error`]: struct.StampedeGuardBuilder.html#method.on_write_error
    pub fn fetch<F>(&self, key: &str, recompute: F) -> Result<C::Value, F::Error>
    where
        C::Value: Clone,
        F: Recomputer<Value = C::Value>,
    {
        if let Ok(entry) = self.cache.get(key) {
            // The lock covers only the draw, never the recompute.
            let fresh = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                !entry.is_stale_at(self.beta, Instant::now(), &mut *rng)
            };
            if fresh {
                return Ok(entry.into_value());
            }
        }
        self.refresh(key, recompute)
    }

    fn refresh<F>(&self, key: &str, recompute: F) -> Result<C::Value, F::Error>
    where
        C::Value: Clone,
        F: Recomputer<Value = C::Value>,
    {
        let start = Instant::now();
        let (value, ttl) = recompute.recompute()?;
        let entry = CacheEntry::new(value.clone(), start + ttl, start.elapsed());
        if let Err(err) = self.cache.set(key, entry) {
            match &self.on_write_error {
                Some(hook) => hook(key, &err),
                None => warn!("discarding failed cache write for {:?}: {}", key, err),
            }
        }
        Ok(value)
    }
}

/// The builder for assembling a
/// [`StampedeGuard`](struct.StampedeGuard.html) with supplied
/// parameters.
pub struct StampedeGuardBuilder<C, R = StdRng> {
    cache: C,
    beta: f64,
    rng: R,
    on_write_error: Option<WriteErrorHook>,
}

impl<C, R> StampedeGuardBuilder<C, R> {
    /// Set the beta value.
    ///
    /// Beta must be non-negative. `0` disables early expiration, values
    /// above `1.0` favor more eager early expiration. The default `1.0`
    /// is usually the optimal value.
    pub fn with_beta(mut self, beta: f64) -> StampedeGuardBuilder<C, R> {
        debug_assert!(beta >= 0.0 && beta.is_finite());
        self.beta = beta;
        self
    }

    /// Replace the randomness source.
    ///
    /// The guard owns its generator and draws from it under an internal
    /// lock, so any `Rng` works. Injecting a deterministic generator
    /// makes expiration decisions reproducible in tests.
    pub fn with_rng<R2: Rng>(self, rng: R2) -> StampedeGuardBuilder<C, R2> {
        StampedeGuardBuilder {
            cache: self.cache,
            beta: self.beta,
            rng,
            on_write_error: self.on_write_error,
        }
    }

    /// Observe cache-write failures instead of logging them.
    ///
    /// A failed write never fails the `fetch` that triggered it; the
    /// host decides whether such failures are worth counting, alerting
    /// on, or ignoring. Without a hook they are logged at warn level.
    pub fn on_write_error<F>(mut self, hook: F) -> StampedeGuardBuilder<C, R>
    where
        F: Fn(&str, &CacheError) + Send + Sync + 'static,
    {
        self.on_write_error = Some(Box::new(hook));
        self
    }

    /// Return a new [`StampedeGuard`](struct.StampedeGuard.html) with
    /// the supplied parameters.
    pub fn build(self) -> StampedeGuard<C, R> {
        StampedeGuard {
            cache: self.cache,
            beta: self.beta,
            rng: Mutex::new(self.rng),
            on_write_error: self.on_write_error,
        }
    }
}
