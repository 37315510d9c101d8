use std::time::{Duration, Instant};

use rand::distributions::{Distribution, Open01};
use rand::{thread_rng, Rng};

/// A cached value together with the bookkeeping needed for probabilistic
/// early expiration.
///
/// An entry records when its value hard-expires and how long the last
/// recomputation took. The cost is the proxy for "how much lead time a
/// refresh needs": the more expensive the value is to rebuild, the
/// earlier [`is_stale`](#method.is_stale) starts returning `true`.
///
/// Entries are normally created by
/// [`StampedeGuard::fetch`](struct.StampedeGuard.html#method.fetch) as
/// the result of a successful recomputation and are replaced wholesale on
/// every refresh. The guard never inspects or mutates the contained
/// value.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    value: V,
    expiry: Instant,
    recompute_cost: Duration,
}

impl<V> CacheEntry<V> {
    /// Create an entry expiring at `expiry`, whose value took
    /// `recompute_cost` to produce.
    pub fn new(value: V, expiry: Instant, recompute_cost: Duration) -> CacheEntry<V> {
        CacheEntry {
            value,
            expiry,
            recompute_cost,
        }
    }

    /// The cached value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// The instant after which the entry is hard-expired.
    pub fn expiry(&self) -> Instant {
        self.expiry
    }

    /// Wall-clock duration of the recomputation that produced the value.
    pub fn recompute_cost(&self) -> Duration {
        self.recompute_cost
    }

    /// Unwraps the value.
    pub fn into_value(self) -> V {
        self.value
    }

    /// The probabilistic early-expiration test, evaluated at an explicit
    /// `now` with an explicit randomness source.
    ///
    /// Draws `u` uniformly from the open interval (0, 1) and reports the
    /// entry stale iff `now - recompute_cost * beta * ln(u)` lies past
    /// the expiry. The decision is reproducible given `now` and the state
    /// of `rng`; each call draws afresh.
    ///
    /// An entry already past `expiry` is stale regardless of the draw,
    /// and `beta == 0` or a zero cost reduce the test to exact TTL
    /// expiration.
    pub fn is_stale_at<R>(&self, beta: f64, now: Instant, rng: &mut R) -> bool
    where
        R: Rng + ?Sized,
    {
        let remaining = match self.expiry.checked_duration_since(now) {
            Some(remaining) => remaining,
            None => return true,
        };
        let u: f64 = Open01.sample(rng);
        // u > 0 strictly, so ln(u) is finite and a zero coefficient
        // cannot produce a NaN.
        let lead = self.recompute_cost.as_secs_f64() * beta * -u.ln();
        lead > remaining.as_secs_f64()
    }

    /// Check whether the entry should be treated as expired.
    ///
    /// With probabilistic early expiration, this method may return `true`
    /// before the entry is really expired.
    pub fn is_stale(&self, beta: f64) -> bool {
        self.is_stale_at(beta, Instant::now(), &mut thread_rng())
    }
}
