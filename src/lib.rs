#![deny(missing_docs)]
//! Probabilistic early recomputation for cached values.
//!
//! # Cache Stampede
//!
//! A cache stampede is a type of cascading failure that can occur when
//! massively parallel computing systems with caching mechanisms come under
//! very high load. This behaviour is sometimes also called dog-piling.
//!
//! Under normal load, a cache miss triggers a single recomputation to
//! refresh the cache and other processes or threads continue as before.
//!
//! Under heavy load, the expiry of a hot key may be observed by many
//! callers at once, and every one of them starts the same expensive
//! recomputation, adding more load to the very resource the cache was
//! meant to protect.
//!
//! The mitigation implemented here is the XFetch algorithm proposed by
//! Vattani, A.; Chierichetti, F.; Lowenstein, K. (2015) in the paper
//! [Optimal Probabilistic Cache Stampede Prevention][vldb]. Every reader
//! independently volunteers to recompute the value *before* it expires,
//! with a probability that grows as the entry approaches expiration and
//! that is scaled by how long the last recomputation took. Recomputation
//! load is thereby smoothed over an interval leading up to expiry instead
//! of spiking at the expiry instant. No locks and no request coalescing
//! are involved; concurrent recomputation becomes unlikely, not
//! impossible.
//!
//! The decision rule, for a uniform random `u` in the open interval
//! (0, 1):
//!
//! ```ignore
//! recompute if now - recompute_cost * beta * ln(u) > expiry
//! ```
//!
//! `-ln(u)` is exponentially distributed with mean 1, so the random
//! offset has expected value `recompute_cost * beta`. The parameter
//! **beta** can be set greater than `1.0` to favor earlier recomputation
//! or smaller to favor later; `0` disables early expiration entirely and
//! degenerates to exact TTL semantics. The default `1.0` is optimal for
//! most use cases.
//!
//! **recompute_cost** is measured from the time the recomputation
//! callback takes, so values that are slow to rebuild start refreshing
//! earlier.
//!
//! # Examples
//!
//! [`StampedeGuard`] wraps any backing store implementing the two-method
//! [`Cache`] trait. A [`MemoryCache`] is bundled for tests and simple
//! hosts:
//!
//! ```rust
//! use stampede::{MemoryCache, StampedeGuard};
//! use std::time::Duration;
//!
//! let guard = StampedeGuard::new(MemoryCache::new(), 1.0);
//!
//! let value: Result<String, std::io::Error> = guard.fetch("motd", || {
//!     // stand-in for an expensive computation
//!     Ok(("hello".to_string(), Duration::from_secs(60)))
//! });
//! assert_eq!(value.unwrap(), "hello");
//! ```
//!
//! The staleness test is also exposed directly on [`CacheEntry`] for
//! hosts that drive their own cache loop:
//!
//! ```rust
//! use stampede::CacheEntry;
//! use std::time::{Duration, Instant};
//!
//! let entry = CacheEntry::new(
//!     42,
//!     Instant::now() + Duration::from_secs(60),
//!     Duration::from_millis(150),
//! );
//! if !entry.is_stale(1.0) {
//!     assert_eq!(*entry.value(), 42);
//! }
//! ```
//!
//! # References
//!
//! - Wikipedia [Cache Stampede][wikipedia].
//! - Vattani, A.; Chierichetti, F.; Lowenstein, K. (2015), [Optimal
//!   Probabilistic Cache Stampede Prevention][vldb] (PDF), 8 (8), VLDB,
//!   pp. 886-897, ISSN 2150-8097.
//! - Jim Nelson, Internet Archive, [RedisConf17 - Preventing cache
//!   stampede with Redis & XFetch][archive].
//!
//! [vldb]: http://www.vldb.org/pvldb/vol8/p886-vattani.pdf
//! [wikipedia]: https://en.wikipedia.org/wiki/Cache_stampede
//! [archive]: https://www.slideshare.net/RedisLabs/redisconf17-internet-archive-preventing-cache-stampede-with-redis-and-xfetch
//! [`StampedeGuard`]: struct.StampedeGuard.html
//! [`Cache`]: trait.Cache.html
//! [`MemoryCache`]: struct.MemoryCache.html
//! [`CacheEntry`]: struct.CacheEntry.html

mod cache;
mod entry;
mod guard;

pub use crate::cache::{Cache, CacheError, MemoryCache};
pub use crate::entry::CacheEntry;
pub use crate::guard::{Recomputer, StampedeGuard, StampedeGuardBuilder};

/// The default sensitivity coefficient.
///
/// `1.0` is the optimal trade-off between early expiration and stampede
/// prevention for most use cases.
pub const DEFAULT_BETA: f64 = 1.0;
