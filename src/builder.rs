use std::hash::Hash;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::Cache;
use crate::cost::{Coster, FnCoster};
use crate::hasher::{FnKeyHasher, KeyHasher};
use crate::listener::{EvictionListener, FnListener};

/// Builder for configuring and constructing a [`Cache`].
///
/// Three knobs are required and must be nonzero:
///
/// - `num_counters` — frequency counters to keep.  10x the expected
///   entry count at capacity is good guidance; each counter is 4 bits.
/// - `max_cost` — capacity, in whatever units `insert` costs use.
/// - `buffer_items` — read-buffer stripe capacity; 64 suits almost
///   every workload and is the default.
///
/// # Example
/// ```
/// use lungo::CacheBuilder;
///
/// let cache: lungo::Cache<u64, u64> = CacheBuilder::new(10_000, 1_000)
///     .metrics(true)
///     .build()
///     .unwrap();
/// # let _ = cache;
/// ```
pub struct CacheBuilder<K, V> {
    pub(crate) num_counters: usize,
    pub(crate) max_cost: i64,
    pub(crate) buffer_items: usize,
    pub(crate) metrics: bool,
    pub(crate) hashes: u8,
    pub(crate) hasher: Option<Box<dyn KeyHasher<K>>>,
    pub(crate) coster: Option<Box<dyn Coster<V>>>,
    pub(crate) listener: Option<Box<dyn EvictionListener<V>>>,
}

/// Configuration rejected by [`CacheBuilder::build`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("num_counters can't be zero")]
    ZeroNumCounters,
    #[error("max_cost can't be zero")]
    ZeroMaxCost,
    #[error("buffer_items can't be zero")]
    ZeroBufferItems,
}

impl<K, V> CacheBuilder<K, V> {
    pub fn new(num_counters: usize, max_cost: i64) -> Self {
        CacheBuilder {
            num_counters,
            max_cost,
            buffer_items: 64,
            metrics: false,
            hashes: 0,
            hasher: None,
            coster: None,
            listener: None,
        }
    }

    /// Capacity of each read-buffer stripe (default: 64).
    pub fn buffer_items(mut self, n: usize) -> Self {
        self.buffer_items = n;
        self
    }

    /// Enables statistics collection.  Off by default; keeping the
    /// counters costs a little on every operation.
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled;
        self
    }

    /// Number of chained 64-bit hashes forming each entry's conflict
    /// identifier.  0 or 1 means 64-bit key identity only; 2 or more
    /// enables collision detection on lookup at some throughput cost.
    pub fn hashes(mut self, n: u8) -> Self {
        self.hashes = n;
        self
    }

    /// Custom key hashing via the [`KeyHasher`] trait.
    pub fn key_hasher<H: KeyHasher<K>>(mut self, h: H) -> Self {
        self.hasher = Some(Box::new(h));
        self
    }

    /// Custom key hashing via closure `(key, seed) -> u64`.
    pub fn key_hasher_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, u8) -> u64 + Send + Sync + 'static,
    {
        self.hasher = Some(Box::new(FnKeyHasher(f)));
        self
    }

    /// Cost function via the [`Coster`] trait, consulted by the pipeline
    /// when an item arrives with cost 0.
    pub fn coster<C: Coster<V>>(mut self, c: C) -> Self {
        self.coster = Some(Box::new(c));
        self
    }

    /// Cost function via closure.
    pub fn coster_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&V) -> i64 + Send + Sync + 'static,
    {
        self.coster = Some(Box::new(FnCoster(f)));
        self
    }

    /// Eviction callback via the [`EvictionListener`] trait, invoked once
    /// per policy eviction with the victim's key-hash, value (when still
    /// fetchable), and cost.
    ///
    /// Runs on the pipeline thread; keep it cheap and never call back
    /// into the cache from it.
    pub fn eviction_listener<L: EvictionListener<V>>(mut self, l: L) -> Self {
        self.listener = Some(Box::new(l));
        self
    }

    /// Eviction callback via closure.
    pub fn eviction_listener_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, Option<Arc<V>>, i64) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(FnListener(f)));
        self
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + 'static,
    V: Send + Sync + 'static,
{
    /// Validates the configuration and constructs the cache, spawning
    /// its pipeline consumer.
    pub fn build(self) -> Result<Cache<K, V>, BuildError> {
        if self.num_counters == 0 {
            return Err(BuildError::ZeroNumCounters);
        }
        if self.max_cost == 0 {
            return Err(BuildError::ZeroMaxCost);
        }
        if self.buffer_items == 0 {
            return Err(BuildError::ZeroBufferItems);
        }
        Ok(Cache::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_valued_required_options_fail() {
        assert!(matches!(
            CacheBuilder::<u64, u64>::new(0, 10).build(),
            Err(BuildError::ZeroNumCounters)
        ));
        assert!(matches!(
            CacheBuilder::<u64, u64>::new(100, 0).build(),
            Err(BuildError::ZeroMaxCost)
        ));
        assert!(matches!(
            CacheBuilder::<u64, u64>::new(100, 10).buffer_items(0).build(),
            Err(BuildError::ZeroBufferItems)
        ));
    }

    #[test]
    fn defaults_build_successfully() {
        let cache = CacheBuilder::<u64, u64>::new(100, 10).build();
        assert!(cache.is_ok());
        cache.unwrap().close();
    }
}
