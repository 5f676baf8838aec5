//! Eviction listener — a callback invoked once per policy eviction.
//!
//! The listener runs on the write-pipeline thread.  It receives the
//! victim's key-hash (the original key is unknown at that point), the
//! stored value if one could still be fetched, and the cost the policy
//! accounted for the entry.
//!
//! **Do not call any cache method from inside the listener** — it runs
//! while the pipeline is mid-step, and re-entering the cache can deadlock
//! the consumer on its own channel.

use std::sync::Arc;

/// A callback invoked for every entry evicted by the admission policy.
///
/// The value is `None` when the entry could not be fetched back from the
/// store — a colliding 64-bit hash or a racing delete.  Explicit `remove`
/// calls do not fire the listener.
pub trait EvictionListener<V>: Send + Sync + 'static {
    fn on_evict(&self, key_hash: u64, value: Option<Arc<V>>, cost: i64);
}

/// An [`EvictionListener`] backed by a closure.
///
/// Created via [`CacheBuilder::eviction_listener_fn`](crate::CacheBuilder::eviction_listener_fn).
pub struct FnListener<F>(pub F);

impl<V, F> EvictionListener<V> for FnListener<F>
where
    F: Fn(u64, Option<Arc<V>>, i64) + Send + Sync + 'static,
{
    fn on_evict(&self, key_hash: u64, value: Option<Arc<V>>, cost: i64) {
        (self.0)(key_hash, value, cost)
    }
}
