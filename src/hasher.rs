//! Key hashing — maps user keys into the cache's 64-bit identity space.
//!
//! The cache never stores keys.  Every key is reduced to a 64-bit key-hash
//! (seed 0) which is the entry's identity everywhere: in the store shards,
//! the policy's cost map, and the frequency sketch.  When the builder asks
//! for chained hashes, additional seeds produce the conflict identifier
//! that guards against 64-bit collisions on lookup.

use std::hash::Hash;

use ahash::RandomState;

/// Produces a 64-bit hash of `key` for the given `seed`.
///
/// Seed 0 yields the key-hash; seeds `1..n` feed the conflict identifier
/// when the cache is built with `hashes(n)`.  Implementations must be
/// deterministic per seed for the lifetime of the cache.
pub trait KeyHasher<K>: Send + Sync + 'static {
    fn hash_key(&self, key: &K, seed: u8) -> u64;
}

/// Default hasher: ahash with a per-cache random state, seed mixed in as
/// a hash prefix so each seed behaves as an independent function.
pub(crate) struct DefaultKeyHasher {
    state: RandomState,
}

impl DefaultKeyHasher {
    pub(crate) fn new() -> Self {
        DefaultKeyHasher {
            state: RandomState::new(),
        }
    }
}

impl<K: Hash> KeyHasher<K> for DefaultKeyHasher {
    #[inline]
    fn hash_key(&self, key: &K, seed: u8) -> u64 {
        self.state.hash_one((seed, key))
    }
}

/// A [`KeyHasher`] backed by a closure.
///
/// Created via [`CacheBuilder::key_hasher_fn`](crate::CacheBuilder::key_hasher_fn).
pub struct FnKeyHasher<F>(pub F);

impl<K, F> KeyHasher<K> for FnKeyHasher<F>
where
    F: Fn(&K, u8) -> u64 + Send + Sync + 'static,
{
    #[inline]
    fn hash_key(&self, key: &K, seed: u8) -> u64 {
        (self.0)(key, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_seed_is_stable() {
        let h = DefaultKeyHasher::new();
        let a = h.hash_key(&"key", 0);
        let b = h.hash_key(&"key", 0);
        assert_eq!(a, b);
    }

    #[test]
    fn seeds_produce_independent_hashes() {
        let h = DefaultKeyHasher::new();
        assert_ne!(h.hash_key(&"key", 0), h.hash_key(&"key", 1));
    }
}
