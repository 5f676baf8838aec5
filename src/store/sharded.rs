//! The central concurrent key-value store.
//!
//! Entries are keyed by their 64-bit key-hash; the original key never
//! reaches the store.  The map is split across 256 independently
//! RwLock-guarded shards picked by the low bits of the key-hash, so
//! readers proceed in parallel and writers only contend per shard.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

pub(crate) const NUM_SHARDS: usize = 256;
const SHARD_MASK: u64 = (NUM_SHARDS as u64) - 1;

struct StoreEntry<V> {
    /// Secondary identity for collision detection; 0 = not configured.
    conflict: u64,
    value: Arc<V>,
}

/// Cache-line alignment keeps neighbouring shard locks off each other's
/// lines.
#[repr(align(64))]
struct Shard<V> {
    map: RwLock<AHashMap<u64, StoreEntry<V>>>,
}

pub(crate) struct ShardedStore<V> {
    shards: Box<[Shard<V>]>,
}

impl<V> ShardedStore<V> {
    pub(crate) fn new() -> Self {
        let shards = (0..NUM_SHARDS)
            .map(|_| Shard {
                map: RwLock::new(AHashMap::new()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        ShardedStore { shards }
    }

    #[inline]
    fn shard(&self, key_hash: u64) -> &Shard<V> {
        &self.shards[(key_hash & SHARD_MASK) as usize]
    }

    /// Returns the value for `key_hash`, or `None` if absent.
    ///
    /// A nonzero `conflict` is compared against the stored conflict hash;
    /// a mismatch reads as not-found.  Passing `conflict = 0` skips the
    /// check — the force path used for victims, whose original key is
    /// unknown.
    pub(crate) fn get(&self, key_hash: u64, conflict: u64) -> Option<Arc<V>> {
        let map = self.shard(key_hash).map.read();
        let entry = map.get(&key_hash)?;
        if conflict != 0 && entry.conflict != 0 && entry.conflict != conflict {
            return None;
        }
        Some(Arc::clone(&entry.value))
    }

    /// Unconditional insert; replaces any entry with the same key-hash.
    pub(crate) fn set(&self, key_hash: u64, conflict: u64, value: Arc<V>) {
        self.shard(key_hash)
            .map
            .write()
            .insert(key_hash, StoreEntry { conflict, value });
    }

    /// Replaces the value iff an entry exists for `key_hash` (and the
    /// conflict hashes agree).  Returns whether the entry was present.
    pub(crate) fn update(&self, key_hash: u64, conflict: u64, value: Arc<V>) -> bool {
        let mut map = self.shard(key_hash).map.write();
        match map.get_mut(&key_hash) {
            Some(entry) => {
                if conflict != 0 && entry.conflict != 0 && entry.conflict != conflict {
                    return false;
                }
                entry.value = value;
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `key_hash`; no-op if absent or if a nonzero
    /// `conflict` disagrees.
    pub(crate) fn remove(&self, key_hash: u64, conflict: u64) {
        let mut map = self.shard(key_hash).map.write();
        let matches = match map.get(&key_hash) {
            Some(entry) => conflict == 0 || entry.conflict == 0 || entry.conflict == conflict,
            None => false,
        };
        if matches {
            map.remove(&key_hash);
        }
    }

    /// Removes every entry from every shard.
    pub(crate) fn clear(&self) {
        for shard in self.shards.iter() {
            shard.map.write().clear();
        }
    }

    /// Total number of entries across all shards.
    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.read().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ShardedStore<String> {
        ShardedStore::new()
    }

    #[test]
    fn set_then_get() {
        let s = store();
        s.set(1, 0, Arc::new("a".to_string()));
        assert_eq!(s.get(1, 0).as_deref(), Some(&"a".to_string()));
    }

    #[test]
    fn get_missing_is_none() {
        let s = store();
        assert!(s.get(99, 0).is_none());
    }

    #[test]
    fn conflict_mismatch_reads_as_not_found() {
        let s = store();
        s.set(1, 1111, Arc::new("a".to_string()));
        assert!(s.get(1, 2222).is_none());
        assert!(s.get(1, 1111).is_some());
        // Force path ignores the stored conflict.
        assert!(s.get(1, 0).is_some());
    }

    #[test]
    fn update_requires_presence() {
        let s = store();
        assert!(!s.update(5, 0, Arc::new("x".to_string())));
        s.set(5, 0, Arc::new("x".to_string()));
        assert!(s.update(5, 0, Arc::new("y".to_string())));
        assert_eq!(s.get(5, 0).as_deref(), Some(&"y".to_string()));
    }

    #[test]
    fn update_with_wrong_conflict_is_refused() {
        let s = store();
        s.set(5, 1111, Arc::new("x".to_string()));
        assert!(!s.update(5, 2222, Arc::new("y".to_string())));
        assert_eq!(s.get(5, 1111).as_deref(), Some(&"x".to_string()));
    }

    #[test]
    fn remove_honours_conflict() {
        let s = store();
        s.set(7, 1111, Arc::new("v".to_string()));
        s.remove(7, 2222);
        assert!(s.get(7, 1111).is_some(), "mismatched remove must be a no-op");
        s.remove(7, 0);
        assert!(s.get(7, 0).is_none());
    }

    #[test]
    fn clear_empties_every_shard() {
        let s = store();
        for h in 0..1000u64 {
            s.set(h, 0, Arc::new(h.to_string()));
        }
        assert_eq!(s.len(), 1000);
        s.clear();
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn hashes_land_in_distinct_shards() {
        let s = store();
        // Hashes 0..256 cover every shard via the low bits.
        for h in 0..NUM_SHARDS as u64 {
            s.set(h, 0, Arc::new(h.to_string()));
        }
        assert_eq!(s.len(), NUM_SHARDS);
    }
}
