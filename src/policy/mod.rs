pub(crate) mod sketch;

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::buffer::read::RingConsumer;
use crate::metrics::{MetricType, Metrics};

use self::sketch::TinyLfu;

/// How many cost-map entries are sampled per eviction round.
const SAMPLE_SIZE: usize = 5;

/// A (key-hash, cost) pair the policy has already evicted from its cost
/// map.  The pipeline still has to remove it from the store and fire the
/// eviction callback.
pub(crate) struct Victim {
    pub(crate) key_hash: u64,
    pub(crate) cost: i64,
}

// ---------------------------------------------------------------------------
// LfuPolicy
// ---------------------------------------------------------------------------

/// Admission and eviction: TinyLFU filtering over sampled-LFU victims.
///
/// Two locks split the state so read-signal absorption never blocks on
/// cost accounting:
///
/// - `admit` guards the frequency sketch and doorkeeper.  [`push`]
///   (ring-buffer flushes, any producer thread) takes it with `try_lock`
///   and drops the batch on contention; [`add`] takes it blocking for its
///   frequency estimates.
/// - `evict` guards the cost map and the `used` total.  Only the write
///   pipeline mutates it.
///
/// Lock order is always `admit` before `evict`.
///
/// [`push`]: LfuPolicy::push
/// [`add`]: LfuPolicy::add
pub(crate) struct LfuPolicy {
    admit: Mutex<TinyLfu>,
    evict: Mutex<SampledLfu>,
    metrics: Option<Arc<Metrics>>,
}

impl LfuPolicy {
    pub(crate) fn new(num_counters: usize, max_cost: i64, metrics: Option<Arc<Metrics>>) -> Self {
        LfuPolicy {
            admit: Mutex::new(TinyLfu::new(num_counters)),
            evict: Mutex::new(SampledLfu {
                key_costs: AHashMap::new(),
                max_cost,
                used: 0,
            }),
            metrics,
        }
    }

    /// Absorbs a batch of read signals into the frequency sketch.
    ///
    /// Non-blocking: returns `false` (batch dropped) when the sketch is
    /// busy.  Read signals are best-effort — the sketch only needs
    /// representative frequency, not exact counts.
    pub(crate) fn push(&self, batch: &[u64]) -> bool {
        match self.admit.try_lock() {
            Some(mut admit) => {
                for &hash in batch {
                    admit.observe(hash);
                }
                true
            }
            None => false,
        }
    }

    /// Asks the policy to admit `key_hash` at `cost`.
    ///
    /// Returns the victims that were evicted to make room and whether the
    /// candidate was admitted.  Victims are returned even when the
    /// candidate ultimately loses the admission contest — their cost
    /// entries are already gone, so the store must shed them either way.
    pub(crate) fn add(&self, key_hash: u64, cost: i64) -> (Vec<Victim>, bool) {
        let admit = self.admit.lock();
        let mut evict = self.evict.lock();

        // Oversized items can never fit.
        if cost > evict.max_cost {
            self.record(MetricType::SetsRejected, key_hash, 1);
            return (Vec::new(), false);
        }

        // Already tracked: treat as a cost update, no victim selection.
        if evict.update_if_has(key_hash, cost, &self.metrics) {
            return (Vec::new(), true);
        }

        let cand_freq = admit.estimate(key_hash);
        let mut victims = Vec::new();
        let mut sample: Vec<(u64, i64)> = Vec::with_capacity(SAMPLE_SIZE);

        while evict.room_left(cost) < 0 {
            evict.fill_sample(&mut sample);

            if sample.is_empty() {
                break;
            }

            // Minimum-frequency element of the sample is the victim.
            let mut min_idx = 0;
            let mut min_freq = i64::MAX;
            for (i, &(hash, _)) in sample.iter().enumerate() {
                let freq = admit.estimate(hash);
                if freq < min_freq {
                    min_freq = freq;
                    min_idx = i;
                }
            }

            // The admission contest: a strictly less frequent candidate
            // loses; ties go to the newcomer.
            if cand_freq < min_freq {
                self.record(MetricType::SetsRejected, key_hash, 1);
                return (victims, false);
            }

            let (victim_hash, victim_cost) = sample.swap_remove(min_idx);
            // A stale carry-over entry may already be gone; skip it.
            if evict.del(victim_hash, &self.metrics).is_some() {
                victims.push(Victim {
                    key_hash: victim_hash,
                    cost: victim_cost,
                });
            }
        }

        evict.insert(key_hash, cost, &self.metrics);
        (victims, true)
    }

    /// Replaces the cost for `key_hash` if the policy tracks it.
    pub(crate) fn update(&self, key_hash: u64, cost: i64) {
        let mut evict = self.evict.lock();
        evict.update_if_has(key_hash, cost, &self.metrics);
    }

    /// Forgets `key_hash`, releasing its cost.
    pub(crate) fn del(&self, key_hash: u64) {
        let mut evict = self.evict.lock();
        evict.del(key_hash, &self.metrics);
    }

    /// Drops all frequency and cost state.
    pub(crate) fn clear(&self) {
        let mut admit = self.admit.lock();
        let mut evict = self.evict.lock();
        admit.clear();
        evict.key_costs.clear();
        evict.used = 0;
    }

    #[cfg(test)]
    pub(crate) fn used(&self) -> i64 {
        self.evict.lock().used
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.evict.lock().key_costs.len()
    }

    #[inline]
    fn record(&self, t: MetricType, hash: u64, delta: u64) {
        if let Some(m) = &self.metrics {
            m.add(t, hash, delta);
        }
    }
}

impl RingConsumer for LfuPolicy {
    fn accept(&self, batch: &[u64]) -> bool {
        self.push(batch)
    }
}

// ---------------------------------------------------------------------------
// SampledLfu
// ---------------------------------------------------------------------------

/// Cost accounting: key-hash → cost for every admitted key, plus the
/// `used` total.  `used == Σ cost` and `used ≤ max_cost` hold whenever
/// the guarding lock is released.
struct SampledLfu {
    key_costs: AHashMap<u64, i64>,
    max_cost: i64,
    used: i64,
}

impl SampledLfu {
    #[inline]
    fn room_left(&self, cost: i64) -> i64 {
        self.max_cost - (self.used + cost)
    }

    /// Tops `sample` back up to [`SAMPLE_SIZE`] entries from the cost map.
    ///
    /// Takes the first free entries of the map's iteration; ahash's
    /// per-instance seed spreads which entries those are.
    fn fill_sample(&self, sample: &mut Vec<(u64, i64)>) {
        if sample.len() >= SAMPLE_SIZE {
            return;
        }
        for (&hash, &cost) in &self.key_costs {
            sample.push((hash, cost));
            if sample.len() >= SAMPLE_SIZE {
                break;
            }
        }
    }

    fn insert(&mut self, key_hash: u64, cost: i64, metrics: &Option<Arc<Metrics>>) {
        self.key_costs.insert(key_hash, cost);
        self.used += cost;
        if let Some(m) = metrics {
            m.add(MetricType::KeyAdd, key_hash, 1);
            m.add(MetricType::CostAdd, key_hash, cost as u64);
        }
    }

    fn update_if_has(
        &mut self,
        key_hash: u64,
        cost: i64,
        metrics: &Option<Arc<Metrics>>,
    ) -> bool {
        let Some(prev) = self.key_costs.get_mut(&key_hash) else {
            return false;
        };
        self.used += cost - *prev;
        *prev = cost;
        if let Some(m) = metrics {
            m.add(MetricType::KeyUpdate, key_hash, 1);
        }
        true
    }

    fn del(&mut self, key_hash: u64, metrics: &Option<Arc<Metrics>>) -> Option<i64> {
        let cost = self.key_costs.remove(&key_hash)?;
        self.used -= cost;
        if let Some(m) = metrics {
            m.add(MetricType::KeyEvict, key_hash, 1);
            m.add(MetricType::CostEvict, key_hash, cost as u64);
        }
        Some(cost)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_cost: i64) -> LfuPolicy {
        LfuPolicy::new(100, max_cost, None)
    }

    #[test]
    fn add_within_capacity_needs_no_victims() {
        let p = policy(10);
        let (victims, added) = p.add(1, 1);
        assert!(added);
        assert!(victims.is_empty());
        assert_eq!(p.used(), 1);
    }

    #[test]
    fn oversized_item_is_rejected() {
        let p = policy(10);
        let (victims, added) = p.add(1, 11);
        assert!(!added);
        assert!(victims.is_empty());
        assert_eq!(p.used(), 0);
    }

    #[test]
    fn item_costing_exactly_max_is_admitted() {
        let p = policy(10);
        let (_, added) = p.add(1, 10);
        assert!(added);
        assert_eq!(p.used(), 10);
    }

    #[test]
    fn re_add_is_an_update_not_a_double_count() {
        let p = policy(10);
        p.add(1, 2);
        let (victims, added) = p.add(1, 3);
        assert!(added);
        assert!(victims.is_empty());
        assert_eq!(p.used(), 3);
    }

    #[test]
    fn used_never_exceeds_max_under_pressure() {
        let p = policy(20);
        for hash in 0..100u64 {
            p.add(hash, 1);
        }
        assert!(p.used() <= 20, "used {} over max 20", p.used());
        assert!(p.tracked() <= 20);
    }

    #[test]
    fn eviction_frees_enough_room_for_the_candidate() {
        let p = policy(10);
        for hash in 0..10u64 {
            p.add(hash, 1);
        }
        // The candidate is at least as frequent as any victim (all zero),
        // so ties admit it.
        let (victims, added) = p.add(100, 4);
        assert!(added);
        let freed: i64 = victims.iter().map(|v| v.cost).sum();
        assert!(freed >= 4, "freed {} < candidate cost 4", freed);
        assert!(p.used() <= 10);
    }

    #[test]
    fn frequent_incumbents_beat_a_cold_candidate() {
        let p = policy(5);
        for hash in 0..5u64 {
            p.add(hash, 1);
        }
        // Warm every incumbent well past the doorkeeper.
        for _ in 0..4 {
            p.push(&[0, 1, 2, 3, 4]);
        }
        let (victims, added) = p.add(99, 1);
        assert!(!added, "cold candidate should lose to warm incumbents");
        assert!(victims.is_empty());
        assert_eq!(p.tracked(), 5);
    }

    #[test]
    fn frequent_candidate_displaces_a_cold_victim() {
        let p = policy(5);
        for hash in 0..5u64 {
            p.add(hash, 1);
        }
        // Warm only the candidate.
        for _ in 0..4 {
            p.push(&[99]);
        }
        let (victims, added) = p.add(99, 1);
        assert!(added);
        assert_eq!(victims.len(), 1);
        assert_eq!(p.used(), 5);
    }

    #[test]
    fn del_releases_cost() {
        let p = policy(10);
        p.add(1, 4);
        p.del(1);
        assert_eq!(p.used(), 0);
        assert_eq!(p.tracked(), 0);
    }

    #[test]
    fn del_of_unknown_hash_is_a_noop() {
        let p = policy(10);
        p.del(12345);
        assert_eq!(p.used(), 0);
    }

    #[test]
    fn update_of_unknown_hash_is_a_noop() {
        let p = policy(10);
        p.update(12345, 3);
        assert_eq!(p.used(), 0);
    }

    #[test]
    fn update_adjusts_used_by_the_delta() {
        let p = policy(10);
        p.add(1, 2);
        p.update(1, 5);
        assert_eq!(p.used(), 5);
    }

    #[test]
    fn clear_resets_accounting() {
        let p = policy(10);
        for hash in 0..5u64 {
            p.add(hash, 1);
        }
        p.clear();
        assert_eq!(p.used(), 0);
        assert_eq!(p.tracked(), 0);
    }

    #[test]
    fn push_returns_false_while_sketch_is_held() {
        let p = policy(10);
        let guard = p.admit.lock();
        assert!(!p.push(&[1, 2, 3]), "contended push must drop the batch");
        drop(guard);
        assert!(p.push(&[1, 2, 3]));
    }

    #[test]
    fn metrics_track_admissions_and_evictions() {
        let m = Arc::new(Metrics::new());
        let p = LfuPolicy::new(100, 5, Some(Arc::clone(&m)));
        for hash in 0..5u64 {
            p.add(hash, 1);
        }
        assert_eq!(m.keys_added(), 5);
        assert_eq!(m.cost_added(), 5);

        // Force evictions: the cold candidate ties and wins repeatedly.
        let (victims, added) = p.add(50, 3);
        assert!(added);
        assert_eq!(m.keys_evicted(), victims.len() as u64);
        assert_eq!(
            m.cost_evicted(),
            victims.iter().map(|v| v.cost as u64).sum::<u64>()
        );
    }
}
