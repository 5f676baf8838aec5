//! Sharded atomic counters for cache statistics.
//!
//! Every counter is an array of 256 `AtomicU64` slots.  An increment picks
//! its slot from the key-hash with a stride of ten words, so two slots
//! that are live at the same time sit at least 80 bytes apart — on
//! distinct cache lines.  Reads sum the whole array, which makes every
//! accessor a point-in-time total rather than an exact count.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const SLOTS: usize = 256;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum MetricType {
    Hit,
    Miss,
    KeyAdd,
    KeyUpdate,
    KeyEvict,
    CostAdd,
    CostEvict,
    SetsDropped,
    SetsRejected,
    GetsDropped,
    GetsKept,
}

const NUM_METRICS: usize = 11;

const ALL_METRICS: [MetricType; NUM_METRICS] = [
    MetricType::Hit,
    MetricType::Miss,
    MetricType::KeyAdd,
    MetricType::KeyUpdate,
    MetricType::KeyEvict,
    MetricType::CostAdd,
    MetricType::CostEvict,
    MetricType::SetsDropped,
    MetricType::SetsRejected,
    MetricType::GetsDropped,
    MetricType::GetsKept,
];

fn name_of(t: MetricType) -> &'static str {
    match t {
        MetricType::Hit => "hit",
        MetricType::Miss => "miss",
        MetricType::KeyAdd => "keys-added",
        MetricType::KeyUpdate => "keys-updated",
        MetricType::KeyEvict => "keys-evicted",
        MetricType::CostAdd => "cost-added",
        MetricType::CostEvict => "cost-evicted",
        MetricType::SetsDropped => "sets-dropped",
        MetricType::SetsRejected => "sets-rejected",
        MetricType::GetsDropped => "gets-dropped",
        MetricType::GetsKept => "gets-kept",
    }
}

/// Running statistics for the lifetime of a cache instance.
///
/// All counters are amortized: increments land on hash-picked slots and
/// drops on internal buffers are invisible everywhere except their own
/// `sets-dropped` / `gets-dropped` counters.
pub struct Metrics {
    all: [[AtomicU64; SLOTS]; NUM_METRICS],
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Metrics {
            all: std::array::from_fn(|_| std::array::from_fn(|_| AtomicU64::new(0))),
        }
    }

    #[inline]
    pub(crate) fn add(&self, t: MetricType, hash: u64, delta: u64) {
        // Stride of ten u64 words between usable slots.
        let idx = ((hash % 25) * 10) as usize;
        self.all[t as usize][idx].fetch_add(delta, Ordering::Relaxed);
    }

    fn get(&self, t: MetricType) -> u64 {
        self.all[t as usize]
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .sum()
    }

    pub(crate) fn clear(&self) {
        for counter in &self.all {
            for slot in counter {
                slot.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Number of `get` calls that found a value.
    pub fn hits(&self) -> u64 {
        self.get(MetricType::Hit)
    }

    /// Number of `get` calls that found nothing.
    pub fn misses(&self) -> u64 {
        self.get(MetricType::Miss)
    }

    /// Number of new keys admitted by the policy.
    pub fn keys_added(&self) -> u64 {
        self.get(MetricType::KeyAdd)
    }

    /// Number of cost-map updates for keys that were already tracked.
    pub fn keys_updated(&self) -> u64 {
        self.get(MetricType::KeyUpdate)
    }

    /// Number of keys removed from the policy (evictions and deletes).
    pub fn keys_evicted(&self) -> u64 {
        self.get(MetricType::KeyEvict)
    }

    /// Total cost admitted by the policy.
    pub fn cost_added(&self) -> u64 {
        self.get(MetricType::CostAdd)
    }

    /// Total cost removed from the policy.
    pub fn cost_evicted(&self) -> u64 {
        self.get(MetricType::CostEvict)
    }

    /// Number of `insert` calls dropped on a full write channel.
    pub fn sets_dropped(&self) -> u64 {
        self.get(MetricType::SetsDropped)
    }

    /// Number of `insert` calls rejected by the admission policy.
    pub fn sets_rejected(&self) -> u64 {
        self.get(MetricType::SetsRejected)
    }

    /// Number of read signals discarded because absorption contended.
    pub fn gets_dropped(&self) -> u64 {
        self.get(MetricType::GetsDropped)
    }

    /// Number of read signals absorbed into the frequency sketch.
    pub fn gets_kept(&self) -> u64 {
        self.get(MetricType::GetsKept)
    }

    /// `hits / (hits + misses)`, or `0.0` before any request.
    pub fn ratio(&self) -> f64 {
        let (hits, misses) = (self.hits(), self.misses());
        if hits == 0 && misses == 0 {
            return 0.0;
        }
        hits as f64 / (hits + misses) as f64
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in ALL_METRICS {
            write!(f, "{}: {} ", name_of(t), self.get(t))?;
        }
        write!(f, "gets-total: {} ", self.hits() + self.misses())?;
        write!(f, "hit-ratio: {:.2}", self.ratio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_slots() {
        let m = Metrics::new();
        for hash in 0..100u64 {
            m.add(MetricType::Hit, hash, 1);
        }
        assert_eq!(m.hits(), 100);
    }

    #[test]
    fn ratio_before_any_request_is_zero() {
        let m = Metrics::new();
        assert_eq!(m.ratio(), 0.0);
    }

    #[test]
    fn ratio_counts_hits_over_total() {
        let m = Metrics::new();
        m.add(MetricType::Hit, 1, 3);
        m.add(MetricType::Miss, 2, 1);
        assert!((m.ratio() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn clear_zeroes_everything() {
        let m = Metrics::new();
        m.add(MetricType::KeyAdd, 7, 5);
        m.add(MetricType::CostAdd, 7, 50);
        m.clear();
        assert_eq!(m.keys_added(), 0);
        assert_eq!(m.cost_added(), 0);
    }

    #[test]
    fn display_lists_every_counter() {
        let m = Metrics::new();
        m.add(MetricType::Hit, 1, 1);
        let s = m.to_string();
        assert!(s.contains("hit: 1"));
        assert!(s.contains("sets-rejected: 0"));
        assert!(s.contains("hit-ratio: 1.00"));
    }
}
