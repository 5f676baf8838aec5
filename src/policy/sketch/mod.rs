mod doorkeeper;
mod frequency;

pub(crate) use doorkeeper::Doorkeeper;
pub(crate) use frequency::CmSketch;

/// TinyLFU frequency state: a doorkeeper-gated CM4 sketch with periodic
/// aging.
///
/// Every observed hash first passes the doorkeeper.  A first sighting
/// only marks the doorkeeper; repeat sightings increment the sketch.  The
/// observation counter advances either way, and once it reaches the
/// sketch width the whole state ages: counters are halved, the doorkeeper
/// and the counter are cleared.
pub(crate) struct TinyLfu {
    freq: CmSketch,
    door: Doorkeeper,
    observations: u64,
    reset_at: u64,
}

impl TinyLfu {
    pub(crate) fn new(num_counters: usize) -> Self {
        let freq = CmSketch::new(num_counters);
        let reset_at = freq.width() as u64;
        TinyLfu {
            freq,
            door: Doorkeeper::new(num_counters),
            observations: 0,
            reset_at,
        }
    }

    /// Records one access of `h`.
    pub(crate) fn observe(&mut self, h: u64) {
        if self.door.insert(h) {
            self.freq.increment(h);
        }
        self.observations += 1;
        if self.observations >= self.reset_at {
            self.age();
        }
    }

    /// Estimated access frequency of `h`.
    ///
    /// The doorkeeper bit contributes one extra point so that a
    /// once-seen hash outranks a never-seen one.
    pub(crate) fn estimate(&self, h: u64) -> i64 {
        let mut hits = self.freq.estimate(h);
        if self.door.contains(h) {
            hits += 1;
        }
        hits
    }

    fn age(&mut self) {
        self.freq.halve();
        self.door.clear();
        self.observations = 0;
    }

    /// Drops all frequency state.
    pub(crate) fn clear(&mut self) {
        self.freq.clear();
        self.door.clear();
        self.observations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_lands_in_doorkeeper_only() {
        let mut lfu = TinyLfu::new(64);
        lfu.observe(1);
        // Doorkeeper bonus only: the sketch itself is untouched.
        assert_eq!(lfu.estimate(1), 1);
    }

    #[test]
    fn repeat_observations_reach_the_sketch() {
        let mut lfu = TinyLfu::new(64);
        for _ in 0..4 {
            lfu.observe(1);
        }
        // 1 doorkeeper bonus + 3 sketch increments.
        assert_eq!(lfu.estimate(1), 4);
    }

    #[test]
    fn unseen_hash_estimates_zero() {
        let lfu = TinyLfu::new(64);
        assert_eq!(lfu.estimate(12345), 0);
    }

    #[test]
    fn aging_halves_and_clears_doorkeeper() {
        // width(1) = 16, so 16 observations trigger an aging pass.
        let mut lfu = TinyLfu::new(1);
        for _ in 0..10 {
            lfu.observe(7);
        }
        let before = lfu.estimate(7);
        for h in 100..106u64 {
            lfu.observe(h);
        }
        let after = lfu.estimate(7);
        assert!(
            after < before,
            "aging should shrink the estimate: before={} after={}",
            before,
            after
        );
    }

    #[test]
    fn clear_drops_all_state() {
        let mut lfu = TinyLfu::new(64);
        for _ in 0..5 {
            lfu.observe(9);
        }
        lfu.clear();
        assert_eq!(lfu.estimate(9), 0);
    }
}
