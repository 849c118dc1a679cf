//! Deterministic PRNG threaded through every stochastic decision.
//!
//! Uses the SplitMix64 algorithm: fast, 8 bytes of state, and trivially
//! serializable for iteration snapshots. One handle exists per iteration;
//! it is derived from the run seed and the iteration number so iterations
//! can run on any thread and still reproduce.

use rand::RngCore;

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Derive the stream for one iteration of a run.
    pub fn for_iteration(run_seed: u64, iteration: i32) -> Self {
        let mut mixer = SimRng::new(run_seed ^ (iteration as i64 as u64).rotate_left(32));
        Self::new(mixer.next_u64())
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform double in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform integer in `[0, bound)`. Returns 0 when `bound` is 0.
    pub fn next_below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        // Multiply-shift keeps the result unbiased enough for simulation use
        // and avoids a rejection loop.
        ((self.next_u64() as u128 * bound as u128) >> 64) as usize
    }

    /// Uniform integer in `[min, max)`. Returns `min` for an empty range.
    pub fn next_in_range(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = (max as i64 - min as i64) as usize;
        (min as i64 + self.next_below(span) as i64) as i32
    }

    /// Fisher-Yates shuffle. Walks from the back, swapping each slot with a
    /// uniformly chosen slot at or before it.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (0..items.len()).rev() {
            let j = self.next_below(i + 1);
            items.swap(i, j);
        }
    }

    /// Get the internal state (for hashing/serialization).
    pub fn state(&self) -> u64 {
        self.state
    }
}

impl RngCore for SimRng {
    fn next_u32(&mut self) -> u32 {
        (SimRng::next_u64(self) >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        SimRng::next_u64(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = SimRng::next_u64(self).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let mut a = SimRng::new(42);
        let mut b = SimRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn iteration_streams_differ() {
        let mut a = SimRng::for_iteration(7, 1);
        let mut b = SimRng::for_iteration(7, 2);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn iteration_streams_reproduce() {
        let mut a = SimRng::for_iteration(7, 3);
        let mut b = SimRng::for_iteration(7, 3);
        for _ in 0..20 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn next_f64_in_unit_interval() {
        let mut rng = SimRng::new(999);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn next_below_respects_bound() {
        let mut rng = SimRng::new(5);
        for bound in 1..50 {
            assert!(rng.next_below(bound) < bound);
        }
        assert_eq!(rng.next_below(0), 0);
    }

    #[test]
    fn next_in_range_is_half_open() {
        let mut rng = SimRng::new(11);
        let mut seen_max = false;
        for _ in 0..1_000 {
            let v = rng.next_in_range(3, 6);
            assert!((3..6).contains(&v));
            seen_max |= v == 5;
        }
        assert!(seen_max);
        assert_eq!(rng.next_in_range(4, 4), 4);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = SimRng::new(12345);
        let mut items: Vec<u32> = (0..32).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn rand_distributions_accept_sim_rng() {
        use rand::Rng;
        let mut rng = SimRng::new(3);
        let v: i32 = rng.gen_range(10..=20);
        assert!((10..=20).contains(&v));
    }

    #[test]
    fn serialization_round_trip() {
        let mut rng = SimRng::new(42);
        for _ in 0..50 {
            rng.next_u64();
        }

        let json = serde_json::to_string(&rng).unwrap();
        let restored: SimRng = serde_json::from_str(&json).unwrap();
        assert_eq!(rng, restored);

        let mut rng2 = restored;
        for _ in 0..10 {
            assert_eq!(rng.next_u64(), rng2.next_u64());
        }
    }
}
