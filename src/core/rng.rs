//! Deterministic random number generation.
//!
//! The simulation itself is deterministic given a fixed tick rate; randomness
//! only enters through the move advisor's rollouts. `SimRng` is ChaCha8 with
//! a fork counter so each rollout branch gets an independent but reproducible
//! stream: the same seed always yields the same advice.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Deterministic, forkable RNG.
#[derive(Clone, Debug)]
pub struct SimRng {
    inner: ChaCha8Rng,
    seed: u64,
    fork_counter: u64,
}

impl SimRng {
    /// Create an RNG from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            seed,
            fork_counter: 0,
        }
    }

    /// Fork an independent branch.
    ///
    /// Each fork is seeded from the parent seed and a monotonic counter, so
    /// fork N of two identically-seeded parents produces the same stream.
    #[must_use]
    pub fn fork(&mut self) -> Self {
        self.fork_counter += 1;
        let fork_seed = self
            .seed
            .wrapping_add(self.fork_counter.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        Self {
            inner: ChaCha8Rng::seed_from_u64(fork_seed),
            seed: fork_seed,
            fork_counter: 0,
        }
    }

    /// Uniform usize in `range`.
    pub fn gen_range_usize(&mut self, range: std::ops::Range<usize>) -> usize {
        self.inner.gen_range(range)
    }

    /// Uniformly choose an element of a slice.
    #[must_use]
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.inner.gen_range(0..slice.len());
            Some(&slice[idx])
        }
    }

    /// Capture the RNG state for checkpointing.
    #[must_use]
    pub fn state(&self) -> SimRngState {
        SimRngState {
            seed: self.seed,
            word_pos: self.inner.get_word_pos(),
            fork_counter: self.fork_counter,
        }
    }

    /// Restore from a captured state.
    #[must_use]
    pub fn from_state(state: &SimRngState) -> Self {
        let mut inner = ChaCha8Rng::seed_from_u64(state.seed);
        inner.set_word_pos(state.word_pos);
        Self {
            inner,
            seed: state.seed,
            fork_counter: state.fork_counter,
        }
    }
}

/// Serializable RNG state.
///
/// ChaCha8's word position makes capture O(1) regardless of how many values
/// have been drawn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimRngState {
    pub seed: u64,
    pub word_pos: u128,
    pub fork_counter: u64,
}
