// Deterministic, portable pseudo-random number generator for music generation.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding.
// Every random decision in `cadenza_music` (velocity sampling, drum hits,
// the built-in event source) draws from a `SeqRng`, so a generation request
// with a fixed seed produces the same document on every platform.
//
// Per-part generators are derived with `SeqRng::fork`, which mixes a stream
// index into the parent seed. This keeps parts independent: generating part 3
// never consumes randomness that part 4 would have seen, which is what lets the
// orchestrator run parts in any order (or in parallel) and still reproduce the
// same output.
//
// The core generator uses integer arithmetic only. Floating-point values are
// derived from the integer output at the edges (`next_f64`, `range_f64`).

use serde::{Deserialize, Serialize};

/// Xoshiro256++ PRNG.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeqRng {
    s: [u64; 4],
    seed: u64,
}

impl SeqRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// SplitMix64 expands the seed into the 256-bit internal state. Two
    /// instances created with the same seed produce identical sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
            seed,
        }
    }

    /// The seed this generator was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Derive an independent generator for sub-stream `stream`.
    ///
    /// Depends only on the construction seed, never on how far this generator
    /// has advanced.
    pub fn fork(&self, stream: u64) -> Self {
        let mut sm = self.seed ^ stream.wrapping_mul(0xd6e8_feb8_6659_fd93);
        Self::new(splitmix64(&mut sm))
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a uniform `f64` in [0, 1) from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform `f64` in `[low, high]`.
    ///
    /// Returns `low` when the range is empty (`low == high`), which is how
    /// tempo classes with a fixed step are expressed.
    /// Panics if `low > high`.
    pub fn range_f64(&mut self, low: f64, high: f64) -> f64 {
        assert!(low <= high, "range_f64: low must be <= high");
        if low == high {
            return low;
        }
        (low + self.next_f64() * (high - low)).min(high)
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `usize` in `[low, high)`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Generate a uniform random `u8` in `[low, high)`.
    pub fn range_u8(&mut self, low: u8, high: u8) -> u8 {
        self.range_u64(low as u64, high as u64) as u8
    }

    /// Generate a uniform random `i32` in `[-spread, spread]`.
    ///
    /// Used for symmetric jitter. `spread == 0` always returns 0.
    pub fn jitter(&mut self, spread: u32) -> i32 {
        if spread == 0 {
            return 0;
        }
        let span = 2 * spread as u64 + 1;
        self.range_u64(0, span) as i32 - spread as i32
    }

    /// Pick one element uniformly. Returns `None` for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(self.range_usize(0, items.len()))
    }

    /// Pick an index with probability proportional to `weights[i]`.
    ///
    /// Non-finite and negative weights count as zero. Returns `None` if no
    /// weight is positive.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let clean = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let total: f64 = weights.iter().copied().map(clean).sum();
        if total <= 0.0 {
            return None;
        }
        let r = self.next_f64() * total;
        let mut cum = 0.0;
        let mut last_positive = None;
        for (i, &w) in weights.iter().enumerate() {
            let w = clean(w);
            if w > 0.0 {
                cum += w;
                last_positive = Some(i);
                if cum > r {
                    return Some(i);
                }
            }
        }
        // Rounding can leave r a hair above the final cumulative sum.
        last_positive
    }

    /// Return `true` with probability `p`.
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// SplitMix64, used only to expand seeds into xoshiro state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
