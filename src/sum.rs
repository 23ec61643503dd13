//! Correctly-rounded summation of an `f64` slice in fixed working memory.

use crate::bits;
use crate::buckets::Buckets;
use crate::error::AllocError;

const UNDERFLOW: usize = 2;

// Each bin can absorb `2^15 - 2` deposits before its low-bits pile corrupts
// the next bin; sum deposits once per addend into one of two columns, so
// the reserve doubles relative to the dot-product variant's per-column
// FMA-driven double deposit (see `dot.rs`).
const RESERVE: usize = 32766 * 2;
const RESERVE_OVERFLOW: usize = 2046 * 2;

/// Accumulates a correctly-rounded sum over repeated calls.
///
/// A `BucketSum` owns its bucket memory up front and resets it at the end
/// of every [`sum`](BucketSum::sum) call, so one instance can be reused
/// across an unbounded number of calls without reallocating. It is not
/// safe to share across threads; each caller needs its own instance.
pub struct BucketSum {
    buckets: Buckets,
}

impl BucketSum {
    /// Allocates a new accumulator, reporting failure instead of aborting.
    pub fn try_new() -> Result<Self, AllocError> {
        Ok(Self {
            buckets: Buckets::try_new(UNDERFLOW)?,
        })
    }

    /// Allocates a new accumulator, aborting on allocation failure.
    pub fn new() -> Self {
        Self::try_new().expect("failed to allocate BucketSum")
    }

    /// Returns the correctly-rounded sum of `x`, leaving the accumulator
    /// reset for its next call.
    pub fn sum(&mut self, x: &[f64]) -> f64 {
        let n = x.len();
        if n == 0 {
            return 0.0;
        }
        if n == 1 {
            return x[0];
        }

        let u = UNDERFLOW;
        let b = &mut self.buckets;
        let mut side_sum = 0.0_f64;

        let mut start = 0;
        let mut remaining = n;

        // Odd length: handle the first addend in isolation so the main
        // loop can always consume addends in pairs.
        if remaining % 2 == 1 {
            let v = x[0];
            let pos = bits::exponent_to_bin(bits::biased_exponent(v));
            let k = pos + u;
            let t = b.a1[k] + v;
            b.a1[pos] += (b.a1[k] - t) + v;
            b.a1[k] = t;
            start += 1;
            remaining -= 1;
        }

        let mut ov_counter: usize = 1;
        let mut pos1 = bits::exponent_to_bin(bits::biased_exponent(x[start]));
        let mut pos2 = bits::exponent_to_bin(bits::biased_exponent(x[start + 1]));

        loop {
            let limit = RESERVE_OVERFLOW.min(remaining - 2);

            let mut i = 0;
            while i < limit {
                let k1 = pos1 + u;
                let k2 = pos2 + u;
                let v1 = x[start + i];
                let v2 = x[start + i + 1];

                // Two parallel FastTwoSum steps, with the *next* pair's
                // bin indices computed ahead of time to break the data
                // dependency between consecutive deposits.
                let t1 = b.a1[k1] + v1;
                let t2 = b.a2[k2] + v2;

                let pos1_new = bits::exponent_to_bin(bits::biased_exponent(x[start + i + 2]));
                let pos2_new = bits::exponent_to_bin(bits::biased_exponent(x[start + i + 3]));

                b.a1[pos1] += (b.a1[k1] - t1) + v1;
                b.a2[pos2] += (b.a2[k2] - t2) + v2;
                b.a1[k1] = t1;
                b.a2[k2] = t2;

                pos1 = pos1_new;
                pos2 = pos2_new;
                i += 2;
            }

            if limit == remaining - 2 {
                break;
            }

            start += limit;
            remaining -= limit;
            ov_counter += 1;

            if ov_counter * RESERVE_OVERFLOW > RESERVE {
                b.tidy_up();
                tracing::trace!(ov_counter, "bucket sum tidy-up");
                ov_counter = 1;
            }

            b.flush_overflow(&mut side_sum);
        }

        // Last pair, deposited without touching the bin-index cache (there
        // is no next pair left to prepare for).
        let k1 = pos1 + u;
        let k2 = pos2 + u;
        let v1 = x[start + remaining - 2];
        let v2 = x[start + remaining - 1];
        let t1 = b.a1[k1] + v1;
        let t2 = b.a2[k2] + v2;
        b.a1[pos1] += (b.a1[k1] - t1) + v1;
        b.a2[pos2] += (b.a2[k2] - t2) + v2;
        b.a1[k1] = t1;
        b.a2[k2] = t2;

        b.verify();

        // Backward Sum2s sweep from the top pre-overflow bin down to bin 0.
        let top = b.bin_count() - 2;
        let mut acc = side_sum;
        let mut err = 0.0_f64;
        for i in (0..=top).rev() {
            let bi = b.a1[i] + b.a2[i];
            let x2 = acc + bi;
            err += (acc - x2) + bi;
            acc = x2;
        }
        acc += err;

        b.initialize();
        acc
    }
}

impl Default for BucketSum {
    fn default() -> Self {
        Self::new()
    }
}
