//! The shared bucket engine: layout, mask generation, tidy-up and the
//! overflow flush. `BucketSum` and `BucketDotProd` each own one of these and
//! supply their own per-addend deposit strategy on top.

use crate::bits::{self, SHIFT};
use crate::error::AllocError;

/// Bins covering the normal exponent range: `floor(2^11 / SHIFT) - 1`.
const NORMAL: usize = 112;

/// Bins absorbing spillover at the top of the exponent range. The last one
/// is permanently NaN and is never read as a numeric value.
const OVERFLOW: usize = 2;

// `std::numeric_limits<double>::min_exponent` / `max_exponent`: the C++
// standard's (not IEEE's) convention where the smallest normal double is
// `2^(min_exponent - 1)` and the largest finite is below `2^max_exponent`.
const MIN_EXPONENT: i32 = -1021;
const MAX_EXPONENT: i32 = 1024;

/// Three fixed-size `f64` arrays — two dual-column accumulators and the
/// mask used both to initialize and to reset them. `u` is the underflow
/// region size, the only dimension that differs between `BucketSum` (2)
/// and `BucketDotProd` (5); everything downstream of it is generic.
pub(crate) struct Buckets {
    pub(crate) a1: Vec<f64>,
    pub(crate) a2: Vec<f64>,
    mask: Vec<f64>,
    u: usize,
    b: usize,
}

impl Buckets {
    pub(crate) fn try_new(u: usize) -> Result<Self, AllocError> {
        let b = u + NORMAL + OVERFLOW;

        let mut mask = Vec::new();
        mask.try_reserve_exact(b)
            .map_err(|_| AllocError::BucketReserve { requested: b })?;
        mask.resize(b, 0.0);
        Self::build_mask(&mut mask, u, b);

        let mut a1 = Vec::new();
        a1.try_reserve_exact(b)
            .map_err(|_| AllocError::BucketReserve { requested: b })?;
        let mut a2 = Vec::new();
        a2.try_reserve_exact(b)
            .map_err(|_| AllocError::BucketReserve { requested: b })?;
        a1.resize(b, 0.0);
        a2.resize(b, 0.0);

        tracing::debug!(u, b, "constructed bucket engine");

        let mut buckets = Self { a1, a2, mask, u, b };
        buckets.initialize();
        Ok(buckets)
    }

    fn build_mask(mask: &mut [f64], u: usize, b: usize) {
        for slot in mask.iter_mut().take(u - 1) {
            *slot = 0.0;
        }
        mask[u - 1] = 1.5 * 2f64.powi(MIN_EXPONENT - 1 + (SHIFT as i32 - 1));
        for i in u..(b - OVERFLOW) {
            mask[i] = mask[i - 1] * 2f64.powi(SHIFT as i32);
        }
        mask[b - OVERFLOW] = 1.5 * 2f64.powi(MAX_EXPONENT - 1);
        mask[b - 1] = f64::NAN;
    }

    /// Resets both columns to `+mask`/`-mask` so the instance is ready for
    /// another `sum`/`dprod` call.
    pub(crate) fn initialize(&mut self) {
        for i in 0..self.b {
            self.a1[i] = self.mask[i];
            self.a2[i] = -self.mask[i];
        }
        self.verify();
    }

    pub(crate) fn bin_count(&self) -> usize {
        self.b
    }

    /// Propagates accumulated low bits up the bin ladder one step and
    /// resets every non-overflow bin to its mask value.
    pub(crate) fn tidy_up(&mut self) {
        for i in 0..(self.b - OVERFLOW) {
            let t1 = self.a1[i] + self.a2[i];
            let t2 = self.a1[i + 1] + t1;
            self.a1[i] = self.mask[i] + ((self.a1[i + 1] - t2) + t1);
            self.a1[i + 1] = t2;
            self.a2[i] = -self.mask[i];
        }
    }

    /// Flushes the top pre-overflow bin into the scalar side-sum and resets
    /// it, run after every inner chunk regardless of whether a tidy-up also
    /// ran.
    pub(crate) fn flush_overflow(&mut self, side_sum: &mut f64) {
        let top = self.b - OVERFLOW;
        *side_sum += self.a1[top] + self.a2[top];
        self.a1[top] = self.mask[top];
        self.a2[top] = -self.mask[top];
    }

    #[cfg(debug_assertions)]
    pub(crate) fn verify(&self) {
        for (label, col) in [("a1", &self.a1), ("a2", &self.a2)] {
            for i in 0..(self.u - 1) {
                let e = bits::biased_exponent(col[i]) as i32;
                debug_assert!(
                    e <= MIN_EXPONENT + (MAX_EXPONENT - 1),
                    "{label}[{i}] underflow bin exponent {e} out of range"
                );
            }
            for i in (self.u - 1)..(self.b - OVERFLOW) {
                let expected = (i as i32 - (self.u as i32 - 2)) * SHIFT as i32;
                let actual = bits::biased_exponent(col[i]) as i32;
                if actual != expected {
                    tracing::error!(
                        bin = i,
                        expected,
                        actual,
                        column = label,
                        "bucket exponent invariant violated"
                    );
                }
                debug_assert_eq!(actual, expected, "{label}[{i}] exponent mismatch");
            }
            let top = self.b - OVERFLOW;
            debug_assert_eq!(
                bits::biased_exponent(col[top]) as i32,
                2 * (MAX_EXPONENT - 1),
                "{label}[{top}] overflow bin exponent mismatch"
            );
        }
    }

    #[cfg(not(debug_assertions))]
    pub(crate) fn verify(&self) {}
}
