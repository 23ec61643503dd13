//! Correctly-rounded inner product of two `f64` slices in fixed working
//! memory. Shares the bucket engine with [`crate::BucketSum`]; differs only
//! in the underflow region size and the per-addend deposit strategy, which
//! splits each product into a head and tail via FMA.

use crate::bits;
use crate::buckets::Buckets;
use crate::error::{AllocError, DotProdError};

const UNDERFLOW: usize = 5;

// Each product deposits twice (head and tail), so a chunk exhausts its
// per-bin budget twice as fast as plain summation's single deposit;
// the reserve is half of `sum.rs`'s.
const RESERVE: usize = 32766;
const RESERVE_OVERFLOW: usize = 2046;

/// One FMA-split product and the bucket offset derived from its head.
struct Product {
    hi: f64,
    lo: f64,
    pos: usize,
}

#[inline]
fn split(xi: f64, yi: f64) -> Product {
    let hi = xi * yi;
    let lo = xi.mul_add(yi, -hi);
    let pos = bits::exponent_to_bin(bits::biased_exponent(hi));
    Product { hi, lo, pos }
}

/// Accumulates a correctly-rounded dot product over repeated calls.
///
/// See [`BucketSum`](crate::BucketSum) for the reuse and thread-safety
/// contract; both types share it.
pub struct BucketDotProd {
    buckets: Buckets,
}

impl BucketDotProd {
    /// Allocates a new accumulator, reporting failure instead of aborting.
    pub fn try_new() -> Result<Self, AllocError> {
        Ok(Self {
            buckets: Buckets::try_new(UNDERFLOW)?,
        })
    }

    /// Allocates a new accumulator, aborting on allocation failure.
    pub fn new() -> Self {
        Self::try_new().expect("failed to allocate BucketDotProd")
    }

    /// Returns the correctly-rounded inner product of `x` and `y`, leaving
    /// the accumulator reset for its next call.
    ///
    /// # Errors
    ///
    /// Returns [`DotProdError::LengthMismatch`] if `x.len() != y.len()`.
    pub fn dprod(&mut self, x: &[f64], y: &[f64]) -> Result<f64, DotProdError> {
        if x.len() != y.len() {
            return Err(DotProdError::LengthMismatch {
                x_len: x.len(),
                y_len: y.len(),
            });
        }
        let n = x.len();
        if n == 0 {
            return Ok(0.0);
        }
        if n == 1 {
            return Ok(x[0] * y[0]);
        }

        let u = UNDERFLOW;
        let b = &mut self.buckets;
        let mut side_sum = 0.0_f64;

        let mut start = 0;
        let mut remaining = n;

        if remaining % 2 == 1 {
            let p = split(x[0], y[0]);
            deposit_pair(b, u, p.pos, p.hi, p.lo);
            start += 1;
            remaining -= 1;
        }

        let mut ov_counter: usize = 1;
        let mut p1 = split(x[start], y[start]);
        let mut p2 = split(x[start + 1], y[start + 1]);

        loop {
            let limit = RESERVE_OVERFLOW.min(remaining - 2);

            let mut i = 0;
            while i < limit {
                let k1_hi = p1.pos + u;
                let k1_lo = p1.pos + u - 3;
                let k2_hi = p2.pos + u;
                let k2_lo = p2.pos + u - 3;

                let t1_hi = b.a1[k1_hi] + p1.hi;
                let t1_lo = b.a1[k1_lo] + p1.lo;
                let t2_hi = b.a2[k2_hi] + p2.hi;
                let t2_lo = b.a2[k2_lo] + p2.lo;

                let p1_new = split(x[start + i + 2], y[start + i + 2]);
                let p2_new = split(x[start + i + 3], y[start + i + 3]);

                b.a1[p1.pos + u - 2] += (b.a1[k1_hi] - t1_hi) + p1.hi;
                b.a1[p1.pos + u - 5] += (b.a1[k1_lo] - t1_lo) + p1.lo;
                b.a2[p2.pos + u - 2] += (b.a2[k2_hi] - t2_hi) + p2.hi;
                b.a2[p2.pos + u - 5] += (b.a2[k2_lo] - t2_lo) + p2.lo;

                b.a1[k1_hi] = t1_hi;
                b.a2[k2_hi] = t2_hi;
                b.a1[k1_lo] = t1_lo;
                b.a2[k2_lo] = t2_lo;

                p1 = p1_new;
                p2 = p2_new;
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
                tracing::trace!(ov_counter, "bucket dprod tidy-up");
                ov_counter = 1;
            }

            b.flush_overflow(&mut side_sum);
        }

        // Last pair, without preparing a next one.
        let k1_hi = p1.pos + u;
        let k1_lo = p1.pos + u - 3;
        let k2_hi = p2.pos + u;
        let k2_lo = p2.pos + u - 3;
        let t1_hi = b.a1[k1_hi] + p1.hi;
        let t1_lo = b.a1[k1_lo] + p1.lo;
        let t2_hi = b.a2[k2_hi] + p2.hi;
        let t2_lo = b.a2[k2_lo] + p2.lo;
        b.a1[p1.pos + u - 2] += (b.a1[k1_hi] - t1_hi) + p1.hi;
        b.a1[p1.pos + u - 5] += (b.a1[k1_lo] - t1_lo) + p1.lo;
        b.a2[p2.pos + u - 2] += (b.a2[k2_hi] - t2_hi) + p2.hi;
        b.a2[p2.pos + u - 5] += (b.a2[k2_lo] - t2_lo) + p2.lo;
        b.a1[k1_hi] = t1_hi;
        b.a2[k2_hi] = t2_hi;
        b.a1[k1_lo] = t1_lo;
        b.a2[k2_lo] = t2_lo;

        b.verify();

        // The top bin's current value seeds the backward Sum2s sweep; the
        // sweep itself runs one bin below it down to 0.
        let top = b.bin_count() - 2;
        let mut acc = b.a1[top] + b.a2[top];
        let mut err = 0.0_f64;
        for i in (0..top).rev() {
            let bi = b.a1[i] + b.a2[i];
            let x2 = acc + bi;
            err += (acc - x2) + bi;
            acc = x2;
        }

        b.initialize();
        Ok(side_sum + acc + err)
    }
}

#[inline]
fn deposit_pair(b: &mut Buckets, u: usize, pos: usize, hi: f64, lo: f64) {
    let k_hi = pos + u;
    let k_lo = pos + u - 3;
    let t_hi = b.a1[k_hi] + hi;
    b.a1[pos + u - 2] += (b.a1[k_hi] - t_hi) + hi;
    b.a1[k_hi] = t_hi;

    let t_lo = b.a1[k_lo] + lo;
    b.a1[pos + u - 5] += (b.a1[k_lo] - t_lo) + lo;
    b.a1[k_lo] = t_lo;
}

impl Default for BucketDotProd {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_positive_zero() {
        let mut d = BucketDotProd::new();
        assert_eq!(d.dprod(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn single_element_is_one_rounded_multiplication() {
        let mut d = BucketDotProd::new();
        assert_eq!(d.dprod(&[3.5], &[2.0]).unwrap(), 7.0);
    }

    #[test]
    fn length_mismatch_is_reported() {
        let mut d = BucketDotProd::new();
        let err = d.dprod(&[1.0, 2.0], &[1.0]).unwrap_err();
        match err {
            DotProdError::LengthMismatch { x_len, y_len } => {
                assert_eq!(x_len, 2);
                assert_eq!(y_len, 1);
            }
        }
    }

    #[test]
    fn catastrophic_cancellation_recovers_the_true_product() {
        let mut d = BucketDotProd::new();
        assert_eq!(d.dprod(&[1e20, 1.0], &[1.0, -1e20]).unwrap(), 0.0);
    }

    #[test]
    fn instance_is_reusable_and_deterministic() {
        let mut d = BucketDotProd::new();
        let x = [1.0, 2.5, -3.25, 1e15, -1e15, 7.0];
        let y = [2.0, -1.0, 4.0, 3.0, 3.0, 0.5];
        let first = d.dprod(&x, &y).unwrap();
        let second = d.dprod(&x, &y).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn sign_symmetry() {
        let mut d = BucketDotProd::new();
        let x = [3.0, -7.5, 1e30, -1e-30, 42.0];
        let y = [1.0, 2.0, 3.0, 4.0, 5.0];
        let neg_x: Vec<f64> = x.iter().map(|v| -v).collect();
        assert_eq!(d.dprod(&neg_x, &y).unwrap(), -d.dprod(&x, &y).unwrap());
    }

    #[test]
    fn fma_retains_bits_a_plain_multiply_subtract_would_lose() {
        // x*y here has a nonzero low part that a separate multiply-then-
        // subtract step cannot recover exactly; split() must rely on a
        // true FMA (`mul_add`), not `x * y - hi` computed at f64 precision.
        let x = 1.0 + 2f64.powi(-26);
        let y = 1.0 + 2f64.powi(-27);
        let p = split(x, y);
        assert_eq!(p.hi, x * y);
        assert_ne!(p.lo, 0.0);
        assert!(p.lo.abs() < p.hi.abs() * f64::EPSILON * 2.0);
    }
}
