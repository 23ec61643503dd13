//! Black-box property tests over the public API: permutation invariance,
//! sign symmetry and zero absorption. These don't reach into crate
//! internals, so they live here rather than in a `#[cfg(test)]` module.

use bucket_accum::{BucketDotProd, BucketSum};
use proptest::prelude::*;

/// Keeps generated magnitudes away from the subnormal floor and from
/// overflowing when multiplied together in `dprod`, while still spanning
/// enough of the exponent range to exercise more than one bucket.
fn finite_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        (-1.0e150_f64..1.0e150),
        (-1.0_f64..1.0),
        (-1.0e-150_f64..1.0e-150),
    ]
}

fn finite_vec() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(finite_value(), 0..64)
}

/// Bit-exact equality, except `+0.0`/`-0.0` compare equal — sign symmetry
/// around zero is the one place the IEEE signed-zero distinction would
/// otherwise make an otherwise-correct implementation fail a bit-for-bit
/// comparison.
fn bits_eq(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (a == 0.0 && b == 0.0)
}

proptest! {
    #[test]
    fn permutation_invariance(mut v in finite_vec(), seed in any::<u64>()) {
        let mut acc = BucketSum::new();
        let original = acc.sum(&v);

        // Deterministic shuffle so the test is reproducible from the seed
        // proptest prints on failure.
        let mut state = seed | 1;
        let n = v.len();
        for i in (1..n).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let j = (state >> 33) as usize % (i + 1);
            v.swap(i, j);
        }

        let shuffled = acc.sum(&v);
        prop_assert_eq!(original.to_bits(), shuffled.to_bits());
    }

    #[test]
    fn sign_symmetry(v in finite_vec()) {
        let mut acc = BucketSum::new();
        let positive = acc.sum(&v);
        let negated: Vec<f64> = v.iter().map(|x| -x).collect();
        let negative = acc.sum(&negated);
        prop_assert!(bits_eq(positive, -negative));
    }

    #[test]
    fn zero_absorption(v in finite_vec(), insert_at in 0usize..65) {
        let mut acc = BucketSum::new();
        let base = acc.sum(&v);

        let at = insert_at.min(v.len());
        let mut with_zero = v.clone();
        with_zero.insert(at, 0.0);
        let with_zero_result = acc.sum(&with_zero);

        prop_assert_eq!(base.to_bits(), with_zero_result.to_bits());
    }

    #[test]
    fn reusable_instance_is_deterministic(v in finite_vec()) {
        let mut acc = BucketSum::new();
        let first = acc.sum(&v);
        let second = acc.sum(&v);
        prop_assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn dot_product_sign_symmetry(x in finite_vec(), seed in any::<u64>()) {
        let y: Vec<f64> = x.iter().enumerate().map(|(i, _)| {
            // Deterministic pseudo-random partner vector of matching length.
            let mut state = seed.wrapping_add(i as u64) | 1;
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let unit = ((state >> 11) as f64) / ((1u64 << 53) as f64);
            1.0 + unit
        }).collect();

        let mut acc = BucketDotProd::new();
        let positive = acc.dprod(&x, &y).unwrap();
        let negated: Vec<f64> = x.iter().map(|v| -v).collect();
        let negative = acc.dprod(&negated, &y).unwrap();
        prop_assert!(bits_eq(positive, -negative));
    }
}

#[test]
fn dprod_length_mismatch_is_a_typed_error() {
    let mut acc = BucketDotProd::new();
    assert!(acc.dprod(&[1.0, 2.0], &[1.0]).is_err());
}
