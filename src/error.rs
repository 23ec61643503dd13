use thiserror::Error;

/// Failure to reserve the fixed-size bucket arrays at construction.
///
/// Every `BucketSum`/`BucketDotProd` allocates three `f64` slices once, up
/// front, and never again for the lifetime of the instance. `try_new`
/// surfaces an allocator failure here instead of aborting so a caller
/// embedding this in a larger fallible-allocation pipeline has something to
/// propagate.
#[derive(Error, Debug)]
pub enum AllocError {
    #[error("failed to reserve {requested} bucket slots")]
    BucketReserve { requested: usize },
}

/// Precondition violation for [`crate::BucketDotProd::dprod`].
#[derive(Error, Debug)]
pub enum DotProdError {
    #[error("x and y must have equal length, got {x_len} and {y_len}")]
    LengthMismatch { x_len: usize, y_len: usize },
}
