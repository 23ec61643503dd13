//! Manual-verification CLI for the bucket accumulators. Generates
//! pseudo-random input spanning many exponents and prints the
//! correctly-rounded result next to a naive left-to-right `f64` reduction,
//! so the gap between the two is visible for ill-conditioned inputs.
//!
//! Not part of the library's public contract.

use bucket_accum::{BucketDotProd, BucketSum};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Parser)]
#[command(name = "bucket-demo", about = "Demo of correctly-rounded sum/dprod")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Correctly-rounded sum vs. naive sum.
    Sum {
        #[arg(long, default_value_t = 10_000)]
        len: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Correctly-rounded dot product vs. naive dot product.
    Dprod {
        #[arg(long, default_value_t = 10_000)]
        len: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

/// Spans roughly the full double exponent range so the bucket accumulator's
/// work is actually exercised, rather than staying in one or two bins.
fn random_vector(rng: &mut StdRng, len: usize) -> Vec<f64> {
    (0..len)
        .map(|_| {
            let mantissa: f64 = rng.gen_range(-1.0..1.0);
            let exponent: i32 = rng.gen_range(-300..300);
            mantissa * 2f64.powi(exponent)
        })
        .collect()
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Sum { len, seed } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let x = random_vector(&mut rng, len);

            let mut acc = BucketSum::new();
            let correctly_rounded = acc.sum(&x);
            let naive: f64 = x.iter().sum();

            println!("n = {len}");
            println!("correctly rounded sum : {correctly_rounded:e}");
            println!("naive left-to-right   : {naive:e}");
        }
        Command::Dprod { len, seed } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let x = random_vector(&mut rng, len);
            let y = random_vector(&mut rng, len);

            let mut acc = BucketDotProd::new();
            let correctly_rounded = acc.dprod(&x, &y).expect("equal-length vectors");
            let naive: f64 = x.iter().zip(y.iter()).map(|(a, b)| a * b).sum();

            println!("n = {len}");
            println!("correctly rounded dprod: {correctly_rounded:e}");
            println!("naive left-to-right    : {naive:e}");
        }
    }
}
