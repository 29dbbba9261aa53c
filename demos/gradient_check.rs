//! Gradient Check
//!
//! Verifies the hand-written backward passes of a small classifier against
//! central finite differences.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example gradient_check
//! cargo run --example gradient_check -- --seed 3 --epsilon 1e-6 --tolerance 1e-5
//! ```

use clap::Parser;
use minet::gradients::{check_gradients, GradientCheckConfig};
use minet::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Parser)]
#[command(
    name = "gradient_check",
    about = "Compare backpropagated gradients with finite differences"
)]
struct Args {
    /// Seed for weight initialization
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Perturbation size
    #[arg(long, default_value = "1e-7")]
    epsilon: f64,

    /// Accepted absolute difference
    #[arg(long, default_value = "1e-6")]
    tolerance: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt().init();

    println!("--- Test Classification ---");
    let x = Tensor::from_rows(&[
        vec![0.1, 0.1, 0.1, 0.6, 0.1],
        vec![0.5, 0.1, 0.2, 0.1, 0.1],
        vec![0.1, 0.2, 0.2, 0.1, 0.4],
    ])?;
    let y = Tensor::column(vec![2.0, 0.0, 1.0]);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut params = ParamStore::new();
    let init = WeightInit::uniform(-1.0, 1.0)?;
    let net: Layer = Sequential::new(vec![
        Linear::new(&mut params, 5, 10, &init, &mut rng).into(),
        Sigmoid.into(),
        Linear::new(&mut params, 10, 20, &init, &mut rng).into(),
        Relu.into(),
        Linear::new(&mut params, 20, 6, &init, &mut rng).into(),
        Softmax.into(),
    ])
    .into();
    let loss = Loss::from(CrossEntropy);
    println!("{}", net);
    println!("{}", loss);

    let config = GradientCheckConfig {
        epsilon: args.epsilon,
        tolerance: args.tolerance,
    };
    let report = check_gradients(&net, &mut params, &loss, &x, &y, &config)?;

    if report.passed() {
        println!(
            "correct backward for weights ({} entries, max difference {:.3e})",
            report.checked, report.max_abs_diff
        );
        Ok(())
    } else {
        for m in report.mismatches.iter().take(10) {
            eprintln!(
                "  param {} entry {}: analytic {:.6e}, numeric {:.6e}",
                m.param.index(),
                m.index,
                m.analytic,
                m.numeric
            );
        }
        Err(format!(
            "incorrect backward for weights: {} of {} entries differ",
            report.mismatches.len(),
            report.checked
        )
        .into())
    }
}
