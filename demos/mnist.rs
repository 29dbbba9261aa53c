//! MNIST Digit Classifier
//!
//! Trains a one-hidden-layer network (Linear → ReLU → Linear → Softmax) on MNIST
//! stored in the minet text dataset format, with early stopping on the dev set,
//! then reports test accuracy.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --example mnist -- \
//!     --train mnist_train.txt --dev mnist_dev.txt --test mnist_test.txt
//!
//! # Override hyperparameters, log metrics to CSV
//! cargo run --release --example mnist -- \
//!     --train mnist_train.txt --dev mnist_dev.txt --test mnist_test.txt \
//!     --seed 7 --lr 0.05 --hidden 256 --log mnist_log.csv
//!
//! # Start from a JSON configuration
//! cargo run --release --example mnist -- --config mnist.json \
//!     --train mnist_train.txt --dev mnist_dev.txt --test mnist_test.txt
//! ```
//!
//! Each dataset file starts with `<count> <input_dims>` followed by one
//! `features ; label` line per image.

use clap::Parser;
use minet::prelude::*;
use minet::{evaluate, train, TrainingLogger};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::Level;

const NUM_CLASSES: usize = 10;

#[derive(Parser)]
#[command(name = "mnist", about = "Train a feed-forward MNIST classifier")]
struct Args {
    /// Training set
    #[arg(long)]
    train: String,

    /// Development set, used for early stopping
    #[arg(long)]
    dev: String,

    /// Test set
    #[arg(long)]
    test: String,

    /// JSON training configuration (fields left out keep their defaults)
    #[arg(long)]
    config: Option<String>,

    /// Random seed for initialization and shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Minibatch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Epochs without dev improvement before stopping
    #[arg(long)]
    patience: Option<usize>,

    /// Hidden layer width
    #[arg(long)]
    hidden: Option<usize>,

    /// Write per-epoch metrics to this CSV file
    #[arg(long)]
    log: Option<String>,

    /// Log debug events
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    // ========================================================================
    // Resolve configuration from file + CLI overrides
    // ========================================================================
    let mut config = match &args.config {
        Some(path) => TrainingConfig::from_json_file(path)?,
        None => TrainingConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(lr) = args.lr {
        config.learning_rate = lr;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(epochs) = args.epochs {
        config.num_epochs = epochs;
    }
    if let Some(patience) = args.patience {
        config.patience = patience;
    }
    if let Some(hidden) = args.hidden {
        config.hidden_dims = hidden;
    }
    config.validate()?;

    // ========================================================================
    // Data
    // ========================================================================
    println!("\nLoading data...");
    let mut train_set =
        InMemoryDataset::from_file(&args.train, config.batch_size, config.shuffle, config.seed)?;
    let mut dev_set = InMemoryDataset::from_file(&args.dev, config.batch_size, false, config.seed)?;
    let mut test_set =
        InMemoryDataset::from_file(&args.test, config.batch_size, false, config.seed)?;
    println!("train: {} instances", train_set.len());
    println!("dev: {} instances", dev_set.len());
    println!("test: {} instances", test_set.len());

    // ========================================================================
    // Network
    // ========================================================================
    println!("\nCreating network...");
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut params = ParamStore::new();
    let init = WeightInit::xavier();
    let net: Layer = Sequential::new(vec![
        Linear::new(
            &mut params,
            train_set.input_dims(),
            config.hidden_dims,
            &init,
            &mut rng,
        )
        .into(),
        Relu.into(),
        Linear::new(&mut params, config.hidden_dims, NUM_CLASSES, &init, &mut rng).into(),
        Softmax.into(),
    ])
    .into();
    let loss = Loss::from(CrossEntropy);
    let sgd = Sgd::new(&net, config.learning_rate);
    println!("{}", net);
    println!("{}", loss);
    println!("{} trainable parameters", params.num_scalars());

    // ========================================================================
    // Training
    // ========================================================================
    println!("\nTraining...");
    let mut logger = args.log.as_deref().map(TrainingLogger::new).transpose()?;
    let summary = train(
        &net,
        &mut params,
        &loss,
        &sgd,
        &mut train_set,
        &mut dev_set,
        &config,
        logger.as_mut(),
    )?;
    println!(
        "\nTraining finished after {} epochs{} (best dev accuracy {:.4})",
        summary.epochs_run,
        if summary.stopped_early { ", stopped early" } else { "" },
        summary.best_dev_accuracy
    );

    let test_accuracy = evaluate(&net, &params, &mut test_set)?;
    println!("\nTest accuracy: {:.4}", test_accuracy);
    Ok(())
}
