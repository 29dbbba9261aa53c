//! Training Loop
//!
//! Minibatch SGD training for classifiers, with accuracy-based early stopping.
//!
//! ## One Training Step
//!
//! ```text
//! 1. optimizer.reset_gradients()
//! 2. Ŷ, cache      = net.forward(X)
//! 3. L, loss_cache = loss.forward(Y, Ŷ)
//! 4. ∂L/∂Ŷ         = loss.backward(loss_cache)
//! 5. net.backward(∂L/∂Ŷ, cache)       (accumulates parameter gradients)
//! 6. optimizer.update_weights()
//! ```
//!
//! Gradients are reset before every backward pass; without that they would keep
//! accumulating across batches.
//!
//! ## Early Stopping
//!
//! After every epoch the network is evaluated on the training and development
//! sets. Training stops once the development accuracy has failed to improve on
//! its best value for `patience` consecutive epochs, or after `num_epochs`.

use crate::data::Dataset;
use crate::error::{MinetError, Result};
use crate::gradients::gradient_norm;
use crate::layers::Layer;
use crate::loss::Loss;
use crate::optimizer::Optimizer;
use crate::params::ParamStore;
use crate::tensor::Tensor;
use crate::training_logger::{EpochMetrics, TrainingLogger};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Training configuration
///
/// Hyperparameters for training a classifier. Missing JSON fields take their
/// [`Default`] values.
///
/// # Common Configurations
///
/// - **Default**: MNIST-sized runs (hidden width 500, batches of 128)
/// - **Tiny**: Unit tests and smoke runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Learning rate for SGD
    pub learning_rate: f64,
    /// Number of samples per minibatch
    pub batch_size: usize,
    /// Maximum number of passes through the training set
    pub num_epochs: usize,
    /// Consecutive epochs without dev accuracy improvement before stopping
    pub patience: usize,
    /// Width of the hidden layer
    pub hidden_dims: usize,
    /// Seed for weight initialization and shuffling
    pub seed: u64,
    /// Shuffle the training set every epoch
    pub shuffle: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            batch_size: 128,
            num_epochs: 100,
            patience: 5,
            hidden_dims: 500,
            seed: 1,
            shuffle: true,
        }
    }
}

impl TrainingConfig {
    /// Create a tiny configuration for quick experiments
    pub fn tiny() -> Self {
        Self {
            learning_rate: 0.5,
            batch_size: 8,
            num_epochs: 20,
            patience: 3,
            hidden_dims: 16,
            seed: 1,
            shuffle: true,
        }
    }

    /// Parse a JSON configuration and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file and validate it
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check that every hyperparameter is usable
    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(MinetError::InvalidConfig(format!(
                "learning rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        let counts = [
            ("batch_size", self.batch_size),
            ("num_epochs", self.num_epochs),
            ("patience", self.patience),
            ("hidden_dims", self.hidden_dims),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(MinetError::InvalidConfig(format!(
                    "{} must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of [`train`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainingSummary {
    pub epochs_run: usize,
    pub best_dev_accuracy: f64,
    /// Summed minibatch loss of the last epoch
    pub final_loss: f64,
    /// True if patience ran out before `num_epochs`
    pub stopped_early: bool,
}

/// Run one minibatch update and return the batch loss
///
/// # Arguments
///
/// * `net` - Network to train
/// * `params` - Parameter store of `net`
/// * `loss` - Training objective
/// * `optimizer` - Optimizer built for `net`
/// * `inputs` - `[batch, input_dims]`
/// * `targets` - Ground truth for `inputs`
pub fn train_step<O: Optimizer + ?Sized>(
    net: &Layer,
    params: &mut ParamStore,
    loss: &Loss,
    optimizer: &O,
    inputs: &Tensor,
    targets: &Tensor,
) -> Result<f64> {
    optimizer.reset_gradients(params);

    let (prediction, cache) = net.forward(params, inputs)?;
    let (value, loss_cache) = loss.forward(targets, &prediction)?;
    let grad = loss.backward(loss_cache)?;
    net.backward(params, &grad, cache)?;

    optimizer.update_weights(params)?;
    Ok(value)
}

/// Classification accuracy over a whole dataset
///
/// The predicted class of each row is the column with the highest output. The
/// dataset is rewound first and is left rewound afterwards.
///
/// # Returns
///
/// The fraction of correctly classified samples, in `[0, 1]`
pub fn evaluate<D: Dataset + ?Sized>(
    net: &Layer,
    params: &ParamStore,
    data: &mut D,
) -> Result<f64> {
    if data.is_empty() {
        return Err(MinetError::EmptyDataset);
    }
    data.reset();

    let mut correct = 0usize;
    while let Some((inputs, targets)) = data.next_batch() {
        let prediction = net.predict(params, &inputs)?;
        correct += prediction
            .row_argmax()
            .into_iter()
            .zip(&targets.data)
            .filter(|&(predicted, &label)| predicted as f64 == label)
            .count();
    }
    Ok(correct as f64 / data.len() as f64)
}

/// Train `net` until the epoch limit or until dev accuracy stops improving
///
/// Each epoch runs [`train_step`] on every training batch, then measures train
/// and dev accuracy. Per-epoch metrics are emitted through `tracing` and, when a
/// logger is given, appended to its CSV file.
#[allow(clippy::too_many_arguments)]
pub fn train<O, D, E>(
    net: &Layer,
    params: &mut ParamStore,
    loss: &Loss,
    optimizer: &O,
    train_data: &mut D,
    dev_data: &mut E,
    config: &TrainingConfig,
    mut logger: Option<&mut TrainingLogger>,
) -> Result<TrainingSummary>
where
    O: Optimizer + ?Sized,
    D: Dataset + ?Sized,
    E: Dataset + ?Sized,
{
    config.validate()?;
    if train_data.is_empty() {
        return Err(MinetError::EmptyDataset);
    }

    let ids = net.collect_params(Vec::new());
    let mut best_dev_accuracy = f64::NEG_INFINITY;
    let mut not_at_peak = 0;
    let mut summary = TrainingSummary {
        epochs_run: 0,
        best_dev_accuracy,
        final_loss: 0.0,
        stopped_early: false,
    };

    train_data.reset();
    for epoch in 0..config.num_epochs {
        let mut total_loss = 0.0;
        while let Some((inputs, targets)) = train_data.next_batch() {
            total_loss += train_step(net, params, loss, optimizer, &inputs, &targets)?;
        }

        let metrics = EpochMetrics {
            epoch,
            learning_rate: optimizer.learning_rate(),
            loss: total_loss,
            train_accuracy: evaluate(net, params, train_data)?,
            dev_accuracy: evaluate(net, params, dev_data)?,
            gradient_norm: gradient_norm(params, &ids),
        };
        tracing::info!(
            epoch,
            loss = metrics.loss,
            train_accuracy = metrics.train_accuracy,
            dev_accuracy = metrics.dev_accuracy,
            gradient_norm = metrics.gradient_norm,
            "epoch finished"
        );
        if let Some(logger) = logger.as_deref_mut() {
            logger.log(&metrics)?;
        }

        summary.epochs_run = epoch + 1;
        summary.final_loss = total_loss;

        if metrics.dev_accuracy <= best_dev_accuracy {
            not_at_peak += 1;
            tracing::info!(not_at_peak, "dev accuracy not at peak");
        } else {
            not_at_peak = 0;
            best_dev_accuracy = metrics.dev_accuracy;
        }
        if not_at_peak == config.patience {
            summary.stopped_early = true;
            tracing::info!(epoch, patience = config.patience, "stopping early");
            break;
        }
    }

    summary.best_dev_accuracy = best_dev_accuracy;
    tracing::info!(
        epochs = summary.epochs_run,
        best_dev_accuracy,
        "training is finished"
    );
    Ok(summary)
}
