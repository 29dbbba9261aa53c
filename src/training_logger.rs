//! Training Logger
//!
//! Records per-epoch metrics to a CSV file so runs can be plotted and compared
//! after the fact.
//!
//! ## Example
//!
//! ```rust,no_run
//! use minet::training_logger::{EpochMetrics, TrainingLogger};
//!
//! let mut logger = TrainingLogger::new("training_log.csv")?;
//! logger.log(&EpochMetrics {
//!     epoch: 0,
//!     learning_rate: 0.1,
//!     loss: 123.4,
//!     train_accuracy: 0.91,
//!     dev_accuracy: 0.90,
//!     gradient_norm: 0.7,
//! })?;
//! # Ok::<(), minet::MinetError>(())
//! ```
//!
//! ## CSV Format
//!
//! - `epoch`: Zero-based epoch number
//! - `elapsed_seconds`: Time since the logger was created
//! - `learning_rate`: Learning rate used during the epoch
//! - `loss`: Sum of the minibatch losses over the epoch
//! - `train_accuracy`: Classification accuracy on the training set
//! - `dev_accuracy`: Classification accuracy on the development set

use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

const HEADER: &str = "epoch,elapsed_seconds,learning_rate,loss,train_accuracy,dev_accuracy";

/// Metrics gathered at the end of one training epoch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub learning_rate: f64,
    /// Sum of the minibatch losses
    pub loss: f64,
    pub train_accuracy: f64,
    pub dev_accuracy: f64,
    /// L2 norm of the gradients after the last update of the epoch
    pub gradient_norm: f64,
}

/// CSV writer for [`EpochMetrics`]
///
/// # Fields
///
/// - `log_file`: Output CSV file
/// - `start_time`: When the logger was created (for elapsed time)
/// - `last_log_time`: Last log timestamp (for per-epoch timing)
pub struct TrainingLogger {
    log_file: BufWriter<File>,
    start_time: Instant,
    last_log_time: Instant,
}

impl TrainingLogger {
    /// Create the CSV file and write its header
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let mut log_file = BufWriter::new(File::create(log_path)?);
        writeln!(log_file, "{}", HEADER)?;
        log_file.flush()?;

        let now = Instant::now();
        Ok(Self {
            log_file,
            start_time: now,
            last_log_time: now,
        })
    }

    /// Append one row and flush it to disk
    pub fn log(&mut self, metrics: &EpochMetrics) -> Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        writeln!(
            self.log_file,
            "{},{:.2},{:.6},{:.4},{:.4},{:.4}",
            metrics.epoch,
            elapsed,
            metrics.learning_rate,
            metrics.loss,
            metrics.train_accuracy,
            metrics.dev_accuracy
        )?;
        // Flush each row so a crashed run keeps its history
        self.log_file.flush()?;

        let epoch_seconds = self.last_log_time.elapsed().as_secs_f64();
        tracing::debug!(
            epoch = metrics.epoch,
            elapsed_seconds = elapsed,
            epoch_seconds,
            "logged epoch metrics"
        );
        self.last_log_time = Instant::now();
        Ok(())
    }
}
