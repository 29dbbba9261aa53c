//! Training Data Loading
//!
//! Minibatch iteration over labelled samples.
//!
//! A [`Dataset`] hands out `(inputs, targets)` batches until the epoch is
//! exhausted, then returns `None` once and rewinds itself (reshuffling when
//! enabled), so the usual loop is:
//!
//! ```rust,no_run
//! # use minet::data::{Dataset, InMemoryDataset};
//! # let mut data = InMemoryDataset::from_file("train.txt", 128, true, 1)?;
//! while let Some((inputs, targets)) = data.next_batch() {
//!     // inputs:  [batch, input_dims]
//!     // targets: [batch, 1] class indices
//! }
//! # Ok::<(), minet::MinetError>(())
//! ```
//!
//! The last batch of an epoch may be smaller than the batch size.
//!
//! ## Text Format
//!
//! ```text
//! 3 4
//! 0.0 0.5 0.25 1.0 ; 7
//! 0.1 0.0 0.0 0.9 ; 2
//! 0.3 0.3 0.3 0.3 ; 0
//! ```
//!
//! The header gives the sample count and the number of input features. Each
//! following line holds the space-separated features, ` ; `, and an integer label.

use crate::error::{MinetError, Result};
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::Path;

/// A batch of (inputs, targets)
pub type Batch = (Tensor, Tensor);

/// Source of minibatches for training and evaluation
pub trait Dataset {
    /// Number of samples
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewind to the first batch, reshuffling if enabled
    fn reset(&mut self);

    /// Next batch of the current epoch
    ///
    /// Returns `None` when the epoch is complete, after resetting.
    fn next_batch(&mut self) -> Option<Batch>;
}

/// Dataset held entirely in memory
///
/// # Fields
///
/// - `inputs`: One sample per row
/// - `targets`: Matching ground truth, one row per sample
/// - `order`: Sample visiting order for the current epoch
/// - `position`: Index into `order` of the next batch's first sample
pub struct InMemoryDataset {
    inputs: Tensor,
    targets: Tensor,
    order: Vec<usize>,
    position: usize,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl InMemoryDataset {
    /// Create a dataset from input and target rows
    ///
    /// # Arguments
    ///
    /// * `inputs` - `[samples, input_dims]`
    /// * `targets` - `[samples, k]`, typically `k = 1` class indices
    /// * `batch_size` - Maximum rows per batch
    /// * `shuffle` - Shuffle the visiting order at every reset
    /// * `seed` - Seed for the shuffling RNG
    ///
    /// The visiting order is shuffled once up front when `shuffle` is set.
    pub fn new(
        inputs: Tensor,
        targets: Tensor,
        batch_size: usize,
        shuffle: bool,
        seed: u64,
    ) -> Result<Self> {
        if inputs.rows == 0 {
            return Err(MinetError::EmptyDataset);
        }
        if targets.rows != inputs.rows {
            return Err(MinetError::shape(
                "dataset targets",
                (inputs.rows, targets.cols),
                targets.shape(),
            ));
        }
        if batch_size == 0 {
            return Err(MinetError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }

        let mut dataset = Self {
            order: (0..inputs.rows).collect(),
            inputs,
            targets,
            position: 0,
            batch_size,
            shuffle,
            rng: StdRng::seed_from_u64(seed),
        };
        dataset.reset();
        Ok(dataset)
    }

    /// Parse a dataset in the text format described in the module docs
    pub fn from_text(text: &str, batch_size: usize, shuffle: bool, seed: u64) -> Result<Self> {
        let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line));

        let (line_no, header) = lines.next().ok_or_else(|| MinetError::Parse {
            line: 1,
            message: "missing header".to_string(),
        })?;
        let mut fields = header.split_whitespace();
        let count: usize = parse_field(fields.next(), line_no, "sample count")?;
        let input_dims: usize = parse_field(fields.next(), line_no, "input dimensions")?;

        if count.checked_mul(input_dims).is_none() {
            return Err(MinetError::Parse {
                line: line_no,
                message: format!("{} samples of {} features is too large", count, input_dims),
            });
        }

        // Grown per parsed line; the header is not trusted for sizing
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for _ in 0..count {
            let (line_no, line) = lines.next().ok_or_else(|| MinetError::Parse {
                line: line_no + labels.len() + 1,
                message: format!("expected {} samples, found {}", count, labels.len()),
            })?;
            let (x, y) = line.split_once(';').ok_or_else(|| MinetError::Parse {
                line: line_no,
                message: "missing ';' between features and label".to_string(),
            })?;

            let start = features.len();
            for token in x.split_whitespace() {
                features.push(parse_field::<f64>(Some(token), line_no, "feature")?);
            }
            let found = features.len() - start;
            if found != input_dims {
                return Err(MinetError::Parse {
                    line: line_no,
                    message: format!("expected {} features, found {}", input_dims, found),
                });
            }
            let label: usize = parse_field(Some(y.trim()), line_no, "label")?;
            labels.push(label as f64);
        }

        tracing::info!(samples = count, input_dims, "loaded dataset");
        Self::new(
            Tensor::new(features, count, input_dims),
            Tensor::column(labels),
            batch_size,
            shuffle,
            seed,
        )
    }

    /// Read and parse a dataset file
    pub fn from_file(
        path: impl AsRef<Path>,
        batch_size: usize,
        shuffle: bool,
        seed: u64,
    ) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "reading dataset file");
        Self::from_text(&text, batch_size, shuffle, seed)
    }

    /// Number of input features per sample
    pub fn input_dims(&self) -> usize {
        self.inputs.cols
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches in one epoch
    pub fn num_batches(&self) -> usize {
        self.inputs.rows.div_ceil(self.batch_size)
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.inputs.rows
    }

    fn reset(&mut self) {
        self.position = 0;
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    fn next_batch(&mut self) -> Option<Batch> {
        if self.position >= self.order.len() {
            self.reset();
            return None;
        }

        let end = (self.position + self.batch_size).min(self.order.len());
        let rows = &self.order[self.position..end];
        let batch = (self.inputs.select_rows(rows), self.targets.select_rows(rows));
        self.position = end;
        Some(batch)
    }
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, line: usize, what: &str) -> Result<T> {
    let field = field.ok_or_else(|| MinetError::Parse {
        line,
        message: format!("missing {}", what),
    })?;
    field.parse().map_err(|_| MinetError::Parse {
        line,
        message: format!("invalid {} '{}'", what, field),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "3 4\n\
        0.0 0.5 0.25 1.0 ; 7\n\
        0.1 0.0 0.0 0.9 ; 2\n\
        0.3 0.3 0.3 0.3 ; 0\n";

    fn drain(data: &mut InMemoryDataset) -> Vec<Batch> {
        let mut batches = Vec::new();
        while let Some(batch) = data.next_batch() {
            batches.push(batch);
        }
        batches
    }

    #[test]
    fn test_from_text() {
        let data = InMemoryDataset::from_text(SAMPLE, 2, false, 0).unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data.input_dims(), 4);
        assert_eq!(data.num_batches(), 2);
        assert_eq!(data.targets.data, vec![7.0, 2.0, 0.0]);
        assert_eq!(data.inputs.row(1), &[0.1, 0.0, 0.0, 0.9]);
    }

    #[test]
    fn test_batches_then_none_then_restart() {
        let mut data = InMemoryDataset::from_text(SAMPLE, 2, false, 0).unwrap();

        let first = drain(&mut data);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].0.shape(), (2, 4));
        assert_eq!(first[1].0.shape(), (1, 4));
        assert_eq!(first[1].1.data, vec![0.0]);

        // Rewound automatically after the None
        let second = drain(&mut data);
        assert_eq!(second.len(), 2);
        assert_eq!(first[0].0, second[0].0);
    }

    #[test]
    fn test_shuffle_visits_every_sample_once() {
        let inputs = Tensor::new((0..20).map(f64::from).collect(), 20, 1);
        let targets = inputs.clone();
        let mut data = InMemoryDataset::new(inputs, targets, 6, true, 7).unwrap();

        for _ in 0..3 {
            let mut seen: Vec<f64> = drain(&mut data)
                .into_iter()
                .flat_map(|(x, y)| {
                    assert_eq!(x, y);
                    x.data
                })
                .collect();
            seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(seen, (0..20).map(f64::from).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_same_seed_same_order() {
        let make = || {
            let inputs = Tensor::new((0..10).map(f64::from).collect(), 10, 1);
            InMemoryDataset::new(inputs.clone(), inputs, 10, true, 99).unwrap()
        };
        let (mut a, mut b) = (make(), make());
        assert_eq!(a.next_batch(), b.next_batch());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let data = InMemoryDataset::from_file(file.path(), 8, true, 3).unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data.batch_size(), 8);
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let cases = [
            ("", 1),
            ("2 x\n", 1),
            ("2 2\n1.0 2.0 ; 1\n", 3),
            ("1 2\n1.0 2.0 1\n", 2),
            ("1 2\n1.0 ; 1\n", 2),
            ("1 2\n1.0 abc ; 1\n", 2),
            ("2 2\n1.0 2.0 ; 1\n1.0 2.0 ; -1\n", 3),
            ("18446744073709551615 2\n1.0 2.0 ; 1\n", 1),
            ("100000000000000 1\n1.0 ; 1\n", 3),
        ];
        for (text, expected) in cases {
            match InMemoryDataset::from_text(text, 1, false, 0) {
                Err(MinetError::Parse { line, .. }) => assert_eq!(line, expected, "{:?}", text),
                other => panic!("expected parse error for {:?}, got {:?}", text, other.err()),
            }
        }
    }

    #[test]
    fn test_rejects_bad_construction() {
        assert!(matches!(
            InMemoryDataset::from_text("0 3\n", 4, false, 0),
            Err(MinetError::EmptyDataset)
        ));
        assert!(matches!(
            InMemoryDataset::new(Tensor::zeros(3, 2), Tensor::zeros(2, 1), 1, false, 0),
            Err(MinetError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            InMemoryDataset::new(Tensor::zeros(3, 2), Tensor::zeros(3, 1), 0, false, 0),
            Err(MinetError::InvalidConfig(_))
        ));
    }
}
