//! Loss Functions
//!
//! A loss turns a batch of predictions and the matching ground truth into one
//! scalar, and provides the gradient of that scalar with respect to the
//! predictions. Like layers, [`Loss::forward`] returns an explicit cache that
//! [`Loss::backward`] consumes.
//!
//! ## Cross-Entropy
//!
//! For a row-stochastic prediction matrix `Ŷ` and integer labels `y`:
//!
//! ```text
//! L        = -(1/N) Σ_i ln(Ŷ[i, y_i] + ε)
//! ∂L/∂Ŷ    = -1 / (N (Ŷ[i, y_i] + ε))   at column y_i, 0 elsewhere
//! ```
//!
//! ε = 1e-7 keeps the logarithm and the division finite when a predicted
//! probability underflows to zero.
//!
//! ## Mean Squared Error
//!
//! ```text
//! L      = (1/N) Σ_i Σ_j (Y[i, j] - Ŷ[i, j])²
//! ∂L/∂Ŷ  = -2 (Y - Ŷ) / N
//! ```
//!
//! With `expand_class_labels` set, a single-column integer `Y` is expanded into a
//! one-hot matrix shaped like `Ŷ` first, so the same loss can train a classifier.
//! Without the flag the shapes must match exactly.

use crate::error::{MinetError, Result};
use crate::tensor::Tensor;
use std::fmt;

/// Added to predicted probabilities before `ln` and division
pub const CROSS_ENTROPY_EPS: f64 = 1e-7;

/// Interpret a ground-truth value as a class index in `0..classes`
pub(crate) fn class_index(value: f64, row: usize, classes: usize) -> Result<usize> {
    if value < 0.0 || value.fract() != 0.0 || value >= classes as f64 {
        return Err(MinetError::InvalidLabel {
            row,
            value,
            classes,
        });
    }
    Ok(value as usize)
}

/// Both losses average over rows, so a batch needs at least one
fn check_nonempty(op: &'static str, prediction: &Tensor) -> Result<()> {
    if prediction.rows == 0 {
        return Err(MinetError::shape(op, (1, prediction.cols), prediction.shape()));
    }
    Ok(())
}

fn check_label_column(op: &'static str, truth: &Tensor, prediction: &Tensor) -> Result<()> {
    if truth.shape() != (prediction.rows, 1) {
        return Err(MinetError::shape(op, (prediction.rows, 1), truth.shape()));
    }
    Ok(())
}

/// Cross-entropy over integer class labels
#[derive(Clone, Copy, Debug, Default)]
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> Self {
        CrossEntropy
    }

    /// Mean negative log-likelihood of the true labels
    ///
    /// # Arguments
    ///
    /// * `truth` - `[batch, 1]` class indices
    /// * `prediction` - `[batch, classes]` probabilities
    pub fn forward(&self, truth: &Tensor, prediction: &Tensor) -> Result<(f64, CrossEntropyCache)> {
        check_nonempty("cross-entropy prediction", prediction)?;
        check_label_column("cross-entropy labels", truth, prediction)?;
        let labels = truth
            .data
            .iter()
            .enumerate()
            .map(|(row, &v)| class_index(v, row, prediction.cols))
            .collect::<Result<Vec<usize>>>()?;

        let total: f64 = labels
            .iter()
            .enumerate()
            .map(|(row, &label)| -(prediction.get(row, label) + CROSS_ENTROPY_EPS).ln())
            .sum();
        let loss = total / labels.len() as f64;

        let cache = CrossEntropyCache {
            prediction: prediction.clone(),
            labels,
        };
        Ok((loss, cache))
    }

    /// Gradient with respect to the predicted probabilities
    pub fn backward(&self, cache: CrossEntropyCache) -> Tensor {
        let p = &cache.prediction;
        let n = cache.labels.len() as f64;
        let mut grad = Tensor::zeros(p.rows, p.cols);
        for (row, &label) in cache.labels.iter().enumerate() {
            grad.set(row, label, -1.0 / (p.get(row, label) + CROSS_ENTROPY_EPS) / n);
        }
        grad
    }
}

/// Cache for cross-entropy backward pass
#[derive(Clone, Debug)]
pub struct CrossEntropyCache {
    pub prediction: Tensor,
    pub labels: Vec<usize>,
}

/// Mean squared error, summed over columns and averaged over rows
#[derive(Clone, Copy, Debug, Default)]
pub struct MeanSquaredError {
    /// Expand a `[batch, 1]` label column into one-hot rows when the prediction
    /// has more than one column
    pub expand_class_labels: bool,
}

impl MeanSquaredError {
    /// Plain regression loss; truth and prediction shapes must match
    pub fn new() -> Self {
        Self {
            expand_class_labels: false,
        }
    }

    /// Loss that accepts integer class labels against multi-column predictions
    pub fn with_class_labels() -> Self {
        Self {
            expand_class_labels: true,
        }
    }

    fn target(&self, truth: &Tensor, prediction: &Tensor) -> Result<Tensor> {
        if self.expand_class_labels && truth.cols == 1 && prediction.cols > 1 {
            check_label_column("mse labels", truth, prediction)?;
            let mut one_hot = Tensor::zeros(prediction.rows, prediction.cols);
            for (row, &v) in truth.data.iter().enumerate() {
                one_hot.set(row, class_index(v, row, prediction.cols)?, 1.0);
            }
            return Ok(one_hot);
        }
        if truth.shape() != prediction.shape() {
            return Err(MinetError::shape("mse target", prediction.shape(), truth.shape()));
        }
        Ok(truth.clone())
    }

    pub fn forward(&self, truth: &Tensor, prediction: &Tensor) -> Result<(f64, MseCache)> {
        check_nonempty("mse prediction", prediction)?;
        let target = self.target(truth, prediction)?;
        let diff = target.sub(prediction)?;
        let loss = diff.data.iter().map(|d| d * d).sum::<f64>() / target.rows as f64;
        Ok((loss, MseCache { diff }))
    }

    /// -2 (Y - Ŷ) / N
    pub fn backward(&self, cache: MseCache) -> Tensor {
        let n = cache.diff.rows as f64;
        cache.diff.mul_scalar(-2.0 / n)
    }
}

/// Cache for MSE backward pass
#[derive(Clone, Debug)]
pub struct MseCache {
    /// Y - Ŷ, with Y already expanded to one-hot if applicable
    pub diff: Tensor,
}

/// A training objective
#[derive(Clone, Copy, Debug)]
pub enum Loss {
    CrossEntropy(CrossEntropy),
    MeanSquaredError(MeanSquaredError),
}

/// State recorded by [`Loss::forward`] for the matching [`Loss::backward`]
#[derive(Clone, Debug)]
pub enum LossCache {
    CrossEntropy(CrossEntropyCache),
    MeanSquaredError(MseCache),
}

impl Loss {
    /// Compute the loss of `prediction` against `truth`
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the batch is empty, the batch sizes differ or the truth
    /// has the wrong width. `InvalidLabel` if a class label is out of range or not an integer.
    pub fn forward(&self, truth: &Tensor, prediction: &Tensor) -> Result<(f64, LossCache)> {
        match self {
            Loss::CrossEntropy(loss) => {
                let (value, cache) = loss.forward(truth, prediction)?;
                Ok((value, LossCache::CrossEntropy(cache)))
            }
            Loss::MeanSquaredError(loss) => {
                let (value, cache) = loss.forward(truth, prediction)?;
                Ok((value, LossCache::MeanSquaredError(cache)))
            }
        }
    }

    /// Gradient of the loss with respect to the prediction passed to `forward`
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` if the cache came from a different loss.
    pub fn backward(&self, cache: LossCache) -> Result<Tensor> {
        match (self, cache) {
            (Loss::CrossEntropy(loss), LossCache::CrossEntropy(cache)) => Ok(loss.backward(cache)),
            (Loss::MeanSquaredError(loss), LossCache::MeanSquaredError(cache)) => {
                Ok(loss.backward(cache))
            }
            (loss, _) => Err(MinetError::ProtocolViolation(format!(
                "{} received a cache from a different loss",
                loss
            ))),
        }
    }

    /// Loss value only, discarding the cache
    pub fn value(&self, truth: &Tensor, prediction: &Tensor) -> Result<f64> {
        self.forward(truth, prediction).map(|(value, _)| value)
    }
}

impl From<CrossEntropy> for Loss {
    fn from(loss: CrossEntropy) -> Self {
        Loss::CrossEntropy(loss)
    }
}

impl From<MeanSquaredError> for Loss {
    fn from(loss: MeanSquaredError) -> Self {
        Loss::MeanSquaredError(loss)
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loss::CrossEntropy(_) => f.write_str("CrossEntropyLoss"),
            Loss::MeanSquaredError(_) => f.write_str("MeanSquareErrorLoss"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn probs() -> Tensor {
        Tensor::new(vec![0.7, 0.2, 0.1, 0.1, 0.3, 0.6], 2, 3)
    }

    #[test]
    fn test_cross_entropy_value() {
        let loss = Loss::from(CrossEntropy);
        let labels = Tensor::column(vec![0.0, 2.0]);
        let value = loss.value(&labels, &probs()).unwrap();
        let expected = -((0.7f64 + 1e-7).ln() + (0.6f64 + 1e-7).ln()) / 2.0;
        assert_abs_diff_eq!(value, expected, epsilon = 1e-15);
    }

    #[test]
    fn test_cross_entropy_one_hot_is_minimal() {
        let loss = Loss::from(CrossEntropy);
        let labels = Tensor::column(vec![2.0, 0.0, 1.0]);
        let one_hot = Tensor::new(vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 3, 3);
        let value = loss.value(&labels, &one_hot).unwrap();
        assert_abs_diff_eq!(value, -(1.0f64 + 1e-7).ln(), epsilon = 1e-15);
        assert!(value.abs() < 1e-6);
    }

    #[test]
    fn test_cross_entropy_gradient() {
        let loss = Loss::from(CrossEntropy);
        let labels = Tensor::column(vec![1.0, 2.0]);
        let (_, cache) = loss.forward(&labels, &probs()).unwrap();
        let grad = loss.backward(cache).unwrap();

        assert_eq!(grad.shape(), (2, 3));
        assert_abs_diff_eq!(grad.get(0, 1), -1.0 / (0.2 + 1e-7) / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(grad.get(1, 2), -1.0 / (0.6 + 1e-7) / 2.0, epsilon = 1e-12);
        assert_eq!(grad.get(0, 0), 0.0);
        assert_eq!(grad.get(1, 1), 0.0);
    }

    #[test]
    fn test_cross_entropy_zero_probability_is_finite() {
        let loss = Loss::from(CrossEntropy);
        let p = Tensor::new(vec![1.0, 0.0], 1, 2);
        let (value, cache) = loss.forward(&Tensor::column(vec![1.0]), &p).unwrap();
        assert!(value.is_finite());
        assert!(loss.backward(cache).unwrap().data.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn test_cross_entropy_rejects_bad_labels() {
        let loss = Loss::from(CrossEntropy);
        for bad in [3.0, -1.0, 0.5] {
            let err = loss.value(&Tensor::column(vec![0.0, bad]), &probs()).unwrap_err();
            assert!(matches!(err, MinetError::InvalidLabel { row: 1, .. }));
        }
        let err = loss.value(&Tensor::column(vec![0.0]), &probs()).unwrap_err();
        assert!(matches!(err, MinetError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_mse_regression() {
        let loss = Loss::from(MeanSquaredError::new());
        let truth = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let pred = Tensor::new(vec![1.5, 2.0, 2.0, 4.0], 2, 2);
        let (value, cache) = loss.forward(&truth, &pred).unwrap();
        assert_abs_diff_eq!(value, (0.25 + 1.0) / 2.0, epsilon = 1e-15);

        let grad = loss.backward(cache).unwrap();
        assert_eq!(grad.data, vec![0.5, 0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_mse_one_hot_expansion() {
        let expanding = Loss::from(MeanSquaredError::with_class_labels());
        let labels = Tensor::column(vec![0.0, 2.0]);
        let explicit = Tensor::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0], 2, 3);

        let (a, cache_a) = expanding.forward(&labels, &probs()).unwrap();
        let plain = Loss::from(MeanSquaredError::new());
        let (b, cache_b) = plain.forward(&explicit, &probs()).unwrap();

        assert_abs_diff_eq!(a, b, epsilon = 1e-15);
        assert_eq!(
            expanding.backward(cache_a).unwrap(),
            plain.backward(cache_b).unwrap()
        );
    }

    #[test]
    fn test_mse_without_flag_rejects_label_column() {
        let plain = Loss::from(MeanSquaredError::new());
        let err = plain
            .value(&Tensor::column(vec![0.0, 2.0]), &probs())
            .unwrap_err();
        assert!(matches!(err, MinetError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_single_column_regression_with_flag_is_not_expanded() {
        let loss = Loss::from(MeanSquaredError::with_class_labels());
        let truth = Tensor::column(vec![0.25, 1.5]);
        let pred = Tensor::column(vec![0.0, 1.0]);
        let value = loss.value(&truth, &pred).unwrap();
        assert_abs_diff_eq!(value, (0.0625 + 0.25) / 2.0, epsilon = 1e-15);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let empty_pred = Tensor::zeros(0, 3);
        let losses = [
            (Loss::from(CrossEntropy), Tensor::zeros(0, 1)),
            (Loss::from(MeanSquaredError::new()), Tensor::zeros(0, 3)),
            (Loss::from(MeanSquaredError::with_class_labels()), Tensor::zeros(0, 1)),
        ];
        for (loss, truth) in losses {
            let err = loss.value(&truth, &empty_pred).unwrap_err();
            assert!(
                matches!(err, MinetError::ShapeMismatch { actual: (0, 3), .. }),
                "{}: {:?}",
                loss,
                err
            );
        }
    }

    #[test]
    fn test_foreign_cache_rejected() {
        let ce = Loss::from(CrossEntropy);
        let mse = Loss::from(MeanSquaredError::new());
        let (_, cache) = mse.forward(&probs(), &probs()).unwrap();
        assert!(matches!(
            ce.backward(cache),
            Err(MinetError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Loss::from(CrossEntropy).to_string(), "CrossEntropyLoss");
        assert_eq!(
            Loss::from(MeanSquaredError::new()).to_string(),
            "MeanSquareErrorLoss"
        );
    }
}
