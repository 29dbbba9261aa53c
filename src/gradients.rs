//! Gradient Utilities
//!
//! Diagnostics for the backward passes: a finite-difference gradient checker and
//! the gradient norm used to monitor training.
//!
//! ## Gradient Checking
//!
//! Every analytic gradient produced by backpropagation should agree with a
//! numerical estimate of the same derivative:
//!
//! ```text
//! ∂L/∂θ ≈ (L(θ + ε) - L(θ - ε)) / 2ε
//! ```
//!
//! The checker runs one forward/backward pass to obtain the analytic gradients,
//! then nudges each parameter scalar by ±ε in turn and recomputes the loss with
//! a forward pass only. Each perturbed entry is restored to its saved value
//! before moving on, so the network is unchanged afterwards.
//!
//! The cost is two forward passes per parameter scalar. Use it on small networks.
//!
//! ## Gradient Norm
//!
//! ```text
//! norm = √(Σ g²)  over every gradient entry
//! ```
//!
//! A sudden jump in the norm is usually the first sign that the learning rate is
//! too high.
//!
//! ## Example
//!
//! ```rust,no_run
//! use minet::prelude::*;
//! use minet::gradients::{check_gradients, GradientCheckConfig};
//! # fn demo(net: &Layer, params: &mut ParamStore, x: &Tensor, y: &Tensor) -> minet::Result<()> {
//! let loss = Loss::from(CrossEntropy);
//! let report = check_gradients(net, params, &loss, x, y, &GradientCheckConfig::default())?;
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

use crate::error::{MinetError, Result};
use crate::layers::Layer;
use crate::loss::Loss;
use crate::params::{ParamId, ParamStore};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Settings for [`check_gradients`]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientCheckConfig {
    /// Perturbation applied to each parameter scalar
    pub epsilon: f64,
    /// Largest accepted absolute difference between analytic and numeric values
    pub tolerance: f64,
}

impl Default for GradientCheckConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-7,
            tolerance: 1e-6,
        }
    }
}

impl GradientCheckConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epsilon.is_nan() || self.epsilon <= 0.0 {
            return Err(MinetError::InvalidConfig(format!(
                "gradient check epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(MinetError::InvalidConfig(format!(
                "gradient check tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// One parameter entry whose analytic gradient disagrees with the estimate
#[derive(Clone, Debug, PartialEq)]
pub struct GradientMismatch {
    pub param: ParamId,
    /// Flat (row-major) index into the parameter tensor
    pub index: usize,
    pub analytic: f64,
    pub numeric: f64,
}

/// Outcome of a gradient check
#[derive(Clone, Debug, Default)]
pub struct GradientCheckReport {
    /// Number of parameter scalars compared
    pub checked: usize,
    /// Largest |analytic - numeric| seen
    pub max_abs_diff: f64,
    pub mismatches: Vec<GradientMismatch>,
}

impl GradientCheckReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compare backpropagated gradients against central finite differences
///
/// # Arguments
///
/// * `net` - Network under test
/// * `params` - Parameter store holding the network's weights
/// * `loss` - Loss applied to the network output
/// * `input` - One minibatch of inputs
/// * `truth` - Ground truth for `input`
/// * `config` - Perturbation size and tolerance
///
/// # Returns
///
/// A report of every mismatching entry. Mismatches are diagnostics, not errors;
/// only shape or protocol problems in the forward/backward passes return `Err`.
///
/// Gradients of the network's parameters hold the analytic values afterwards.
pub fn check_gradients(
    net: &Layer,
    params: &mut ParamStore,
    loss: &Loss,
    input: &Tensor,
    truth: &Tensor,
    config: &GradientCheckConfig,
) -> Result<GradientCheckReport> {
    config.validate()?;
    let ids = net.collect_params(Vec::new());

    // Analytic gradients from a clean accumulator
    params.zero_gradients(&ids);
    let (prediction, net_cache) = net.forward(params, input)?;
    let (_, loss_cache) = loss.forward(truth, &prediction)?;
    let grad = loss.backward(loss_cache)?;
    net.backward(params, &grad, net_cache)?;

    let eps = config.epsilon;
    let mut report = GradientCheckReport::default();
    for &id in &ids {
        for index in 0..params.weight(id).len() {
            let original = params.weight(id).data[index];

            params.weight_mut(id).data[index] = original + eps;
            let plus = loss.value(truth, &net.predict(params, input)?)?;
            params.weight_mut(id).data[index] = original - eps;
            let minus = loss.value(truth, &net.predict(params, input)?)?;
            params.weight_mut(id).data[index] = original;

            let numeric = (plus - minus) / (2.0 * eps);
            let analytic = params.gradient(id).data[index];
            let diff = (analytic - numeric).abs();

            report.checked += 1;
            report.max_abs_diff = report.max_abs_diff.max(diff);
            if diff > config.tolerance {
                tracing::warn!(
                    param = id.index(),
                    index,
                    analytic,
                    numeric,
                    "gradient mismatch"
                );
                report.mismatches.push(GradientMismatch {
                    param: id,
                    index,
                    analytic,
                    numeric,
                });
            }
        }
    }

    if report.passed() {
        tracing::info!(
            checked = report.checked,
            max_abs_diff = report.max_abs_diff,
            "correct backward for weights"
        );
    } else {
        tracing::warn!(
            checked = report.checked,
            mismatches = report.mismatches.len(),
            max_abs_diff = report.max_abs_diff,
            "incorrect backward for weights"
        );
    }
    Ok(report)
}

/// L2 norm over the gradients of the given parameters
pub fn gradient_norm(params: &ParamStore, ids: &[ParamId]) -> f64 {
    ids.iter()
        .flat_map(|&id| params.gradient(id).data.iter())
        .map(|g| g * g)
        .sum::<f64>()
        .sqrt()
}
