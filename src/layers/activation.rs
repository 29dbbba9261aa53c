//! Activation Layers
//!
//! Element-wise nonlinearities and their derivatives for backpropagation. None of
//! them own parameters; each caches exactly what its derivative needs.
//!
//! ## Formulas
//!
//! ```text
//! ReLU:     y = max(0, x)         grad_x = grad_y  where x > 0, else 0
//! Sigmoid:  y = 1 / (1 + e^-x)    grad_x = grad_y * y * (1 - y)
//! Tanh:     y = tanh(x)           grad_x = grad_y * (1 - y²)
//! ```
//!
//! ReLU caches its input (the mask depends on the sign of x). Sigmoid and tanh
//! cache their output, since both derivatives are cheapest to express in terms of
//! y.

use crate::error::{MinetError, Result};
use crate::tensor::Tensor;

/// Reject a gradient that is not shaped like the cached forward tensor
pub(crate) fn check_grad_shape(layer: &str, grad_out: &Tensor, cached: &Tensor) -> Result<()> {
    if grad_out.shape() != cached.shape() {
        return Err(MinetError::ProtocolViolation(format!(
            "{} backward expected gradient [{}, {}], got [{}, {}]",
            layer, cached.rows, cached.cols, grad_out.rows, grad_out.cols
        )));
    }
    Ok(())
}

/// Rectified linear unit
#[derive(Clone, Copy, Debug, Default)]
pub struct Relu;

impl Relu {
    pub fn new() -> Self {
        Relu
    }

    /// y = max(0, x), caching x
    pub fn forward(&self, x: &Tensor) -> (Tensor, ReluCache) {
        let y = x.map(|v| if v <= 0.0 { 0.0 } else { v });
        (y, ReluCache { x: x.clone() })
    }

    /// Zero the gradient wherever the cached input was <= 0
    pub fn backward(&self, grad_out: &Tensor, cache: ReluCache) -> Result<Tensor> {
        check_grad_shape("ReLU", grad_out, &cache.x)?;
        let data = grad_out
            .data
            .iter()
            .zip(&cache.x.data)
            .map(|(&g, &x)| if x <= 0.0 { 0.0 } else { g })
            .collect();
        Ok(Tensor::new(data, grad_out.rows, grad_out.cols))
    }
}

/// Cache for ReLU backward pass
#[derive(Clone, Debug)]
pub struct ReluCache {
    pub x: Tensor,
}

/// Logistic sigmoid
#[derive(Clone, Copy, Debug, Default)]
pub struct Sigmoid;

impl Sigmoid {
    pub fn new() -> Self {
        Sigmoid
    }

    /// y = 1 / (1 + exp(-x)), caching y
    pub fn forward(&self, x: &Tensor) -> (Tensor, SigmoidCache) {
        let y = x.map(|v| 1.0 / (1.0 + (-v).exp()));
        (y.clone(), SigmoidCache { y })
    }

    /// grad_x = grad_y * y * (1 - y)
    pub fn backward(&self, grad_out: &Tensor, cache: SigmoidCache) -> Result<Tensor> {
        check_grad_shape("Sigmoid", grad_out, &cache.y)?;
        let data = grad_out
            .data
            .iter()
            .zip(&cache.y.data)
            .map(|(&g, &y)| g * y * (1.0 - y))
            .collect();
        Ok(Tensor::new(data, grad_out.rows, grad_out.cols))
    }
}

/// Cache for sigmoid backward pass
#[derive(Clone, Debug)]
pub struct SigmoidCache {
    pub y: Tensor,
}

/// Hyperbolic tangent
#[derive(Clone, Copy, Debug, Default)]
pub struct Tanh;

impl Tanh {
    pub fn new() -> Self {
        Tanh
    }

    /// y = tanh(x), caching y
    pub fn forward(&self, x: &Tensor) -> (Tensor, TanhCache) {
        let y = x.map(f64::tanh);
        (y.clone(), TanhCache { y })
    }

    /// grad_x = grad_y * (1 - y²)
    pub fn backward(&self, grad_out: &Tensor, cache: TanhCache) -> Result<Tensor> {
        check_grad_shape("Tanh", grad_out, &cache.y)?;
        let data = grad_out
            .data
            .iter()
            .zip(&cache.y.data)
            .map(|(&g, &y)| g * (1.0 - y * y))
            .collect();
        Ok(Tensor::new(data, grad_out.rows, grad_out.cols))
    }
}

/// Cache for tanh backward pass
#[derive(Clone, Debug)]
pub struct TanhCache {
    pub y: Tensor,
}
