//! Softmax Layer
//!
//! Turns each row of scores into a probability distribution:
//!
//! ```text
//! y[i, j] = exp(x[i, j] - max_i) / sum_k exp(x[i, k] - max_i)
//! ```
//!
//! ## Backward Pass
//!
//! The Jacobian of a softmax row is `diag(y) - y yᵀ`. Multiplying it by the
//! incoming gradient collapses to
//!
//! ```text
//! grad_x[i, :] = y[i, :] * (grad_y[i, :] - sum_k grad_y[i, k] * y[i, k])
//! ```
//!
//! so the full `[cols, cols]` Jacobian is never built.

use super::activation::check_grad_shape;
use crate::error::Result;
use crate::tensor::Tensor;

/// Row-wise softmax
#[derive(Clone, Copy, Debug, Default)]
pub struct Softmax;

impl Softmax {
    pub fn new() -> Self {
        Softmax
    }

    /// Row-normalized exponentials, caching the output
    pub fn forward(&self, x: &Tensor) -> (Tensor, SoftmaxCache) {
        let y = x.softmax_rows();
        (y.clone(), SoftmaxCache { y })
    }

    /// Jacobian-vector product through the cached probabilities
    pub fn backward(&self, grad_out: &Tensor, cache: SoftmaxCache) -> Result<Tensor> {
        check_grad_shape("Softmax", grad_out, &cache.y)?;
        let y = &cache.y;
        let dot = grad_out.mul(y)?.row_sums();

        let mut data = Vec::with_capacity(y.len());
        for i in 0..y.rows {
            let d = dot.data[i];
            data.extend(
                grad_out
                    .row(i)
                    .iter()
                    .zip(y.row(i))
                    .map(|(&g, &p)| p * (g - d)),
            );
        }
        Ok(Tensor::new(data, y.rows, y.cols))
    }
}

/// Cache for softmax backward pass
#[derive(Clone, Debug)]
pub struct SoftmaxCache {
    pub y: Tensor,
}
