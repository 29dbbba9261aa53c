//! Linear Layer (Fully Connected)
//!
//! The linear layer is the fundamental building block of neural networks.
//! It performs an affine transformation: y = x @ W + b
//!
//! ## Forward Pass
//!
//! ```text
//! Input:  x [batch, indims]
//! Weight: W [indims, outdims]
//! Bias:   b [1, outdims]
//! Output: y = x @ W + b [batch, outdims]
//! ```
//!
//! ## Backward Pass
//!
//! Using the chain rule:
//! ```text
//! grad_W += x^T @ grad_y
//! grad_b += sum(grad_y, axis=0)
//! grad_x  = grad_y @ W^T
//! ```
//!
//! Parameter gradients are **added** into the accumulators held by the
//! [`ParamStore`]; they are never overwritten. Two backward passes without an
//! intervening reset therefore leave the sum of both contributions, which is what
//! makes gradient accumulation over several batches possible.
//!
//! ## Implementation Notes
//!
//! - Weight drawn from the given [`WeightInit`], bias initialized to zero
//! - Caches x for backward pass

use super::init::WeightInit;
use crate::error::{MinetError, Result};
use crate::params::{ParamId, ParamStore};
use crate::tensor::Tensor;
use rand::Rng;
use std::fmt;

/// Linear layer (fully connected)
///
/// Holds handles to its weight `[indims, outdims]` and bias `[1, outdims]` in a
/// [`ParamStore`].
#[derive(Clone, Debug)]
pub struct Linear {
    pub weight: ParamId,
    pub bias: ParamId,
    indims: usize,
    outdims: usize,
}

impl Linear {
    /// Create a new linear layer, registering its parameters in `params`
    ///
    /// # Arguments
    ///
    /// * `params` - Store that will own the weight and bias
    /// * `indims` - Input dimension
    /// * `outdims` - Output dimension
    /// * `init` - Weight initialization strategy
    /// * `rng` - Random source for the initializer
    pub fn new<R: Rng + ?Sized>(
        params: &mut ParamStore,
        indims: usize,
        outdims: usize,
        init: &WeightInit,
        rng: &mut R,
    ) -> Self {
        let weight = params.register(init.generate(indims, outdims, rng));
        let bias = params.register(Tensor::zeros(1, outdims));
        Self {
            weight,
            bias,
            indims,
            outdims,
        }
    }

    /// Create a linear layer from explicit weight and bias tensors
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `bias` is not `[1, weight.cols]`.
    pub fn from_parameters(params: &mut ParamStore, weight: Tensor, bias: Tensor) -> Result<Self> {
        if bias.shape() != (1, weight.cols) {
            return Err(MinetError::shape(
                "linear bias",
                (1, weight.cols),
                bias.shape(),
            ));
        }
        let (indims, outdims) = weight.shape();
        Ok(Self {
            weight: params.register(weight),
            bias: params.register(bias),
            indims,
            outdims,
        })
    }

    pub fn indims(&self) -> usize {
        self.indims
    }

    pub fn outdims(&self) -> usize {
        self.outdims
    }

    /// Forward pass
    ///
    /// Computes y = x @ W + b and caches x for backward pass
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `x` does not have `indims` columns,
    /// `ProtocolViolation` if `params` is not the store the layer was built in.
    pub fn forward(&self, params: &ParamStore, x: &Tensor) -> Result<(Tensor, LinearCache)> {
        if x.cols != self.indims {
            return Err(MinetError::shape(
                "linear forward",
                (x.rows, self.indims),
                x.shape(),
            ));
        }
        let y = x
            .matmul(params.get(self.weight)?)?
            .add_row_vector(params.get(self.bias)?)?;
        Ok((y, LinearCache { x: x.clone() }))
    }

    /// Backward pass
    ///
    /// Accumulates weight and bias gradients into `params` and returns the
    /// gradient with respect to the input.
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` if `grad_out` is not shaped like the forward output.
    pub fn backward(
        &self,
        params: &mut ParamStore,
        grad_out: &Tensor,
        cache: LinearCache,
    ) -> Result<Tensor> {
        if grad_out.shape() != (cache.x.rows, self.outdims) {
            return Err(MinetError::ProtocolViolation(format!(
                "linear backward expected gradient [{}, {}], got [{}, {}]",
                cache.x.rows, self.outdims, grad_out.rows, grad_out.cols
            )));
        }

        // grad_W += x^T @ grad_out
        let grad_weight = cache.x.transpose().matmul(grad_out)?;
        params.accumulate(self.weight, &grad_weight)?;

        // grad_b += column sums of grad_out
        params.accumulate(self.bias, &grad_out.column_sums())?;

        // grad_x = grad_out @ W^T
        grad_out.matmul(&params.get(self.weight)?.transpose())
    }
}

impl fmt::Display for Linear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Linear: {} in, {} out", self.indims, self.outdims)
    }
}

/// Cache for linear layer backward pass
#[derive(Clone, Debug)]
pub struct LinearCache {
    pub x: Tensor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn fixed_layer(params: &mut ParamStore) -> Linear {
        let weight = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2);
        let bias = Tensor::row_vector(vec![0.5, -0.5]);
        Linear::from_parameters(params, weight, bias).unwrap()
    }

    #[test]
    fn test_forward_affine() {
        let mut params = ParamStore::new();
        let layer = fixed_layer(&mut params);
        let x = Tensor::new(vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0], 2, 3);

        let (y, cache) = layer.forward(&params, &x).unwrap();
        assert_eq!(y.shape(), (2, 2));
        assert_eq!(y.data, vec![6.5, 7.5, 3.5, 3.5]);
        assert_eq!(cache.x, x);
    }

    #[test]
    fn test_backward_gradients() {
        let mut params = ParamStore::new();
        let layer = fixed_layer(&mut params);
        let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
        let grad_y = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], 2, 2);

        let (_, cache) = layer.forward(&params, &x).unwrap();
        let grad_x = layer.backward(&mut params, &grad_y, cache).unwrap();

        // grad_W = x^T @ grad_y
        assert_eq!(
            params.gradient(layer.weight).data,
            vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]
        );
        // grad_b = column sums of grad_y
        assert_eq!(params.gradient(layer.bias).data, vec![1.0, 1.0]);
        // grad_x = grad_y @ W^T
        assert_eq!(grad_x.shape(), (2, 3));
        assert_eq!(grad_x.data, vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_backward_accumulates() {
        let mut params = ParamStore::new();
        let layer = fixed_layer(&mut params);
        let x = Tensor::new(vec![0.3, -0.2, 0.9], 1, 3);
        let grad_y = Tensor::new(vec![0.25, -1.0], 1, 2);

        let (_, cache) = layer.forward(&params, &x).unwrap();
        layer.backward(&mut params, &grad_y, cache).unwrap();
        let once = params.gradient(layer.weight).clone();

        let (_, cache) = layer.forward(&params, &x).unwrap();
        layer.backward(&mut params, &grad_y, cache).unwrap();
        let twice = params.gradient(layer.weight);

        for (a, b) in once.data.iter().zip(&twice.data) {
            assert_abs_diff_eq!(2.0 * a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_forward_rejects_wrong_input_width() {
        let mut params = ParamStore::new();
        let layer = fixed_layer(&mut params);
        let err = layer.forward(&params, &Tensor::zeros(2, 4)).unwrap_err();
        assert!(matches!(err, MinetError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_backward_rejects_wrong_gradient_shape() {
        let mut params = ParamStore::new();
        let layer = fixed_layer(&mut params);
        let (_, cache) = layer.forward(&params, &Tensor::zeros(2, 3)).unwrap();
        let err = layer
            .backward(&mut params, &Tensor::zeros(3, 2), cache)
            .unwrap_err();
        assert!(matches!(err, MinetError::ProtocolViolation(_)));
    }

    #[test]
    fn test_layer_rejects_other_store() {
        let mut params = ParamStore::new();
        let layer = fixed_layer(&mut params);
        // Same shapes, same slot indices, different store
        let mut other = ParamStore::new();
        fixed_layer(&mut other);

        let x = Tensor::zeros(2, 3);
        let err = layer.forward(&other, &x).unwrap_err();
        assert!(matches!(err, MinetError::ProtocolViolation(_)));

        let (_, cache) = layer.forward(&params, &x).unwrap();
        let err = layer
            .backward(&mut other, &Tensor::zeros(2, 2), cache)
            .unwrap_err();
        assert!(matches!(err, MinetError::ProtocolViolation(_)));
        assert!(other.gradient(layer.weight).data.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_from_parameters_checks_bias() {
        let mut params = ParamStore::new();
        let result = Linear::from_parameters(
            &mut params,
            Tensor::zeros(3, 2),
            Tensor::row_vector(vec![0.0; 3]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_display() {
        let mut params = ParamStore::new();
        assert_eq!(fixed_layer(&mut params).to_string(), "Linear: 3 in, 2 out");
    }
}
