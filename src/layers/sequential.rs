//! Sequential Container
//!
//! Chains layers so that each child's output is the next child's input:
//!
//! ```text
//! x → Linear → ReLU → Linear → Softmax → y
//! ```
//!
//! Backward runs the same chain in reverse, each child's input gradient becoming
//! the output gradient of the child before it. Parameter collection recurses into
//! the children in forward order, which fixes the order the optimizer sees.

use super::{Layer, LayerCache};
use crate::error::{MinetError, Result};
use crate::params::{ParamId, ParamStore};
use crate::tensor::Tensor;
use std::fmt;

/// An ordered list of layers applied one after another
#[derive(Clone, Debug, Default)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// Append a layer to the end of the chain
    pub fn push(&mut self, layer: impl Into<Layer>) {
        self.layers.push(layer.into());
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Forward pass through every child in order
    ///
    /// Returns the final output and one cache per child.
    pub fn forward(&self, params: &ParamStore, x: &Tensor) -> Result<(Tensor, SequentialCache)> {
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut out = x.clone();
        for layer in &self.layers {
            let (y, cache) = layer.forward(params, &out)?;
            caches.push(cache);
            out = y;
        }
        Ok((out, SequentialCache { caches }))
    }

    /// Backward pass through every child in reverse order
    pub fn backward(
        &self,
        params: &mut ParamStore,
        grad_out: &Tensor,
        cache: SequentialCache,
    ) -> Result<Tensor> {
        if cache.caches.len() != self.layers.len() {
            return Err(MinetError::ProtocolViolation(format!(
                "sequential backward expected {} caches, got {}",
                self.layers.len(),
                cache.caches.len()
            )));
        }

        let mut grad = grad_out.clone();
        for (layer, layer_cache) in self.layers.iter().zip(cache.caches).rev() {
            grad = layer.backward(params, &grad, layer_cache)?;
        }
        Ok(grad)
    }

    /// Append the parameter handles of every child, in forward order
    pub fn collect_params(&self, into: Vec<ParamId>) -> Vec<ParamId> {
        self.layers
            .iter()
            .fold(into, |acc, layer| layer.collect_params(acc))
    }
}

impl fmt::Display for Sequential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "(")?;
        for layer in &self.layers {
            for line in layer.to_string().lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        write!(f, ")")
    }
}

/// One cache per child, in forward order
#[derive(Clone, Debug)]
pub struct SequentialCache {
    pub caches: Vec<LayerCache>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Linear, Relu, Sigmoid};
    use approx::assert_abs_diff_eq;

    fn two_layer(params: &mut ParamStore) -> (Linear, Sequential) {
        let linear = Linear::from_parameters(
            params,
            Tensor::new(vec![0.5, -1.0, 0.25, 2.0, -0.75, 0.1], 3, 2),
            Tensor::row_vector(vec![0.1, -0.2]),
        )
        .unwrap();
        let net = Sequential::new(vec![linear.clone().into(), Sigmoid.into()]);
        (linear, net)
    }

    #[test]
    fn test_matches_manual_chaining() {
        let x = Tensor::new(vec![1.0, -2.0, 0.5, 0.3, 0.3, -0.9], 2, 3);
        let grad_y = Tensor::new(vec![0.2, -0.4, 1.0, 0.5], 2, 2);

        // Through the container
        let mut params_a = ParamStore::new();
        let (_, net) = two_layer(&mut params_a);
        let (y_seq, cache) = net.forward(&params_a, &x).unwrap();
        let gx_seq = net.backward(&mut params_a, &grad_y, cache).unwrap();

        // By hand
        let mut params_b = ParamStore::new();
        let (linear, _) = two_layer(&mut params_b);
        let (h, lin_cache) = linear.forward(&params_b, &x).unwrap();
        let (y_manual, sig_cache) = Sigmoid.forward(&h);
        let gh = Sigmoid.backward(&grad_y, sig_cache).unwrap();
        let gx_manual = linear.backward(&mut params_b, &gh, lin_cache).unwrap();

        assert_eq!(y_seq, y_manual);
        assert_eq!(gx_seq, gx_manual);
        for id in net.collect_params(Vec::new()) {
            let (a, b) = (params_a.gradient(id), params_b.gradient(id));
            for (ga, gb) in a.data.iter().zip(&b.data) {
                assert_abs_diff_eq!(*ga, *gb, epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn test_backward_rejects_truncated_cache() {
        let mut params = ParamStore::new();
        let (_, net) = two_layer(&mut params);
        let (y, mut cache) = net.forward(&params, &Tensor::zeros(1, 3)).unwrap();
        cache.caches.pop();
        let err = net.backward(&mut params, &y, cache).unwrap_err();
        assert!(matches!(err, MinetError::ProtocolViolation(_)));
    }

    #[test]
    fn test_empty_is_identity() {
        let mut params = ParamStore::new();
        let net = Sequential::default();
        let x = Tensor::new(vec![1.0, 2.0], 1, 2);
        let (y, cache) = net.forward(&params, &x).unwrap();
        assert_eq!(y, x);
        assert_eq!(net.backward(&mut params, &x, cache).unwrap(), x);
    }

    #[test]
    fn test_display_nested() {
        let mut params = ParamStore::new();
        let (_, inner) = two_layer(&mut params);
        let mut outer = Sequential::default();
        outer.push(inner);
        outer.push(Relu);
        assert_eq!(
            outer.to_string(),
            "(\n    (\n        Linear: 3 in, 2 out\n        Sigmoid\n    )\n    ReLU\n)"
        );
    }
}
