//! Neural Network Layers
//!
//! This module contains every layer the engine can train. Each layer provides both
//! a forward and a backward pass.
//!
//! ## Layers
//!
//! - **linear**: Fully connected layer (the only one with parameters)
//! - **activation**: ReLU, sigmoid and tanh
//! - **softmax**: Row-wise normalized exponential
//! - **sequential**: Ordered composition of layers
//! - **init**: Weight initialization strategies
//!
//! ## Design Pattern
//!
//! Every layer follows the same explicit-cache pattern:
//!
//! ```rust,ignore
//! impl SomeLayer {
//!     pub fn forward(&self, x: &Tensor) -> (Tensor, SomeCache) { }
//!     pub fn backward(&self, grad: &Tensor, cache: SomeCache) -> Result<Tensor> { }
//! }
//! ```
//!
//! Forward returns the values backward needs instead of storing them in the
//! layer, and backward takes that cache **by value**. A cache can therefore feed
//! exactly one backward pass, and one layer can serve several in-flight batches.
//! Parameter gradients are accumulated into a [`ParamStore`] rather than returned.
//!
//! [`Layer`] is the closed set of variants; its methods dispatch to the concrete
//! types with a `match`.

pub mod activation;
pub mod init;
pub mod linear;
pub mod sequential;
pub mod softmax;

pub use activation::{Relu, ReluCache, Sigmoid, SigmoidCache, Tanh, TanhCache};
pub use init::WeightInit;
pub use linear::{Linear, LinearCache};
pub use sequential::{Sequential, SequentialCache};
pub use softmax::{Softmax, SoftmaxCache};

use crate::error::{MinetError, Result};
use crate::params::{ParamId, ParamStore};
use crate::tensor::Tensor;
use std::fmt;

/// A differentiable layer
#[derive(Clone, Debug)]
pub enum Layer {
    Linear(Linear),
    Relu(Relu),
    Sigmoid(Sigmoid),
    Tanh(Tanh),
    Softmax(Softmax),
    Sequential(Sequential),
}

/// State recorded by [`Layer::forward`] for the matching [`Layer::backward`]
#[derive(Clone, Debug)]
pub enum LayerCache {
    Linear(LinearCache),
    Relu(ReluCache),
    Sigmoid(SigmoidCache),
    Tanh(TanhCache),
    Softmax(SoftmaxCache),
    Sequential(SequentialCache),
}

impl Layer {
    /// Forward pass
    ///
    /// # Returns
    ///
    /// Tuple of (output, cache); the cache must be handed to `backward` together
    /// with a gradient shaped like the output.
    pub fn forward(&self, params: &ParamStore, x: &Tensor) -> Result<(Tensor, LayerCache)> {
        Ok(match self {
            Layer::Linear(layer) => {
                let (y, cache) = layer.forward(params, x)?;
                (y, LayerCache::Linear(cache))
            }
            Layer::Relu(layer) => {
                let (y, cache) = layer.forward(x);
                (y, LayerCache::Relu(cache))
            }
            Layer::Sigmoid(layer) => {
                let (y, cache) = layer.forward(x);
                (y, LayerCache::Sigmoid(cache))
            }
            Layer::Tanh(layer) => {
                let (y, cache) = layer.forward(x);
                (y, LayerCache::Tanh(cache))
            }
            Layer::Softmax(layer) => {
                let (y, cache) = layer.forward(x);
                (y, LayerCache::Softmax(cache))
            }
            Layer::Sequential(layer) => {
                let (y, cache) = layer.forward(params, x)?;
                (y, LayerCache::Sequential(cache))
            }
        })
    }

    /// Backward pass
    ///
    /// Accumulates parameter gradients into `params` and returns the gradient with
    /// respect to the forward input.
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` if the cache was produced by a different kind of layer
    /// or the gradient is not shaped like the forward output.
    pub fn backward(
        &self,
        params: &mut ParamStore,
        grad_out: &Tensor,
        cache: LayerCache,
    ) -> Result<Tensor> {
        match (self, cache) {
            (Layer::Linear(layer), LayerCache::Linear(cache)) => {
                layer.backward(params, grad_out, cache)
            }
            (Layer::Relu(layer), LayerCache::Relu(cache)) => layer.backward(grad_out, cache),
            (Layer::Sigmoid(layer), LayerCache::Sigmoid(cache)) => layer.backward(grad_out, cache),
            (Layer::Tanh(layer), LayerCache::Tanh(cache)) => layer.backward(grad_out, cache),
            (Layer::Softmax(layer), LayerCache::Softmax(cache)) => layer.backward(grad_out, cache),
            (Layer::Sequential(layer), LayerCache::Sequential(cache)) => {
                layer.backward(params, grad_out, cache)
            }
            (layer, cache) => Err(MinetError::ProtocolViolation(format!(
                "{} layer cannot consume a {} cache",
                layer.kind(),
                cache.kind()
            ))),
        }
    }

    /// Forward pass without keeping the cache (evaluation, loss probing)
    pub fn predict(&self, params: &ParamStore, x: &Tensor) -> Result<Tensor> {
        self.forward(params, x).map(|(y, _)| y)
    }

    /// Append this layer's parameter handles (recursively) and return the list
    ///
    /// Linear contributes its weight then its bias; Sequential recurses into its
    /// children in forward order; activations contribute nothing.
    pub fn collect_params(&self, mut into: Vec<ParamId>) -> Vec<ParamId> {
        match self {
            Layer::Linear(layer) => {
                into.push(layer.weight);
                into.push(layer.bias);
                into
            }
            Layer::Sequential(layer) => layer.collect_params(into),
            _ => into,
        }
    }

    /// Append references to this layer's weight tensors, in parameter order
    pub fn collect_weights<'a>(
        &self,
        params: &'a ParamStore,
        mut into: Vec<&'a Tensor>,
    ) -> Vec<&'a Tensor> {
        into.extend(
            self.collect_params(Vec::new())
                .into_iter()
                .map(|id| params.weight(id)),
        );
        into
    }

    /// Append references to this layer's gradient accumulators, in parameter order
    pub fn collect_gradients<'a>(
        &self,
        params: &'a ParamStore,
        mut into: Vec<&'a Tensor>,
    ) -> Vec<&'a Tensor> {
        into.extend(
            self.collect_params(Vec::new())
                .into_iter()
                .map(|id| params.gradient(id)),
        );
        into
    }

    fn kind(&self) -> &'static str {
        match self {
            Layer::Linear(_) => "Linear",
            Layer::Relu(_) => "ReLU",
            Layer::Sigmoid(_) => "Sigmoid",
            Layer::Tanh(_) => "Tanh",
            Layer::Softmax(_) => "Softmax",
            Layer::Sequential(_) => "Sequential",
        }
    }
}

impl LayerCache {
    fn kind(&self) -> &'static str {
        match self {
            LayerCache::Linear(_) => "Linear",
            LayerCache::Relu(_) => "ReLU",
            LayerCache::Sigmoid(_) => "Sigmoid",
            LayerCache::Tanh(_) => "Tanh",
            LayerCache::Softmax(_) => "Softmax",
            LayerCache::Sequential(_) => "Sequential",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Linear(layer) => fmt::Display::fmt(layer, f),
            Layer::Sequential(layer) => fmt::Display::fmt(layer, f),
            other => f.write_str(other.kind()),
        }
    }
}

impl From<Linear> for Layer {
    fn from(layer: Linear) -> Self {
        Layer::Linear(layer)
    }
}

impl From<Relu> for Layer {
    fn from(layer: Relu) -> Self {
        Layer::Relu(layer)
    }
}

impl From<Sigmoid> for Layer {
    fn from(layer: Sigmoid) -> Self {
        Layer::Sigmoid(layer)
    }
}

impl From<Tanh> for Layer {
    fn from(layer: Tanh) -> Self {
        Layer::Tanh(layer)
    }
}

impl From<Softmax> for Layer {
    fn from(layer: Softmax) -> Self {
        Layer::Softmax(layer)
    }
}

impl From<Sequential> for Layer {
    fn from(layer: Sequential) -> Self {
        Layer::Sequential(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn all_variants(params: &mut ParamStore, rng: &mut StdRng) -> Vec<Layer> {
        let init = WeightInit::uniform(-1.0, 1.0).unwrap();
        let inner = Sequential::new(vec![
            Linear::new(params, 4, 3, &init, rng).into(),
            Tanh.into(),
            Linear::new(params, 3, 4, &init, rng).into(),
        ]);
        vec![
            Linear::new(params, 4, 6, &init, rng).into(),
            Relu.into(),
            Sigmoid.into(),
            Tanh.into(),
            Softmax.into(),
            inner.into(),
        ]
    }

    #[test]
    fn test_backward_preserves_input_shape() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut params = ParamStore::new();
        let x = WeightInit::uniform(-2.0, 2.0).unwrap().generate(3, 4, &mut rng);

        for layer in all_variants(&mut params, &mut rng) {
            let (y, cache) = layer.forward(&params, &x).unwrap();
            let grad_y = Tensor::new(vec![0.1; y.len()], y.rows, y.cols);
            let grad_x = layer.backward(&mut params, &grad_y, cache).unwrap();
            assert_eq!(grad_x.shape(), x.shape(), "shape round-trip failed for {}", layer);
        }
    }

    #[test]
    fn test_foreign_cache_is_protocol_violation() {
        let mut params = ParamStore::new();
        let x = Tensor::new(vec![0.5, -0.5], 1, 2);
        let (y, cache) = Layer::from(Relu).forward(&params, &x).unwrap();
        let err = Layer::from(Sigmoid)
            .backward(&mut params, &y, cache)
            .unwrap_err();
        assert!(matches!(err, MinetError::ProtocolViolation(_)));
    }

    #[test]
    fn test_collect_params_depth_first_order() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut params = ParamStore::new();
        let layers = all_variants(&mut params, &mut rng);
        let net = Layer::from(Sequential::new(layers));

        // Registration order: inner linear x2, then the outer linear. Collection
        // order follows the tree: outer linear first, then the nested container.
        let ids: Vec<usize> = net
            .collect_params(Vec::new())
            .into_iter()
            .map(ParamId::index)
            .collect();
        assert_eq!(ids, vec![4, 5, 0, 1, 2, 3]);

        let weights = net.collect_weights(&params, Vec::new());
        let grads = net.collect_gradients(&params, Vec::new());
        assert_eq!(weights.len(), grads.len());
        for (w, g) in weights.iter().zip(&grads) {
            assert_eq!(w.shape(), g.shape());
        }
    }

    #[test]
    fn test_collect_appends_to_existing() {
        let mut params = ParamStore::new();
        let extra = params.register(Tensor::zeros(1, 1));
        let linear = Linear::from_parameters(&mut params, Tensor::zeros(2, 2), Tensor::zeros(1, 2))
            .unwrap();
        let ids = Layer::from(linear.clone()).collect_params(vec![extra]);
        assert_eq!(ids, vec![extra, linear.weight, linear.bias]);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Layer::from(Relu).to_string(), "ReLU");
        assert_eq!(Layer::from(Softmax).to_string(), "Softmax");
        assert_eq!(Layer::from(Tanh).to_string(), "Tanh");
    }
}
