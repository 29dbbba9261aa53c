//! SGD Optimizer Implementation
//!
//! Plain stochastic gradient descent over the parameters of one network:
//!
//! ```text
//! θ = θ - α * g
//! ```
//!
//! where α is the learning rate and g the gradient accumulated by the most recent
//! backward pass. There is no momentum and no weight decay.
//!
//! ## Parameter Order
//!
//! The optimizer captures the network's parameter handles once, at construction,
//! in the order [`Layer::collect_params`] yields them. Weights and gradients are
//! read from the [`ParamStore`] through those handles, so the optimizer never holds
//! references into the network.
//!
//! ## Example
//!
//! ```rust,no_run
//! use minet::prelude::*;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let mut params = ParamStore::new();
//! let net: Layer = Sequential::new(vec![
//!     Linear::new(&mut params, 4, 3, &WeightInit::xavier(), &mut rng).into(),
//!     Softmax.into(),
//! ])
//! .into();
//!
//! let sgd = Sgd::new(&net, 0.1);
//! sgd.reset_gradients(&mut params);
//! // forward, loss, backward ...
//! sgd.update_weights(&mut params)?;
//! # Ok::<(), minet::MinetError>(())
//! ```

use crate::error::Result;
use crate::layers::Layer;
use crate::params::{ParamId, ParamStore};

/// Common interface of the optimizers
pub trait Optimizer {
    /// Zero every gradient accumulator this optimizer manages
    fn reset_gradients(&self, params: &mut ParamStore);

    /// Apply one update step from the accumulated gradients
    fn update_weights(&self, params: &mut ParamStore) -> Result<()>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, learning_rate: f64);
}

/// Stochastic gradient descent with a fixed (but adjustable) learning rate
#[derive(Clone, Debug)]
pub struct Sgd {
    params: Vec<ParamId>,
    learning_rate: f64,
}

impl Sgd {
    /// Create an optimizer for every parameter of `net`
    ///
    /// # Arguments
    ///
    /// * `net` - Network whose parameters will be updated
    /// * `learning_rate` - Step size α
    pub fn new(net: &Layer, learning_rate: f64) -> Self {
        let params = net.collect_params(Vec::new());
        tracing::debug!(
            parameters = params.len(),
            learning_rate,
            "created SGD optimizer"
        );
        Self {
            params,
            learning_rate,
        }
    }

    /// Parameter handles in update order
    pub fn params(&self) -> &[ParamId] {
        &self.params
    }
}

impl Optimizer for Sgd {
    fn reset_gradients(&self, params: &mut ParamStore) {
        params.zero_gradients(&self.params);
    }

    fn update_weights(&self, params: &mut ParamStore) -> Result<()> {
        for &id in &self.params {
            let (weight, gradient) = params.weight_and_gradient_mut(id)?;
            weight.scaled_add_assign(-self.learning_rate, gradient)?;
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }
}
