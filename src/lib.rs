//! Minet: Minimal Neural Network Training Engine
//!
//! Feed-forward neural networks on dense `f64` matrices, trained with
//! hand-derived backpropagation and plain SGD. Every component computes its own
//! gradients explicitly; there is no automatic differentiation.
//!
//! # Modules
//!
//! - [`tensor`] - Row-major matrices and the arithmetic the layers need
//! - [`params`] - Arena of weights and gradient accumulators
//! - [`layers`] - Linear, activations, softmax, sequential composition, initializers
//! - [`loss`] - Cross-entropy and mean squared error
//! - [`optimizer`] - Stochastic gradient descent
//! - [`gradients`] - Finite-difference gradient checking and gradient norms
//! - [`data`] - Minibatch datasets and the text dataset format
//! - [`train`] - Training loop with early stopping
//! - [`training_logger`] - CSV metrics logging
//!
//! # Example
//!
//! ```rust,no_run
//! use minet::prelude::*;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(1);
//! let mut params = ParamStore::new();
//! let init = WeightInit::xavier();
//! let net: Layer = Sequential::new(vec![
//!     Linear::new(&mut params, 784, 500, &init, &mut rng).into(),
//!     Relu.into(),
//!     Linear::new(&mut params, 500, 10, &init, &mut rng).into(),
//!     Softmax.into(),
//! ])
//! .into();
//!
//! let loss = Loss::from(CrossEntropy);
//! let sgd = Sgd::new(&net, 0.1);
//! let mut train_data = InMemoryDataset::from_file("mnist_train.txt", 128, true, 1)?;
//! let mut dev_data = InMemoryDataset::from_file("mnist_dev.txt", 128, false, 1)?;
//!
//! let summary = minet::train(
//!     &net,
//!     &mut params,
//!     &loss,
//!     &sgd,
//!     &mut train_data,
//!     &mut dev_data,
//!     &TrainingConfig::default(),
//!     None,
//! )?;
//! println!("best dev accuracy: {:.4}", summary.best_dev_accuracy);
//! # Ok::<(), minet::MinetError>(())
//! ```

pub mod data;
pub mod error;
pub mod gradients;
pub mod layers;
pub mod loss;
pub mod optimizer;
pub mod params;
pub mod tensor;
pub mod train;
pub mod training_logger;

// Re-export main types for convenience
pub use data::{Batch, Dataset, InMemoryDataset};
pub use error::{MinetError, Result};
pub use gradients::{check_gradients, gradient_norm, GradientCheckConfig, GradientCheckReport};
pub use layers::{Layer, LayerCache, Linear, Relu, Sequential, Sigmoid, Softmax, Tanh, WeightInit};
pub use loss::{CrossEntropy, Loss, LossCache, MeanSquaredError};
pub use optimizer::{Optimizer, Sgd};
pub use params::{ParamId, ParamStore};
pub use tensor::Tensor;
pub use train::{evaluate, train, train_step, TrainingConfig, TrainingSummary};
pub use training_logger::{EpochMetrics, TrainingLogger};

/// Everything needed to build and train a network
pub mod prelude {
    pub use crate::data::{Dataset, InMemoryDataset};
    pub use crate::layers::{
        Layer, Linear, Relu, Sequential, Sigmoid, Softmax, Tanh, WeightInit,
    };
    pub use crate::loss::{CrossEntropy, Loss, MeanSquaredError};
    pub use crate::optimizer::{Optimizer, Sgd};
    pub use crate::params::ParamStore;
    pub use crate::tensor::Tensor;
    pub use crate::train::TrainingConfig;
}
