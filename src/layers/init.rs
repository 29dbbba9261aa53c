//! Weight Initialization
//!
//! Initializers produce the starting weight matrix `[indims, outdims]` for a
//! [`Linear`](super::Linear) layer. They hold no state of their own: the random
//! source is passed in by the caller, so a seeded `StdRng` makes a whole network
//! reproducible.
//!
//! ## Strategies
//!
//! ```text
//! Uniform(min, max):  w ~ U[min, max]
//! Normal(mean, std):  w = mean + std * z,  z ~ N(0, 1)
//! Xavier:             w ~ U[-a, a],  a = √6 / √(indims + outdims)
//! ```
//!
//! Xavier (Glorot & Bengio, 2010, eq. 16) bounds the initial magnitude by fan-in
//! and fan-out so that activation and gradient variance stay roughly constant
//! from layer to layer.

use crate::error::{MinetError, Result};
use crate::tensor::Tensor;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Weight initialization strategy
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WeightInit {
    Uniform { min: f64, max: f64 },
    Normal { mean: f64, std: f64 },
    Xavier,
}

impl WeightInit {
    /// Uniform in `[min, max]`
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `min > max` or either bound is not finite.
    pub fn uniform(min: f64, max: f64) -> Result<Self> {
        if !(min.is_finite() && max.is_finite()) || min > max {
            return Err(MinetError::InvalidConfig(format!(
                "uniform init requires finite min <= max, got [{}, {}]",
                min, max
            )));
        }
        Ok(WeightInit::Uniform { min, max })
    }

    /// Normal with the given mean and standard deviation
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `std` is negative or either value is not finite.
    pub fn normal(mean: f64, std: f64) -> Result<Self> {
        if !(mean.is_finite() && std.is_finite()) || std < 0.0 {
            return Err(MinetError::InvalidConfig(format!(
                "normal init requires finite mean and std >= 0, got N({}, {})",
                mean, std
            )));
        }
        Ok(WeightInit::Normal { mean, std })
    }

    pub fn xavier() -> Self {
        WeightInit::Xavier
    }

    /// Generate an `[indims, outdims]` weight matrix
    pub fn generate<R: Rng + ?Sized>(&self, indims: usize, outdims: usize, rng: &mut R) -> Tensor {
        let size = indims * outdims;
        let data: Vec<f64> = match *self {
            WeightInit::Uniform { min, max } => uniform(size, min, max, rng),
            WeightInit::Normal { mean, std } => (0..size)
                .map(|_| {
                    let z: f64 = StandardNormal.sample(rng);
                    z * std + mean
                })
                .collect(),
            WeightInit::Xavier => {
                let a = 6f64.sqrt() / ((indims + outdims) as f64).sqrt();
                uniform(size, -a, a, rng)
            }
        };
        Tensor::new(data, indims, outdims)
    }
}

fn uniform<R: Rng + ?Sized>(size: usize, min: f64, max: f64, rng: &mut R) -> Vec<f64> {
    (0..size)
        .map(|_| min + rng.random::<f64>() * (max - min))
        .collect()
}
