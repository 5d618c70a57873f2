//! # Scattering Coefficient Normalization
//!
//! Scattering coefficients arrive as ``[batch, 3 * n_coefficients, M, N]``;
//! the colour and coefficient axes are merged into one channel axis, which
//! [`ScatteringNorm`] batch-normalizes.
//!
//! A non-affine norm is expressed as a [`BatchNorm`] whose scale and shift
//! are frozen at their initial ``1`` and ``0``.

use crate::models::params::LearnableParams;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::{BatchNorm, BatchNormConfig};
use burn::prelude::{Backend, Tensor};

/// [`ScatteringNorm`] Config.
#[derive(Config, Debug)]
pub struct ScatteringNormConfig {
    /// Number of merged input channels.
    pub num_features: usize,

    /// Numerical stability term.
    #[config(default = 1e-5)]
    pub epsilon: f64,

    /// Whether the scale and shift are learned.
    #[config(default = true)]
    pub affine: bool,
}

impl ScatteringNormConfig {
    /// Config for ``in_channels`` coefficients per colour channel.
    pub fn for_coefficients(in_channels: usize) -> Self {
        Self::new(3 * in_channels)
    }

    /// Initialize a [`ScatteringNorm`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ScatteringNorm<B> {
        let norm = BatchNormConfig::new(self.num_features)
            .with_epsilon(self.epsilon)
            .init(device);

        ScatteringNorm {
            norm: if self.affine { norm } else { norm.no_grad() },
            affine: self.affine,
        }
    }
}

/// Batch norm over the merged scattering channel axis.
#[derive(Module, Debug)]
pub struct ScatteringNorm<B: Backend> {
    /// Inner norm.
    pub norm: BatchNorm<B, 2>,

    /// Whether the scale and shift are learned.
    pub affine: bool,
}

impl<B: Backend> ScatteringNorm<B> {
    /// Number of normalized channels.
    pub fn num_features(&self) -> usize {
        self.norm.gamma.dims()[0]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, num_features, height, width]``.
    ///
    /// # Returns
    ///
    /// A tensor of the same shape.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        unpack_shape_contract!(
            ["batch", "num_features", "height", "width"],
            &input,
            &["batch"],
            &[("num_features", self.num_features())]
        );

        self.norm.forward(input)
    }
}

impl<B: Backend> LearnableParams for ScatteringNorm<B> {
    fn count_learnable_params(&self) -> usize {
        if self.affine {
            self.norm.count_learnable_params()
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestAutodiffBackend, TestBackend, random_input};
    use hamcrest::prelude::*;

    #[test]
    fn test_config() {
        let config = ScatteringNormConfig::for_coefficients(81);
        assert_eq!(config.num_features, 243);
        assert_eq!(config.epsilon, 1e-5);
        assert!(config.affine);
    }

    #[test]
    fn test_affine_params() {
        let device = Default::default();
        let norm: ScatteringNorm<TestBackend> = ScatteringNormConfig::new(6).init(&device);
        assert_eq!(norm.num_features(), 6);
        assert_that!(norm.count_learnable_params(), is(equal_to(12)));

        let norm: ScatteringNorm<TestBackend> = ScatteringNormConfig::new(6)
            .with_affine(false)
            .init(&device);
        assert_that!(norm.count_learnable_params(), is(equal_to(0)));
    }

    #[test]
    fn test_non_affine_is_frozen() {
        let device = Default::default();
        let norm: ScatteringNorm<TestAutodiffBackend> = ScatteringNormConfig::new(4)
            .with_affine(false)
            .init(&device);
        assert!(!norm.norm.gamma.is_require_grad());
        assert!(!norm.norm.beta.is_require_grad());
    }

    #[test]
    fn test_forward_normalizes_channels() {
        let device = Default::default();
        let norm: ScatteringNorm<TestAutodiffBackend> = ScatteringNormConfig::new(3)
            .with_affine(false)
            .init(&device);

        let input = random_input([4, 3, 5, 5], &device) * 3.0 + 7.0;
        let output = norm.forward(input);
        assert_eq!(output.dims(), [4, 3, 5, 5]);

        let mean = output.mean().into_scalar();
        assert!(mean.abs() < 1e-3, "mean: {mean}");
    }

    #[test]
    #[should_panic]
    fn test_forward_channel_mismatch() {
        let device = Default::default();
        let norm: ScatteringNorm<TestBackend> = ScatteringNormConfig::new(3).init(&device);
        norm.forward(random_input([1, 4, 2, 2], &device));
    }
}
