//! # Scattering Linear Classifier
//!
//! [`ScatteringLinear`] normalizes the scattering channels, flattens, and
//! applies a single [`Linear`] classifier.

use crate::layers::scattering_norm::{ScatteringNorm, ScatteringNormConfig};
use crate::models::params::LearnableParams;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

/// [`ScatteringLinear`] Config.
#[derive(Config, Debug)]
pub struct ScatteringLinearConfig {
    /// Number of output classes.
    #[config(default = 10)]
    pub num_classes: usize,

    /// Scattering coefficients per colour channel.
    #[config(default = 81)]
    pub n_coefficients: usize,

    /// Spatial height of the coefficients.
    #[config(default = 8)]
    pub m_coefficient: usize,

    /// Spatial width of the coefficients.
    #[config(default = 8)]
    pub n_coefficient: usize,
}

impl ScatteringLinearConfig {
    /// Flattened input width: ``3 * M * N * n_coefficients``.
    pub fn in_features(&self) -> usize {
        3 * self.m_coefficient * self.n_coefficient * self.n_coefficients
    }

    /// Check the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err(format!("num_classes must be > 0: {self:?}"));
        }
        if self.in_features() == 0 {
            return Err(format!("empty input features: {self:?}"));
        }
        Ok(())
    }

    /// Panic if the config is invalid.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a [`ScatteringLinear`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ScatteringLinear<B> {
        self.expect_valid();

        ScatteringLinear {
            norm: ScatteringNormConfig::for_coefficients(self.n_coefficients).init(device),
            fc: LinearConfig::new(self.in_features(), self.num_classes).init(device),
        }
    }
}

/// Linear layer fitted for scattering input.
#[derive(Module, Debug)]
pub struct ScatteringLinear<B: Backend> {
    /// Input norm.
    pub norm: ScatteringNorm<B>,

    /// Classifier.
    pub fc: Linear<B>,
}

impl<B: Backend> ScatteringLinear<B> {
    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3 * n_coefficients, M, N]``, where
    ///   ``3 * n_coefficients * M * N`` is the classifier input width.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_classes]`` logits tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let in_features = self.fc.weight.dims()[0];
        let [height, width] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &input,
            &["height", "width"],
            &[("channels", self.norm.num_features())]
        );
        assert_eq!(
            self.norm.num_features() * height * width,
            in_features,
            "input resolution {height}x{width} does not match classifier width {in_features}",
        );

        let x = self.norm.forward(input);
        let x = x.flatten::<2>(1, 3);
        self.fc.forward(x)
    }
}

impl<B: Backend> LearnableParams for ScatteringLinear<B> {
    fn count_learnable_params(&self) -> usize {
        self.norm.count_learnable_params() + self.fc.count_learnable_params()
    }
}
