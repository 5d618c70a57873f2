//! # Scattering MLP
//!
//! [`ScatteringMlp`] is a multilayer perceptron over flattened scattering
//! coefficients.
//!
//! [`ScatteringMlpConfig`] implements [`Config`], and provides
//! [`ScatteringMlpConfig::init`] to initialize a [`ScatteringMlp`].

use crate::layers::scattering_norm::{ScatteringNorm, ScatteringNormConfig};
use crate::models::params::LearnableParams;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::{Backend, Tensor};

/// [`ScatteringMlp`] Config.
#[derive(Config, Debug)]
pub struct ScatteringMlpConfig {
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

    /// Hidden layer widths.
    #[config(default = "vec![512, 256, 128, 64]")]
    pub hidden: Vec<usize>,
}

impl ScatteringMlpConfig {
    /// Number of merged input channels: ``3 * n_coefficients``.
    pub fn in_channels(&self) -> usize {
        3 * self.n_coefficients
    }

    /// Flattened input width: ``3 * M * N * n_coefficients``.
    pub fn in_features(&self) -> usize {
        self.in_channels() * self.m_coefficient * self.n_coefficient
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be > 0".to_string());
        }
        if self.in_features() == 0 {
            return Err(format!("empty input features: {self:?}"));
        }
        if let Some(idx) = self.hidden.iter().position(|&w| w == 0) {
            return Err(format!("hidden[{idx}] is 0"));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a [`ScatteringMlp`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ScatteringMlp<B> {
        self.expect_valid();

        let mut widths = vec![self.in_features()];
        widths.extend(self.hidden.iter().copied());

        let hidden = widths
            .windows(2)
            .map(|w| LinearConfig::new(w[0], w[1]).init(device))
            .collect();

        let last = *widths.last().unwrap_or(&self.in_features());

        ScatteringMlp {
            norm: ScatteringNormConfig::for_coefficients(self.n_coefficients).init(device),
            hidden,
            act: Relu::new(),
            fc: LinearConfig::new(last, self.num_classes).init(device),
            height: self.m_coefficient,
            width: self.n_coefficient,
        }
    }
}

/// Multilayer perceptron fitted for scattering input.
#[derive(Module, Debug)]
pub struct ScatteringMlp<B: Backend> {
    /// Input norm.
    pub norm: ScatteringNorm<B>,

    /// Hidden ``Linear`` layers, each followed by a `ReLU`.
    pub hidden: Vec<Linear<B>>,

    /// Activation.
    pub act: Relu,

    /// Output classifier.
    pub fc: Linear<B>,

    /// Expected input height, ``M``.
    pub height: usize,

    /// Expected input width, ``N``.
    pub width: usize,
}

impl<B: Backend> ScatteringMlp<B> {
    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3 * n_coefficients, M, N]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_classes]`` logits tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &input,
            &["batch"],
            &[
                ("channels", self.norm.num_features()),
                ("height", self.height),
                ("width", self.width),
            ]
        );

        let x = self.norm.forward(input);
        let mut x = x.flatten::<2>(1, 3);
        for layer in &self.hidden {
            x = self.act.forward(layer.forward(x));
        }
        let x = self.fc.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes())]
        );

        x
    }
}

impl<B: Backend> LearnableParams for ScatteringMlp<B> {
    fn count_learnable_params(&self) -> usize {
        self.norm.count_learnable_params()
            + self.hidden.count_learnable_params()
            + self.fc.count_learnable_params()
    }
}
