//! # Top Model Factory
//!
//! [`TopModelConfig`] selects one of the top models by name, and
//! [`TopModel`] wraps the built module behind a single forward signature.

use crate::cache::disk::DiskCacheConfig;
use crate::models::cnn::{ScatteringCnn, ScatteringCnnConfig};
use crate::models::linear::{ScatteringLinear, ScatteringLinearConfig};
use crate::models::mlp::{ScatteringMlp, ScatteringMlpConfig};
use crate::models::params::LearnableParams;
use crate::models::resnet50::{PretrainedResNet50Config, ResNet50};
use crate::models::wide_resnet::{WideResNet, WideResNetConfig};
use anyhow::bail;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// Names accepted by [`TopModelConfig::by_name`].
pub const TOP_MODEL_NAMES: [&str; 5] = ["mlp", "linear", "cnn", "resnet50", "wrn16_8"];

/// ImageNet input resolution.
const RESNET50_RESOLUTION: usize = 224;

/// CIFAR input resolution.
const WIDE_RESNET_RESOLUTION: usize = 32;

/// Scattering coefficient resolution.
const SCATTERING_RESOLUTION: usize = 8;

/// [`TopModel`] Config.
#[derive(Config, Debug)]
pub enum TopModelConfig {
    /// [`ScatteringMlp`].
    Mlp(ScatteringMlpConfig),

    /// [`ScatteringLinear`].
    Linear(ScatteringLinearConfig),

    /// [`ScatteringCnn`].
    Cnn(ScatteringCnnConfig),

    /// [`ResNet50`], pretrained via [`TopModelConfig::try_init`].
    ResNet50(PretrainedResNet50Config),

    /// [`WideResNet`].
    WideResNet(WideResNetConfig),
}

impl TopModelConfig {
    /// Build a default config by name.
    ///
    /// # Arguments
    ///
    /// - `name`: one of [`TOP_MODEL_NAMES`].
    /// - `num_classes`: the number of output classes.
    /// - `in_channels`: scattering coefficients per colour channel; the
    ///   image models (`resnet50`, `wrn16_8`) take RGB and ignore it.
    pub fn by_name(
        name: &str,
        num_classes: usize,
        in_channels: usize,
    ) -> anyhow::Result<Self> {
        Ok(match name {
            "mlp" => Self::Mlp(
                ScatteringMlpConfig::new()
                    .with_num_classes(num_classes)
                    .with_n_coefficients(in_channels),
            ),
            "linear" => Self::Linear(
                ScatteringLinearConfig::new()
                    .with_num_classes(num_classes)
                    .with_n_coefficients(in_channels),
            ),
            "cnn" => Self::Cnn(ScatteringCnnConfig::new(in_channels).with_num_classes(num_classes)),
            "resnet50" => {
                Self::ResNet50(PretrainedResNet50Config::new().with_num_classes(num_classes))
            }
            "wrn16_8" => Self::WideResNet(WideResNetConfig::wrn16_8(num_classes)),
            _ => bail!("Unknown top model: {name}; known: {TOP_MODEL_NAMES:?}"),
        })
    }

    /// The model name, as accepted by [`TopModelConfig::by_name`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mlp(_) => "mlp",
            Self::Linear(_) => "linear",
            Self::Cnn(_) => "cnn",
            Self::ResNet50(_) => "resnet50",
            Self::WideResNet(_) => "wrn16_8",
        }
    }

    /// The number of output classes.
    pub fn num_classes(&self) -> usize {
        match self {
            Self::Mlp(config) => config.num_classes,
            Self::Linear(config) => config.num_classes,
            Self::Cnn(config) => config.num_classes,
            Self::ResNet50(config) => config.num_classes,
            Self::WideResNet(config) => config.num_classes,
        }
    }

    /// A ``[batch, channels, height, width]`` input shape the model accepts.
    pub fn input_shape(
        &self,
        batch: usize,
    ) -> [usize; 4] {
        match self {
            Self::Mlp(config) => [
                batch,
                config.in_channels(),
                config.m_coefficient,
                config.n_coefficient,
            ],
            Self::Linear(config) => [
                batch,
                3 * config.n_coefficients,
                config.m_coefficient,
                config.n_coefficient,
            ],
            Self::Cnn(config) => [
                batch,
                config.input_planes(),
                SCATTERING_RESOLUTION,
                SCATTERING_RESOLUTION,
            ],
            Self::ResNet50(_) => [batch, 3, RESNET50_RESOLUTION, RESNET50_RESOLUTION],
            Self::WideResNet(config) => [
                batch,
                config.in_channels,
                WIDE_RESNET_RESOLUTION,
                WIDE_RESNET_RESOLUTION,
            ],
        }
    }

    /// Initialize a randomly weighted [`TopModel`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> TopModel<B> {
        let model = match self {
            Self::Mlp(config) => TopModel::Mlp(config.init(device)),
            Self::Linear(config) => TopModel::Linear(config.init(device)),
            Self::Cnn(config) => TopModel::Cnn(config.init(device)),
            Self::ResNet50(config) => TopModel::ResNet50(config.init(device)),
            Self::WideResNet(config) => TopModel::WideResNet(config.init(device)),
        };
        self.log_init(&model);
        model
    }

    /// Initialize a [`TopModel`], loading pretrained weights where the
    /// model has them.
    ///
    /// # Errors
    ///
    /// See [`PretrainedResNet50Config::init_pretrained`].
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<TopModel<B>> {
        match self {
            Self::ResNet50(config) => {
                let model = TopModel::ResNet50(config.init_pretrained(device, disk_cache)?);
                self.log_init(&model);
                Ok(model)
            }
            _ => Ok(self.init(device)),
        }
    }

    fn log_init<B: Backend>(
        &self,
        model: &TopModel<B>,
    ) {
        tracing::info!(
            model = self.name(),
            num_classes = model.num_classes(),
            params = model.count_learnable_params(),
            "top model initialized"
        );
    }
}

/// A top model.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum TopModel<B: Backend> {
    /// [`ScatteringMlp`].
    Mlp(ScatteringMlp<B>),

    /// [`ScatteringLinear`].
    Linear(ScatteringLinear<B>),

    /// [`ScatteringCnn`].
    Cnn(ScatteringCnn<B>),

    /// [`ResNet50`].
    ResNet50(ResNet50<B>),

    /// [`WideResNet`].
    WideResNet(WideResNet<B>),
}

impl<B: Backend> TopModel<B> {
    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        match self {
            Self::Mlp(model) => model.num_classes(),
            Self::Linear(model) => model.num_classes(),
            Self::Cnn(model) => model.num_classes(),
            Self::ResNet50(model) => model.num_classes(),
            Self::WideResNet(model) => model.num_classes(),
        }
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``, shaped per model.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_classes]`` logits tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        match self {
            Self::Mlp(model) => model.forward(input),
            Self::Linear(model) => model.forward(input),
            Self::Cnn(model) => model.forward(input),
            Self::ResNet50(model) => model.forward(input),
            Self::WideResNet(model) => model.forward(input),
        }
    }
}

impl<B: Backend> LearnableParams for TopModel<B> {
    fn count_learnable_params(&self) -> usize {
        match self {
            Self::Mlp(model) => model.count_learnable_params(),
            Self::Linear(model) => model.count_learnable_params(),
            Self::Cnn(model) => model.count_learnable_params(),
            Self::ResNet50(model) => model.count_learnable_params(),
            Self::WideResNet(model) => model.count_learnable_params(),
        }
    }
}
