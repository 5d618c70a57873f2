//! # Scattering CNN
//!
//! A residual CNN sized for scattering coefficients, after the
//! ``kymatio`` small-sample CIFAR model.
//!
//! Two input modes:
//! * scattering (default): the coefficients are normalized (non-affine)
//!   before the input conv, and the first residual stage is skipped;
//!   the scattering transform already performed the first downsampling.
//! * standard: the input conv is followed by a full ``16k`` residual stage.

use crate::layers::conv::conv3x3;
use crate::layers::conv_norm::{ConvNorm, ConvNormConfig};
use crate::layers::scattering_norm::{ScatteringNorm, ScatteringNormConfig};
use crate::models::cnn::basic_block::{BasicBlock, BasicBlockMeta, basic_stage};
use crate::models::params::LearnableParams;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::{Backend, Tensor};

/// Output resolution of the pooling head.
pub const POOL_RESOLUTION: usize = 2;

/// [`ScatteringCnn`] Config.
#[derive(Config, Debug)]
pub struct ScatteringCnnConfig {
    /// Coefficients per colour channel; the input has ``3 * in_channels`` channels.
    pub in_channels: usize,

    /// Width multiplier.
    #[config(default = 8)]
    pub k: usize,

    /// Blocks per residual stage.
    #[config(default = 4)]
    pub n: usize,

    /// Number of output classes.
    #[config(default = 10)]
    pub num_classes: usize,

    /// Standard (image) input mode.
    #[config(default = false)]
    pub standard: bool,
}

impl ScatteringCnnConfig {
    /// Merged input channels: ``3 * in_channels``.
    pub fn input_planes(&self) -> usize {
        3 * self.in_channels
    }

    /// Stage widths: ``[16k, 32k, 64k]``.
    pub fn stage_planes(&self) -> [usize; 3] {
        [16 * self.k, 32 * self.k, 64 * self.k]
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.in_channels == 0 {
            return Err("in_channels must be > 0".to_string());
        }
        if self.k == 0 {
            return Err("k must be > 0".to_string());
        }
        if self.n == 0 {
            return Err("n must be > 0".to_string());
        }
        if self.num_classes == 0 {
            return Err("num_classes must be > 0".to_string());
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a [`ScatteringCnn`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ScatteringCnn<B> {
        self.expect_valid();

        let input_planes = self.input_planes();
        let [planes1, planes2, planes3] = self.stage_planes();

        let init_norm = if self.standard {
            None
        } else {
            Some(
                ScatteringNormConfig::new(input_planes)
                    .with_affine(false)
                    .init(device),
            )
        };

        let layer1 = if self.standard {
            basic_stage(planes1, planes1, self.n, 1, device)
        } else {
            Vec::new()
        };

        ScatteringCnn {
            bn0: ScatteringNormConfig::new(input_planes).init(device),
            init_norm,
            init_conv: ConvNormConfig::from(conv3x3(input_planes, planes1, 1)).init(device),
            layer1,
            layer2: basic_stage(planes1, planes2, self.n, 1, device),
            layer3: basic_stage(planes2, planes3, self.n, 1, device),
            act: Relu::new(),
            avgpool: AdaptiveAvgPool2dConfig::new([POOL_RESOLUTION, POOL_RESOLUTION]).init(),
            fc: LinearConfig::new(planes3 * POOL_RESOLUTION * POOL_RESOLUTION, self.num_classes)
                .init(device),
            standard: self.standard,
        }
    }
}

/// CNN fitted for scattering input.
#[derive(Module, Debug)]
pub struct ScatteringCnn<B: Backend> {
    /// Affine input norm, always applied.
    pub bn0: ScatteringNorm<B>,

    /// Non-affine norm ahead of the input conv; scattering mode only.
    pub init_norm: Option<ScatteringNorm<B>>,

    /// Input conv/norm, followed by a `ReLU`.
    pub init_conv: ConvNorm<B>,

    /// ``16k`` stage; standard mode only.
    pub layer1: Vec<BasicBlock<B>>,

    /// ``32k`` stage.
    pub layer2: Vec<BasicBlock<B>>,

    /// ``64k`` stage.
    pub layer3: Vec<BasicBlock<B>>,

    /// Activation.
    pub act: Relu,

    /// Pooling head.
    pub avgpool: AdaptiveAvgPool2d,

    /// Classifier.
    pub fc: Linear<B>,

    /// Standard (image) input mode.
    pub standard: bool,
}

impl<B: Backend> ScatteringCnn<B> {
    /// Merged input channels.
    pub fn input_planes(&self) -> usize {
        self.bn0.num_features()
    }

    /// Channels entering the pooling head.
    pub fn out_planes(&self) -> usize {
        self.layer3
            .last()
            .map(|block| block.planes())
            .unwrap_or_default()
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3 * in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_classes]`` logits tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "in_planes", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("in_planes", self.input_planes())]
        );

        let x = self.bn0.forward(input);
        let x = match &self.init_norm {
            Some(norm) => norm.forward(x),
            None => x,
        };
        let x = self.act.forward(self.init_conv.forward(x));

        let x = self
            .layer1
            .iter()
            .chain(self.layer2.iter())
            .chain(self.layer3.iter())
            .fold(x, |x, block| block.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "height", "width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("height", height),
                ("width", width)
            ]
        );

        let x = self.avgpool.forward(x);
        let x = x.flatten::<2>(1, 3);

        self.fc.forward(x)
    }
}

impl<B: Backend> LearnableParams for ScatteringCnn<B> {
    fn count_learnable_params(&self) -> usize {
        self.bn0.count_learnable_params()
            + self.init_norm.count_learnable_params()
            + self.init_conv.count_learnable_params()
            + self.layer1.count_learnable_params()
            + self.layer2.count_learnable_params()
            + self.layer3.count_learnable_params()
            + self.fc.count_learnable_params()
    }
}
