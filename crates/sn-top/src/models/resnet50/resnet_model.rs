//! # `ResNet` Core Model
//!
//! The torchvision bottleneck `ResNet` topology; ``[3, 4, 6, 3]`` blocks is
//! `ResNet-50`.

use crate::layers::conv::CONV_INTO_RELU_INITIALIZER;
use crate::layers::conv_norm::{ConvNorm, ConvNormConfig};
use crate::models::params::LearnableParams;
use crate::models::resnet50::bottleneck::{
    BOTTLENECK_EXPANSION, BottleneckBlock, BottleneckBlockConfig, BottleneckBlockMeta,
};
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};

/// `ResNet-50` stage depths.
pub const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];

/// Stage inner widths.
pub const RESNET_STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];

/// Stem output channels.
pub const RESNET_STEM_PLANES: usize = 64;

/// [`ResNet`] Config.
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Blocks per stage.
    #[config(default = "RESNET50_BLOCKS")]
    pub blocks: [usize; 4],

    /// Number of output classes.
    #[config(default = 1000)]
    pub num_classes: usize,

    /// Input image channels.
    #[config(default = 3)]
    pub in_channels: usize,
}

impl ResNetConfig {
    /// The `ResNet-50` config.
    pub fn resnet50(num_classes: usize) -> Self {
        Self::new().with_num_classes(num_classes)
    }

    /// Width of the pooled features: ``512 * 4``.
    pub fn num_features(&self) -> usize {
        RESNET_STAGE_PLANES[3] * BOTTLENECK_EXPANSION
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if let Some(idx) = self.blocks.iter().position(|&b| b == 0) {
            return Err(format!("blocks[{idx}] is 0: {:?}", self.blocks));
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

    /// Initialize a [`ResNet`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNet<B> {
        self.expect_valid();

        // 7x7 conv, 64, /2
        let stem: ConvNormConfig =
            Conv2dConfig::new([self.in_channels, RESNET_STEM_PLANES], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false)
                .with_initializer(CONV_INTO_RELU_INITIALIZER.clone())
                .into();

        // 3x3 maxpool, /2
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1));

        let [planes1, planes2, planes3, planes4] = RESNET_STAGE_PLANES;
        let [blocks1, blocks2, blocks3, blocks4] = self.blocks;

        let init_stage = |in_planes: usize, planes: usize, num_blocks: usize, stride: usize| {
            (0..num_blocks)
                .map(|idx| {
                    let config = if idx == 0 {
                        BottleneckBlockConfig::new(in_planes, planes).with_stride(stride)
                    } else {
                        BottleneckBlockConfig::new(planes * BOTTLENECK_EXPANSION, planes)
                    };
                    config.init(device)
                })
                .collect::<Vec<BottleneckBlock<B>>>()
        };

        let layer1 = init_stage(RESNET_STEM_PLANES, planes1, blocks1, 1);
        let layer2 = init_stage(planes1 * BOTTLENECK_EXPANSION, planes2, blocks2, 2);
        let layer3 = init_stage(planes2 * BOTTLENECK_EXPANSION, planes3, blocks3, 2);
        let layer4 = init_stage(planes3 * BOTTLENECK_EXPANSION, planes4, blocks4, 2);

        ResNet {
            conv_norm: stem.init(device),
            act: Relu::new(),
            maxpool: maxpool.init(),
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(self.num_features(), self.num_classes).init(device),
        }
    }
}

/// `ResNet` model.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    /// Stem conv/norm.
    pub conv_norm: ConvNorm<B>,

    /// Activation.
    pub act: Relu,

    /// Stem pool.
    pub maxpool: MaxPool2d,

    /// Stage 1, stride 1.
    pub layer1: Vec<BottleneckBlock<B>>,

    /// Stage 2, stride 2.
    pub layer2: Vec<BottleneckBlock<B>>,

    /// Stage 3, stride 2.
    pub layer3: Vec<BottleneckBlock<B>>,

    /// Stage 4, stride 2.
    pub layer4: Vec<BottleneckBlock<B>>,

    /// Pooling head.
    pub avgpool: AdaptiveAvgPool2d,

    /// Classifier.
    pub fc: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    /// Input image channels.
    pub fn in_channels(&self) -> usize {
        self.conv_norm.conv.weight.dims()[1]
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    /// Blocks per stage.
    pub fn blocks(&self) -> [usize; 4] {
        [
            self.layer1.len(),
            self.layer2.len(),
            self.layer3.len(),
            self.layer4.len(),
        ]
    }

    /// Iterate all blocks, in forward order.
    pub fn iter_blocks(&self) -> impl Iterator<Item = &BottleneckBlock<B>> {
        self.layer1
            .iter()
            .chain(self.layer2.iter())
            .chain(self.layer3.iter())
            .chain(self.layer4.iter())
    }

    /// Replace the classifier with a fresh ``Linear(features, num_classes)``.
    pub fn with_classes(
        self,
        num_classes: usize,
    ) -> Self {
        let [d_input, _] = self.fc.weight.dims();
        let fc = LinearConfig::new(d_input, num_classes).init(&self.fc.weight.device());
        Self { fc, ..self }
    }

    /// `ResNet` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``; the stem and each
    ///   strided stage map ``size -> ceil(size / 2)``.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_classes]`` logits tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        // Prep block
        let x = self.conv_norm.forward(input);
        let x = self.act.forward(x);
        let x = self.maxpool.forward(x);

        // Residual blocks
        let x = self.iter_blocks().fold(x, |x, block| block.forward(x));

        // Head
        let x = self.avgpool.forward(x);
        // Reshape [B, C, 1, 1] -> [B, C]
        let x = x.flatten::<2>(1, 3);

        self.fc.forward(x)
    }
}

impl<B: Backend> LearnableParams for ResNet<B> {
    fn count_learnable_params(&self) -> usize {
        self.conv_norm.count_learnable_params()
            + self
                .iter_blocks()
                .map(|block| block.count_learnable_params())
                .sum::<usize>()
            + self.fc.count_learnable_params()
    }
}
