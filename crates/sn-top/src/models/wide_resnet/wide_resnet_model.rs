//! # Wide-ResNet Model
//!
//! WRN-d-w from <https://arxiv.org/abs/1605.07146>: three stages of
//! ``(depth - 4) / 6`` [`WideBasicBlock`]s, of widths ``16w, 32w, 64w``.

use crate::layers::conv::{CONV_INTO_RELU_INITIALIZER, conv3x3};
use crate::models::params::LearnableParams;
use crate::models::wide_resnet::wide_block::{
    WideBasicBlock, WideBasicBlockConfig, WideBasicBlockMeta,
};
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, Relu};
use burn::prelude::{Backend, Tensor};

/// Stem output channels.
pub const WIDE_RESNET_STEM_PLANES: usize = 16;

/// [`WideResNet`] Config.
#[derive(Config, Debug)]
pub struct WideResNetConfig {
    /// Network depth; ``depth = 6 * blocks_per_stage + 4``.
    pub depth: usize,

    /// Width multiplier.
    pub width: usize,

    /// Number of output classes.
    #[config(default = 10)]
    pub num_classes: usize,

    /// Dropout probability inside each block.
    #[config(default = 0.3)]
    pub dropout: f64,

    /// Input image channels.
    #[config(default = 3)]
    pub in_channels: usize,
}

impl WideResNetConfig {
    /// The WRN-16-8 configuration.
    pub fn wrn16_8(num_classes: usize) -> Self {
        Self::new(16, 8).with_num_classes(num_classes)
    }

    /// Blocks per stage: ``(depth - 4) / 6``.
    pub fn blocks_per_stage(&self) -> usize {
        self.depth.saturating_sub(4) / 6
    }

    /// Stage widths: ``[16w, 32w, 64w]``.
    pub fn stage_planes(&self) -> [usize; 3] {
        [16 * self.width, 32 * self.width, 64 * self.width]
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.depth < 10 || (self.depth - 4) % 6 != 0 {
            return Err(format!(
                "depth ({}) must be 6 * n + 4 for some n >= 1",
                self.depth
            ));
        }
        if self.width == 0 {
            return Err("width must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(format!("dropout ({}) must be in [0, 1)", self.dropout));
        }
        if self.num_classes == 0 || self.in_channels == 0 {
            return Err(format!("empty classes or channels: {self:?}"));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    fn stage_configs(
        &self,
        in_planes: usize,
        planes: usize,
        stride: usize,
    ) -> Vec<WideBasicBlockConfig> {
        (0..self.blocks_per_stage())
            .map(|idx| {
                let (in_planes, stride) = if idx == 0 {
                    (in_planes, stride)
                } else {
                    (planes, 1)
                };
                WideBasicBlockConfig::new(in_planes, planes)
                    .with_dropout(self.dropout)
                    .with_stride(stride)
            })
            .collect()
    }

    /// Initialize a [`WideResNet`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> WideResNet<B> {
        self.expect_valid();

        let [planes1, planes2, planes3] = self.stage_planes();

        let init_stage = |configs: Vec<WideBasicBlockConfig>| -> Vec<WideBasicBlock<B>> {
            configs.iter().map(|c| c.init(device)).collect()
        };

        WideResNet {
            conv: conv3x3(self.in_channels, WIDE_RESNET_STEM_PLANES, 1)
                .with_initializer(CONV_INTO_RELU_INITIALIZER.clone())
                .init(device),
            layer1: init_stage(self.stage_configs(WIDE_RESNET_STEM_PLANES, planes1, 1)),
            layer2: init_stage(self.stage_configs(planes1, planes2, 2)),
            layer3: init_stage(self.stage_configs(planes2, planes3, 2)),
            bn: BatchNormConfig::new(planes3).init(device),
            act: Relu::new(),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(planes3, self.num_classes).init(device),
        }
    }
}

/// Wide-ResNet.
#[derive(Module, Debug)]
pub struct WideResNet<B: Backend> {
    /// Stem conv.
    pub conv: Conv2d<B>,

    /// ``16w`` stage, stride 1.
    pub layer1: Vec<WideBasicBlock<B>>,

    /// ``32w`` stage, stride 2.
    pub layer2: Vec<WideBasicBlock<B>>,

    /// ``64w`` stage, stride 2.
    pub layer3: Vec<WideBasicBlock<B>>,

    /// Final norm.
    pub bn: BatchNorm<B, 2>,

    /// Activation.
    pub act: Relu,

    /// Pooling head.
    pub avgpool: AdaptiveAvgPool2d,

    /// Classifier.
    pub fc: Linear<B>,
}

impl<B: Backend> WideResNet<B> {
    /// Input image channels.
    pub fn in_channels(&self) -> usize {
        self.conv.weight.dims()[1]
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    /// Blocks per stage.
    pub fn blocks_per_stage(&self) -> usize {
        self.layer1.len()
    }

    /// Total downsampling factor of the three stages.
    pub fn stride(&self) -> usize {
        self.layer1
            .iter()
            .chain(self.layer2.iter())
            .chain(self.layer3.iter())
            .map(|block| block.stride())
            .product()
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``; each strided stage
    ///   maps ``size -> ceil(size / 2)``.
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

        let x = self.conv.forward(input);

        let x = self
            .layer1
            .iter()
            .chain(self.layer2.iter())
            .chain(self.layer3.iter())
            .fold(x, |x, block| block.forward(x));

        let x = self.act.forward(self.bn.forward(x));
        let x = self.avgpool.forward(x);
        let x = x.flatten::<2>(1, 3);

        self.fc.forward(x)
    }
}

impl<B: Backend> LearnableParams for WideResNet<B> {
    fn count_learnable_params(&self) -> usize {
        self.conv.count_learnable_params()
            + self.layer1.count_learnable_params()
            + self.layer2.count_learnable_params()
            + self.layer3.count_learnable_params()
            + self.bn.count_learnable_params()
            + self.fc.count_learnable_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        TestAutodiffBackend, TestBackend, expect_finite, expect_kaiming_fan_out, random_input,
    };
    use bimm_contracts::assert_shape_contract;
    use hamcrest::prelude::*;

    #[test]
    fn test_wrn16_8_config() {
        let config = WideResNetConfig::wrn16_8(100);
        assert_eq!(config.depth, 16);
        assert_eq!(config.width, 8);
        assert_eq!(config.num_classes, 100);
        assert_eq!(config.dropout, 0.3);
        assert_eq!(config.blocks_per_stage(), 2);
        assert_eq!(config.stage_planes(), [128, 256, 512]);
        config.expect_valid();
    }

    #[test]
    fn test_validation() {
        assert_that!(WideResNetConfig::new(16, 1).try_validate(), is(equal_to(Ok(()))));
        assert!(WideResNetConfig::new(15, 1).try_validate().is_err());
        assert!(WideResNetConfig::new(4, 1).try_validate().is_err());
        assert!(WideResNetConfig::new(16, 0).try_validate().is_err());
        assert!(
            WideResNetConfig::new(16, 1)
                .with_dropout(1.0)
                .try_validate()
                .is_err()
        );
    }

    #[test]
    #[should_panic(expected = "must be 6 * n + 4")]
    fn test_init_invalid_depth() {
        let device = Default::default();
        let _model: WideResNet<TestBackend> = WideResNetConfig::new(12, 1).init(&device);
    }

    #[test]
    fn test_structure() {
        let device = Default::default();
        let model: WideResNet<TestBackend> = WideResNetConfig::new(16, 2).init(&device);

        assert_eq!(model.blocks_per_stage(), 2);
        assert_eq!(model.stride(), 4);
        assert_eq!(model.in_channels(), 3);
        assert_eq!(model.num_classes(), 10);

        // With width > 1, the first block of every stage changes width.
        assert!(model.layer1[0].has_shortcut_conv());
        assert!(!model.layer1[1].has_shortcut_conv());
        assert!(model.layer2[0].has_shortcut_conv());
        assert_eq!(model.layer2[0].stride(), 2);
        assert_eq!(model.layer3[1].planes(), 128);
    }

    #[test]
    fn test_conv_initializer() {
        let device = Default::default();
        let model: WideResNet<TestBackend> = WideResNetConfig::new(10, 4).init(&device);

        expect_kaiming_fan_out(&model.conv, 0.15);
        for block in model.layer1.iter().chain(&model.layer2).chain(&model.layer3) {
            expect_kaiming_fan_out(&block.conv1, 0.1);
            expect_kaiming_fan_out(&block.conv2, 0.1);
        }
    }

    #[test]
    fn test_width_one_stem_stage() {
        let device = Default::default();
        let model: WideResNet<TestBackend> = WideResNetConfig::new(16, 1).init(&device);

        // ``16 * 1`` matches the stem width: stage 1 needs no projection.
        assert!(!model.layer1[0].has_shortcut_conv());
        assert!(model.layer2[0].has_shortcut_conv());
        assert!(model.layer3[0].has_shortcut_conv());
    }

    #[test]
    fn test_wrn16_8_param_count() {
        let device = Default::default();
        let model: WideResNet<TestBackend> = WideResNetConfig::wrn16_8(10).init(&device);

        let conv3 = |i: usize, o: usize| i * o * 9;
        let bn = |c: usize| 2 * c;
        let block = |i: usize, o: usize| {
            let shortcut = if i != o { i * o } else { 0 };
            bn(i) + conv3(i, o) + bn(o) + conv3(o, o) + shortcut
        };
        let (w1, w2, w3) = (128, 256, 512);
        let expected = conv3(3, 16)
            + block(16, w1)
            + block(w1, w1)
            + block(w1, w2)
            + block(w2, w2)
            + block(w2, w3)
            + block(w3, w3)
            + bn(w3)
            + (w3 * 10 + 10);

        assert_eq!(model.count_learnable_params(), expected);
        // Published WRN-16-8 size: ~11.0M.
        assert_eq!(expected / 100_000, 109);
    }

    #[test]
    fn test_forward_autodiff() {
        type B = TestAutodiffBackend;
        let device = Default::default();

        let model: WideResNet<B> = WideResNetConfig::new(10, 1)
            .with_num_classes(7)
            .init(&device);

        let output = model.forward(random_input([2, 3, 8, 8], &device));
        assert_shape_contract!(
            ["batch", "num_classes"],
            &output,
            &[("batch", 2), ("num_classes", 7)],
        );
        expect_finite(output);
    }

    #[test]
    fn test_forward_odd_resolution() {
        let device = Default::default();
        let model: WideResNet<TestBackend> = WideResNetConfig::new(10, 1)
            .with_num_classes(4)
            .init(&device);

        // 6 -> 3 -> 2, and 7 -> 4 -> 2.
        assert_eq!(model.forward(random_input([1, 3, 6, 6], &device)).dims(), [1, 4]);
        assert_eq!(model.forward(random_input([1, 3, 7, 5], &device)).dims(), [1, 4]);
    }

    #[test]
    #[should_panic]
    fn test_forward_wrong_channels() {
        let device = Default::default();
        let model: WideResNet<TestBackend> = WideResNetConfig::new(10, 1).init(&device);
        model.forward(random_input([1, 4, 8, 8], &device));
    }
}
