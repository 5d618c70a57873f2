//! # Wide-ResNet Basic Block
//!
//! [`WideBasicBlock`] is the pre-activation residual unit of the
//! Wide-ResNet family.
//!
//! ```text
//! a = relu(bn1(x))
//! shortcut = conv1x1(a) if downsampling else x
//! out = conv2(dropout(relu(bn2(conv1(a))))) + shortcut
//! ```

use crate::layers::conv::{
    CONV_INTO_RELU_INITIALIZER, conv1x1, conv3x3, strided_output_resolution,
};
use crate::models::params::LearnableParams;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::Conv2d;
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Relu};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`WideBasicBlock`] Meta trait.
pub trait WideBasicBlockMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// The size of the out channels dimension.
    fn planes(&self) -> usize;

    /// The stride of the first convolution.
    fn stride(&self) -> usize;

    /// Does this block project the shortcut with a 1x1 conv?
    fn has_shortcut_conv(&self) -> bool {
        self.stride() != 1 || self.in_planes() != self.planes()
    }

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        strided_output_resolution(input_resolution, self.stride())
    }
}

/// [`WideBasicBlock`] Config.
#[derive(Config, Debug)]
pub struct WideBasicBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The size of the out channels dimension.
    pub planes: usize,

    /// Dropout probability between the convolutions.
    #[config(default = 0.3)]
    pub dropout: f64,

    /// The stride of the first convolution.
    #[config(default = 1)]
    pub stride: usize,
}

impl WideBasicBlockMeta for WideBasicBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl WideBasicBlockConfig {
    /// Initialize a [`WideBasicBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> WideBasicBlock<B> {
        let initializer = CONV_INTO_RELU_INITIALIZER.clone();

        let shortcut = if self.has_shortcut_conv() {
            Some(
                conv1x1(self.in_planes, self.planes, self.stride)
                    .with_initializer(initializer.clone())
                    .init(device),
            )
        } else {
            None
        };

        WideBasicBlock {
            bn1: BatchNormConfig::new(self.in_planes).init(device),
            conv1: conv3x3(self.in_planes, self.planes, self.stride)
                .with_initializer(initializer.clone())
                .init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            bn2: BatchNormConfig::new(self.planes).init(device),
            conv2: conv3x3(self.planes, self.planes, 1)
                .with_initializer(initializer)
                .init(device),
            shortcut,
            act: Relu::new(),
        }
    }
}

/// Pre-activation Wide-ResNet block.
#[derive(Module, Debug)]
pub struct WideBasicBlock<B: Backend> {
    /// Input norm.
    pub bn1: BatchNorm<B, 2>,

    /// First 3x3 conv; carries the stride.
    pub conv1: Conv2d<B>,

    /// Dropout between the convolutions.
    pub dropout: Dropout,

    /// Mid norm.
    pub bn2: BatchNorm<B, 2>,

    /// Second 3x3 conv.
    pub conv2: Conv2d<B>,

    /// Optional 1x1 shortcut projection.
    pub shortcut: Option<Conv2d<B>>,

    /// Activation.
    pub act: Relu,
}

impl<B: Backend> WideBasicBlockMeta for WideBasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.conv1.weight.dims()[1]
    }

    fn planes(&self) -> usize {
        self.conv2.weight.dims()[0]
    }

    fn stride(&self) -> usize {
        self.conv1.stride[0]
    }

    fn has_shortcut_conv(&self) -> bool {
        self.shortcut.is_some()
    }
}

impl<B: Backend> WideBasicBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, planes, out_height, out_width]`` tensor, where
    ///   ``out = ceil(in / stride)``.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_planes", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_planes", self.in_planes())],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let activated = self.act.forward(self.bn1.forward(input.clone()));

        let shortcut = match &self.shortcut {
            Some(conv) => conv.forward(activated.clone()),
            None => input,
        };

        let x = self.conv1.forward(activated);
        let x = self.act.forward(self.bn2.forward(x));
        let x = self.dropout.forward(x);
        let x = self.conv2.forward(x);

        let x = x + shortcut;

        assert_shape_contract_periodically!(
            ["batch", "planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("planes", self.planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}

impl<B: Backend> LearnableParams for WideBasicBlock<B> {
    fn count_learnable_params(&self) -> usize {
        self.bn1.count_learnable_params()
            + self.conv1.count_learnable_params()
            + self.bn2.count_learnable_params()
            + self.conv2.count_learnable_params()
            + self.shortcut.count_learnable_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestAutodiffBackend, TestBackend, expect_kaiming_fan_out, random_input};
    use bimm_contracts::assert_shape_contract;

    #[test]
    fn test_config() {
        let config = WideBasicBlockConfig::new(16, 128);
        assert_eq!(config.dropout, 0.3);
        assert_eq!(config.stride(), 1);
        assert!(config.has_shortcut_conv());

        let config = WideBasicBlockConfig::new(128, 128);
        assert!(!config.has_shortcut_conv());
        assert!(config.with_stride(2).has_shortcut_conv());
    }

    #[test]
    fn test_meta_and_params() {
        let device = Default::default();
        let block: WideBasicBlock<TestBackend> = WideBasicBlockConfig::new(2, 4)
            .with_stride(2)
            .init(&device);

        assert_eq!(block.in_planes(), 2);
        assert_eq!(block.planes(), 4);
        assert_eq!(block.stride(), 2);
        assert!(block.has_shortcut_conv());
        assert_eq!(block.output_resolution([8, 8]), [4, 4]);

        // bn1(2), conv 2->4, bn2(4), conv 4->4, shortcut 1x1 2->4; no conv bias.
        let expected = 4 + 2 * 4 * 9 + 8 + 4 * 4 * 9 + 2 * 4;
        assert_eq!(block.count_learnable_params(), expected);
        assert!(block.conv1.bias.is_none());
    }

    #[test]
    fn test_forward_identity_shortcut() {
        let device = Default::default();
        let block: WideBasicBlock<TestAutodiffBackend> =
            WideBasicBlockConfig::new(4, 4).init(&device);

        let output = block.forward(random_input([2, 4, 6, 6], &device));
        assert_shape_contract!(
            ["batch", "planes", "height", "width"],
            &output,
            &[("batch", 2), ("planes", 4), ("height", 6), ("width", 6)],
        );
    }

    #[test]
    fn test_forward_projected_shortcut() {
        let device = Default::default();
        let block: WideBasicBlock<TestAutodiffBackend> = WideBasicBlockConfig::new(3, 8)
            .with_stride(2)
            .with_dropout(0.0)
            .init(&device);

        let output = block.forward(random_input([2, 3, 8, 8], &device));
        assert_shape_contract!(
            ["batch", "planes", "height", "width"],
            &output,
            &[("batch", 2), ("planes", 8), ("height", 4), ("width", 4)],
        );
    }

    #[test]
    fn test_conv_initializer() {
        let device = Default::default();
        let block: WideBasicBlock<TestBackend> = WideBasicBlockConfig::new(16, 64)
            .with_stride(2)
            .init(&device);

        // fan-out, not fan-in: conv1 fan_in is 16 * 9, fan_out is 64 * 9.
        expect_kaiming_fan_out(&block.conv1, 0.05);
        expect_kaiming_fan_out(&block.conv2, 0.05);
        expect_kaiming_fan_out(block.shortcut.as_ref().unwrap(), 0.1);
    }
}
