//! # Bottleneck Block for `ResNet`
//!
//! [`BottleneckBlock`] is the ``1x1 -> 3x3 -> 1x1`` residual unit of the deep
//! `ResNet`s; the stride sits on the 3x3 conv (torchvision "v1.5").
//!
//! [`BottleneckBlockConfig`] implements [`Config`], and provides
//! [`BottleneckBlockConfig::init`] to initialize a [`BottleneckBlock`].

use crate::layers::conv::{
    CONV_INTO_RELU_INITIALIZER, conv1x1, conv3x3, strided_output_resolution,
};
use crate::layers::conv_norm::{ConvNorm, ConvNormConfig, ConvNormMeta};
use crate::models::params::LearnableParams;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::Relu;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::{Backend, Config, Module, Tensor};

/// Output expansion of a bottleneck block.
pub const BOTTLENECK_EXPANSION: usize = 4;

/// [`BottleneckBlock`] Meta trait.
pub trait BottleneckBlockMeta {
    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The inner width of the block.
    fn planes(&self) -> usize;

    /// The stride of the 3x3 convolution.
    fn stride(&self) -> usize;

    /// The number of output feature planes.
    ///
    /// ``out_planes = planes * 4``
    fn out_planes(&self) -> usize {
        self.planes() * BOTTLENECK_EXPANSION
    }

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        strided_output_resolution(input_resolution, self.stride())
    }
}

/// [`BottleneckBlock`] Config.
#[derive(Config, Debug)]
pub struct BottleneckBlockConfig {
    /// The number of input feature planes.
    pub in_planes: usize,

    /// The inner width of the block.
    pub planes: usize,

    /// The stride of the 3x3 convolution.
    #[config(default = 1)]
    pub stride: usize,
}

impl BottleneckBlockMeta for BottleneckBlockConfig {
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

impl BottleneckBlockConfig {
    /// Initialize a [`BottleneckBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BottleneckBlock<B> {
        let in_planes = self.in_planes();
        let planes = self.planes();
        let out_planes = self.out_planes();
        let stride = self.stride();

        let conv_norm = |conv: Conv2dConfig| -> ConvNorm<B> {
            ConvNormConfig::from(conv.with_initializer(CONV_INTO_RELU_INITIALIZER.clone()))
                .init(device)
        };

        let downsample = if stride != 1 || in_planes != out_planes {
            Some(conv_norm(conv1x1(in_planes, out_planes, stride)))
        } else {
            None
        };

        BottleneckBlock {
            conv_norm1: conv_norm(conv1x1(in_planes, planes, 1)),
            conv_norm2: conv_norm(conv3x3(planes, planes, stride)),
            conv_norm3: conv_norm(conv1x1(planes, out_planes, 1)),
            downsample,
            act: Relu::new(),
        }
    }
}

/// Bottleneck residual block.
#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    /// 1x1 reduction.
    pub conv_norm1: ConvNorm<B>,

    /// 3x3 strided conv.
    pub conv_norm2: ConvNorm<B>,

    /// 1x1 expansion.
    pub conv_norm3: ConvNorm<B>,

    /// Optional downsample on the residual path.
    pub downsample: Option<ConvNorm<B>>,

    /// Activation.
    pub act: Relu,
}

impl<B: Backend> BottleneckBlockMeta for BottleneckBlock<B> {
    fn in_planes(&self) -> usize {
        self.conv_norm1.in_channels()
    }

    fn planes(&self) -> usize {
        self.conv_norm1.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv_norm2.stride()[0]
    }

    fn out_planes(&self) -> usize {
        self.conv_norm3.out_channels()
    }
}

impl<B: Backend> BottleneckBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor, where
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

        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.act.forward(self.conv_norm1.forward(input));
        let x = self.act.forward(self.conv_norm2.forward(x));
        let x = self.conv_norm3.forward(x);

        let x = self.act.forward(x + identity);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}

impl<B: Backend> LearnableParams for BottleneckBlock<B> {
    fn count_learnable_params(&self) -> usize {
        self.conv_norm1.count_learnable_params()
            + self.conv_norm2.count_learnable_params()
            + self.conv_norm3.count_learnable_params()
            + self.downsample.count_learnable_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestAutodiffBackend, TestBackend, random_input};
    use bimm_contracts::assert_shape_contract;

    #[test]
    fn test_config() {
        let config = BottleneckBlockConfig::new(64, 64);
        assert_eq!(config.out_planes(), 256);
        assert_eq!(config.stride(), 1);

        let config = config.with_stride(2);
        assert_eq!(config.output_resolution([56, 56]), [28, 28]);
    }

    #[test]
    fn test_meta() {
        let device = Default::default();
        let block: BottleneckBlock<TestBackend> = BottleneckBlockConfig::new(8, 2).init(&device);

        assert_eq!(block.in_planes(), 8);
        assert_eq!(block.planes(), 2);
        assert_eq!(block.out_planes(), 8);
        assert_eq!(block.stride(), 1);
        assert!(block.downsample.is_none());

        let block: BottleneckBlock<TestBackend> = BottleneckBlockConfig::new(4, 2).init(&device);
        assert!(block.downsample.is_some());
    }

    #[test]
    fn test_forward_autodiff() {
        type B = TestAutodiffBackend;
        let device = Default::default();

        let block: BottleneckBlock<B> = BottleneckBlockConfig::new(4, 2)
            .with_stride(2)
            .init(&device);

        let output = block.forward(random_input([2, 4, 8, 8], &device));
        assert_shape_contract!(
            ["batch", "out_planes", "height", "width"],
            &output,
            &[
                ("batch", 2),
                ("out_planes", 8),
                ("height", 4),
                ("width", 4)
            ],
        );
    }
}
