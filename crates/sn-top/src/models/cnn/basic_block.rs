//! # Basic Block
//!
//! [`BasicBlock`] is the post-activation residual unit of the scattering CNN.
//!
//! [`BasicBlockMeta`] defines a common meta API for [`BasicBlock`]
//! and [`BasicBlockConfig`].
//!
//! [`BasicBlockConfig`] implements [`Config`], and provides
//! [`BasicBlockConfig::init`] to initialize a [`BasicBlock`].
//!
//! [`BasicBlock`] implements [`Module`], and provides
//! [`BasicBlock::forward`].

use crate::layers::conv::{conv1x1, conv3x3, strided_output_resolution};
use crate::layers::conv_norm::{ConvNorm, ConvNormConfig, ConvNormMeta};
use crate::models::params::LearnableParams;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::Relu;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BasicBlock`] Meta trait.
pub trait BasicBlockMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// The size of the out channels dimension.
    fn planes(&self) -> usize;

    /// The stride of the first convolution.
    ///
    /// Affects downsample behavior.
    fn stride(&self) -> usize;

    /// Does this block carry a downsample on the residual path?
    fn has_downsample(&self) -> bool {
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

/// [`BasicBlock`] Config.
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The size of the out channels dimension.
    pub planes: usize,

    /// The stride of the first convolution.
    #[config(default = 1)]
    pub stride: usize,
}

impl BasicBlockMeta for BasicBlockConfig {
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

impl BasicBlockConfig {
    /// Initialize a [`BasicBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        let downsample = if self.has_downsample() {
            Some(ConvNormConfig::from(conv1x1(self.in_planes, self.planes, self.stride)).init(device))
        } else {
            None
        };

        BasicBlock {
            conv_norm1: ConvNormConfig::from(conv3x3(self.in_planes, self.planes, self.stride))
                .init(device),
            conv_norm2: ConvNormConfig::from(conv3x3(self.planes, self.planes, 1)).init(device),
            downsample,
            act: Relu::new(),
        }
    }
}

/// Standard post-activation residual block.
///
/// ``relu(bn2(conv2(relu(bn1(conv1(x))))) + residual(x))``
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// First conv/norm.
    pub conv_norm1: ConvNorm<B>,

    /// Second conv/norm.
    pub conv_norm2: ConvNorm<B>,

    /// Optional downsample on the residual path.
    pub downsample: Option<ConvNorm<B>>,

    /// Activation.
    pub act: Relu,
}

impl<B: Backend> BasicBlockMeta for BasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.conv_norm1.in_channels()
    }

    fn planes(&self) -> usize {
        self.conv_norm2.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv_norm1.stride()[0]
    }

    fn has_downsample(&self) -> bool {
        self.downsample.is_some()
    }
}

impl<B: Backend> BasicBlock<B> {
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

        let residual = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv_norm1.forward(input);
        let x = self.act.forward(x);
        let x = self.conv_norm2.forward(x);

        let x = self.act.forward(x + residual);

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

impl<B: Backend> LearnableParams for BasicBlock<B> {
    fn count_learnable_params(&self) -> usize {
        self.conv_norm1.count_learnable_params()
            + self.conv_norm2.count_learnable_params()
            + self.downsample.count_learnable_params()
    }
}

/// Build a stage of ``num_blocks`` [`BasicBlock`]s.
///
/// Only the first block changes stride or channels.
pub fn basic_stage<B: Backend>(
    in_planes: usize,
    planes: usize,
    num_blocks: usize,
    stride: usize,
    device: &B::Device,
) -> Vec<BasicBlock<B>> {
    (0..num_blocks)
        .map(|idx| {
            if idx == 0 {
                BasicBlockConfig::new(in_planes, planes).with_stride(stride)
            } else {
                BasicBlockConfig::new(planes, planes)
            }
            .init(device)
        })
        .collect()
}
