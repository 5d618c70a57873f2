//! # `ConvNorm` Module
//!
//! A [`ConvNorm`] module is a [`Conv2d`] layer followed by a [`BatchNorm`] layer.

use crate::models::params::LearnableParams;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig};
use burn::prelude::{Backend, Tensor};

/// [`ConvNorm`] Meta.
pub trait ConvNormMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Get the stride.
    fn stride(&self) -> [usize; 2];
}

/// [`ConvNorm`] Config.
#[derive(Config, Debug)]
pub struct ConvNormConfig {
    /// The [`Conv2d`] config.
    pub conv: Conv2dConfig,
}

impl ConvNormMeta for ConvNormConfig {
    fn in_channels(&self) -> usize {
        self.conv.channels[0]
    }

    fn out_channels(&self) -> usize {
        self.conv.channels[1]
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }
}

impl From<Conv2dConfig> for ConvNormConfig {
    fn from(conv: Conv2dConfig) -> Self {
        Self { conv }
    }
}

impl ConvNormConfig {
    /// Initialize a [`ConvNorm`].
    ///
    /// The norm layer is sized to the conv output channels.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ConvNorm<B> {
        ConvNorm {
            conv: self.conv.init(device),
            norm: BatchNormConfig::new(self.conv.channels[1]).init(device),
        }
    }
}

/// Sequenced [`Conv2d`] and [`BatchNorm`] layer.
#[derive(Module, Debug)]
pub struct ConvNorm<B: Backend> {
    /// Internal Conv2d layer.
    pub conv: Conv2d<B>,

    /// Internal Norm Layer.
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvNormMeta for ConvNorm<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }
}

impl<B: Backend> ConvNorm<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.conv.forward(input);
        let x = self.norm.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[("batch", batch), ("out_channels", self.out_channels())]
        );

        x
    }
}

impl<B: Backend> LearnableParams for ConvNorm<B> {
    fn count_learnable_params(&self) -> usize {
        self.conv.count_learnable_params() + self.norm.count_learnable_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::conv::conv1x1;
    use crate::testing::{TestBackend, random_input};
    use bimm_contracts::assert_shape_contract;
    use burn::nn::PaddingConfig2d;

    #[test]
    fn test_conv_norm_config() {
        let inner_config = Conv2dConfig::new([2, 4], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false);

        let config: ConvNormConfig = inner_config.clone().into();

        assert_eq!(&config.conv.channels, &inner_config.channels);
        assert_eq!(&config.conv.kernel_size, &inner_config.kernel_size);
        assert_eq!(&config.conv.stride, &inner_config.stride);
        assert_eq!(config.in_channels(), 2);
        assert_eq!(config.out_channels(), 4);
    }

    #[test]
    fn test_conv_norm_forward() {
        let device = Default::default();
        let block: ConvNorm<TestBackend> = ConvNormConfig::from(conv1x1(3, 6, 2)).init(&device);

        assert_eq!(block.in_channels(), 3);
        assert_eq!(block.out_channels(), 6);
        assert_eq!(block.stride(), [2, 2]);

        let output = block.forward(random_input([2, 3, 8, 8], &device));
        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[
                ("batch", 2),
                ("channels", 6),
                ("height", 4),
                ("width", 4)
            ],
        );
    }
}
