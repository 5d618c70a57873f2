//! # Convolution Helpers
//!
//! Builders for the two convolution shapes every residual model here uses,
//! and resolution arithmetic for strided blocks.
use burn::nn::conv::Conv2dConfig;
use burn::nn::{Initializer, PaddingConfig2d};

/// Kaiming-normal, fan-out mode, with the `ReLU` gain.
///
/// Matches ``kaiming_normal_(mode='fan_out', nonlinearity='relu')``.
pub static CONV_INTO_RELU_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: std::f64::consts::SQRT_2,
    fan_out_only: true,
};

/// 3x3 convolution with padding 1 and no bias.
pub fn conv3x3(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([in_planes, out_planes], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
}

/// 1x1 convolution with no bias.
pub fn conv1x1(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([in_planes, out_planes], [1, 1])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(0, 0))
        .with_bias(false)
}

/// Output size of a padded, strided conv or pool along one axis.
///
/// Holds for ``conv3x3`` (padding 1), ``conv1x1`` (padding 0), the 7x7/3
/// stem and the 3x3/1 max pool: ``(size - 1) / stride + 1``.
#[inline(always)]
pub fn strided_output_size(
    size: usize,
    stride: usize,
) -> usize {
    size.div_ceil(stride)
}

/// Get the output resolution for a given input resolution.
///
/// # Arguments
///
/// - `input_resolution`: ``[height_in, width_in]``.
///
/// # Returns
///
/// ``[ceil(height_in / stride), ceil(width_in / stride)]``
#[inline(always)]
pub fn strided_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    let [height, width] = input_resolution;
    [
        strided_output_size(height, stride),
        strided_output_size(width, stride),
    ]
}
