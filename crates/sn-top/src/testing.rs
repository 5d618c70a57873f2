//! # Test Helpers

use burn::backend::{Autodiff, NdArray};
use burn::prelude::{Backend, Tensor};
use burn::tensor::Distribution;

/// Inference test backend.
pub type TestBackend = NdArray<f32>;

/// Training-mode test backend.
pub type TestAutodiffBackend = Autodiff<NdArray<f32>>;

/// Build a random normal ``[batch, channels, height, width]`` input.
pub fn random_input<B: Backend>(
    shape: [usize; 4],
    device: &B::Device,
) -> Tensor<B, 4> {
    Tensor::random(shape, Distribution::Normal(0.0, 1.0), device)
}

/// Assert that every value of a tensor is finite.
pub fn expect_finite<B: Backend, const D: usize>(tensor: Tensor<B, D>) {
    let values = tensor.into_data().to_vec::<f32>().unwrap();
    assert!(
        values.iter().all(|v| v.is_finite()),
        "non-finite values: {values:?}"
    );
}

/// Sample standard deviation of a tensor's values.
pub fn sample_std<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f64 {
    let values = tensor.into_data().to_vec::<f32>().unwrap();
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    var.sqrt()
}

/// Assert a conv weight was drawn with `kaiming_normal_(mode='fan_out', nonlinearity='relu')`.
pub fn expect_kaiming_fan_out<B: Backend>(
    conv: &burn::nn::conv::Conv2d<B>,
    tolerance: f64,
) {
    let [out_channels, _, kh, kw] = conv.weight.dims();
    let expected = (2.0 / (out_channels * kh * kw) as f64).sqrt();
    let actual = sample_std(conv.weight.val());
    assert!(
        ((actual - expected) / expected).abs() < tolerance,
        "weight std {actual} != kaiming fan-out std {expected}"
    );
}
