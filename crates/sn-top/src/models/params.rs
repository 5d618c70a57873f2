//! # Learnable Parameter Counting
//!
//! [`LearnableParams`] counts the scalar parameters which receive gradients.
//! Norm running statistics are buffers, not parameters, and are excluded;
//! so are the frozen scale/shift of a non-affine
//! [`crate::layers::scattering_norm::ScatteringNorm`].

use burn::nn::conv::Conv2d;
use burn::nn::{BatchNorm, Linear};
use burn::prelude::Backend;

/// Learnable parameter count.
pub trait LearnableParams {
    /// The number of learnable scalar parameters.
    fn count_learnable_params(&self) -> usize;
}

impl<B: Backend> LearnableParams for Linear<B> {
    fn count_learnable_params(&self) -> usize {
        self.weight.shape().num_elements()
            + self
                .bias
                .as_ref()
                .map_or(0, |bias| bias.shape().num_elements())
    }
}

impl<B: Backend> LearnableParams for Conv2d<B> {
    fn count_learnable_params(&self) -> usize {
        self.weight.shape().num_elements()
            + self
                .bias
                .as_ref()
                .map_or(0, |bias| bias.shape().num_elements())
    }
}

impl<B: Backend, const D: usize> LearnableParams for BatchNorm<B, D> {
    fn count_learnable_params(&self) -> usize {
        self.gamma.shape().num_elements() + self.beta.shape().num_elements()
    }
}

impl<T: LearnableParams> LearnableParams for Option<T> {
    fn count_learnable_params(&self) -> usize {
        self.as_ref().map_or(0, T::count_learnable_params)
    }
}

impl<T: LearnableParams> LearnableParams for Vec<T> {
    fn count_learnable_params(&self) -> usize {
        self.iter().map(T::count_learnable_params).sum()
    }
}
