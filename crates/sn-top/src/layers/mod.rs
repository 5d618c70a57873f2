//! # Neural Network Layers

pub mod conv;
pub mod conv_norm;
pub mod scattering_norm;
