//! # Top Models

pub mod cnn;
pub mod linear;
pub mod mlp;
pub mod params;
pub mod resnet50;
pub mod top;
pub mod wide_resnet;
