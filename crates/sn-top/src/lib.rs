#![warn(missing_docs)]
//!# sn-top - Scattering Network Top Models
//!
//! Classification networks which consume precomputed scattering-transform
//! coefficients (or images, for the pretrained/standard variants).
//!
//! ## Notable Components
//!
//! * [`cache`] - pretrained weight disk cache.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::conv`] - ``conv3x3`` / ``conv1x1`` config helpers.
//!   * [`layers::conv_norm`] - ``Conv2d + BatchNorm2d`` block.
//!   * [`layers::scattering_norm`] - batch norm over merged scattering channels.
//! * [`models`] - complete top models.
//!   * [`models::mlp`] - multilayer perceptron.
//!   * [`models::linear`] - linear classifier.
//!   * [`models::cnn`] - scattering CNN with residual blocks.
//!   * [`models::wide_resnet`] - Wide-ResNet (WRN-16-8).
//!   * [`models::resnet50`] - pretrained `ResNet-50`.
//!   * [`models::top`] - the [`models::top::TopModel`] factory.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

#[cfg(test)]
#[allow(dead_code)]
pub(crate) mod testing;

pub mod cache;
pub mod layers;
pub mod models;
