//! # Scattering CNN
//!
//! [`ScatteringCnn`] is a residual CNN of [`BasicBlock`] stages.

pub mod basic_block;
pub mod scattering_cnn;

pub use basic_block::{BasicBlock, BasicBlockConfig, BasicBlockMeta};
pub use scattering_cnn::{ScatteringCnn, ScatteringCnnConfig};
