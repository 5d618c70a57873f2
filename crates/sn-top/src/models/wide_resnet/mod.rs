//! # Wide-ResNet
//!
//! [`WideResNet`] and its pre-activation [`WideBasicBlock`].

pub mod wide_block;
pub mod wide_resnet_model;

pub use wide_block::{WideBasicBlock, WideBasicBlockConfig, WideBasicBlockMeta};
pub use wide_resnet_model::{WideResNet, WideResNetConfig};
