//! # `ResNet-50`
//!
//! The torchvision `ResNet-50`, optionally initialized from ImageNet weights
//! via [`PretrainedResNet50Config`].

pub mod bottleneck;
pub mod pretrained;
pub mod pytorch_stubs;
pub mod resnet_model;

pub use bottleneck::{BottleneckBlock, BottleneckBlockConfig, BottleneckBlockMeta};
pub use pretrained::{PretrainedResNet50Config, RESNET50_WEIGHTS, resnet50_weights};
pub use resnet_model::{ResNet, ResNetConfig};

/// A [`ResNet`] with the ``[3, 4, 6, 3]`` bottleneck layout.
pub type ResNet50<B> = ResNet<B>;
