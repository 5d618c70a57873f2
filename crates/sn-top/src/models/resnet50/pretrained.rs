//! # Pretrained `ResNet-50`
//!
//! torchvision ImageNet weights for [`ResNet50`], fetched through the disk
//! cache; the classifier is always replaced by a fresh
//! ``Linear(2048, num_classes)``.

use crate::cache::disk::DiskCacheConfig;
use crate::cache::weights::{
    PretrainedWeightsMap, StaticPretrainedWeightsDescriptor, StaticPretrainedWeightsMap,
};
use crate::models::params::LearnableParams;
use crate::models::resnet50::ResNet50;
use crate::models::resnet50::pytorch_stubs::load_pytorch_weights;
use crate::models::resnet50::resnet_model::ResNetConfig;
use burn::config::Config;
use burn::prelude::Backend;

/// torchvision `ResNet-50` weights.
pub static RESNET50_WEIGHTS: StaticPretrainedWeightsMap = StaticPretrainedWeightsMap {
    items: &[
        &StaticPretrainedWeightsDescriptor {
            name: "tv_in1k",
            description: "torchvision IMAGENET1K_V1 weights (acc@1 76.13)",
            license: Some("bsd-3-clause"),
            origin: Some("https://github.com/pytorch/vision"),
            urls: &["https://download.pytorch.org/models/resnet50-0676ba61.pth"],
        },
        &StaticPretrainedWeightsDescriptor {
            name: "tv2_in1k",
            description: "torchvision IMAGENET1K_V2 weights (acc@1 80.86)",
            license: Some("bsd-3-clause"),
            origin: Some("https://github.com/pytorch/vision"),
            urls: &["https://download.pytorch.org/models/resnet50-11ad3fa6.pth"],
        },
    ],
};

/// The [`RESNET50_WEIGHTS`] directory.
pub fn resnet50_weights() -> PretrainedWeightsMap {
    (&RESNET50_WEIGHTS).into()
}

/// Pretrained [`ResNet50`] Config.
#[derive(Config, Debug)]
pub struct PretrainedResNet50Config {
    /// Number of output classes of the replacement head.
    #[config(default = 10)]
    pub num_classes: usize,

    /// Name of the [`RESNET50_WEIGHTS`] entry to load.
    #[config(default = "\"tv_in1k\".to_string()")]
    pub weights: String,
}

impl PretrainedResNet50Config {
    /// The backbone config, with the ImageNet head.
    pub fn backbone(&self) -> ResNetConfig {
        ResNetConfig::resnet50(1000)
    }

    /// Initialize a randomly weighted [`ResNet50`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNet50<B> {
        self.backbone().init(device).with_classes(self.num_classes)
    }

    /// Initialize a [`ResNet50`] from the pretrained weights.
    ///
    /// Downloads the weights on first use.
    ///
    /// # Errors
    ///
    /// Unknown weight names, download or cache failures, and weight files
    /// that do not decode onto the `ResNet-50` layout. A cached file that
    /// fails to decode is removed, so the next call downloads it again.
    pub fn init_pretrained<B: Backend>(
        &self,
        device: &B::Device,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<ResNet50<B>> {
        let descriptor = resnet50_weights().try_lookup_by_name(&self.weights)?;
        let path = descriptor.fetch_weights_to_disk_cache(disk_cache)?;

        tracing::info!(
            weights = %descriptor.name,
            path = %path.display(),
            "loading pretrained resnet50"
        );

        let model = match load_pytorch_weights(self.backbone().init(device), path.clone()) {
            Ok(model) => model.with_classes(self.num_classes),
            Err(err) => {
                descriptor.evict(disk_cache)?;
                return Err(err.context(format!(
                    "failed to decode {} weights from {}",
                    descriptor.name,
                    path.display()
                )));
            }
        };

        tracing::info!(
            num_classes = self.num_classes,
            params = model.count_learnable_params(),
            "pretrained resnet50 ready"
        );

        Ok(model)
    }
}
