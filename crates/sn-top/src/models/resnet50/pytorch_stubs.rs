#![allow(missing_docs)]
//! # torchvision `ResNet` Stubs
//!
//! Record-only mirrors of the torchvision module tree. `burn-import` cannot
//! recover stateless modules (``ReLU``, pooling) from a weights file, so the
//! file is decoded into these stubs and then copied onto a live [`ResNet`].
use crate::layers::conv_norm::ConvNorm;
use crate::models::resnet50::bottleneck::BottleneckBlock;
use crate::models::resnet50::resnet_model::ResNet;
use anyhow::bail;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dRecord};
use burn::nn::{BatchNorm, BatchNormRecord, Linear};
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, Recorder};
use burn_import::pytorch::PyTorchFileRecorder;
use std::path::PathBuf;

/// Load weights from a ``torch`` weights file onto a [`ResNet`].
///
/// The classifier is not copied; `target.fc` is kept as-is.
pub fn load_pytorch_weights<B: Backend>(
    target: ResNet<B>,
    path: PathBuf,
) -> anyhow::Result<ResNet<B>> {
    let device = target.fc.weight.device();
    let record = load_resnet_stub_record::<B>(path, &device)?;
    record.copy_weights(target)
}

/// Load a [`ResNetStubRecord`] from a ``torch`` weights file.
pub fn load_resnet_stub_record<B: Backend>(
    path: PathBuf,
    device: &B::Device,
) -> anyhow::Result<ResNetStubRecord<B>> {
    let load_args = burn_import::pytorch::LoadArgs::new(path)
        .with_key_remap(r"downsample\.0", "downsample.conv")
        .with_key_remap(r"downsample\.1", "downsample.bn");

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::new().load(load_args, device)?;

    Ok(record)
}

#[derive(Module, Debug)]
pub struct ResNetStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub layer1: Vec<BottleneckStub<B>>,
    pub layer2: Vec<BottleneckStub<B>>,
    pub layer3: Vec<BottleneckStub<B>>,
    pub layer4: Vec<BottleneckStub<B>>,
    pub fc: Linear<B>,
}

impl<B: Backend> ResNetStubRecord<B> {
    /// Copy every weight except the classifier onto `target`.
    pub fn copy_weights(
        self,
        target: ResNet<B>,
    ) -> anyhow::Result<ResNet<B>> {
        Ok(ResNet {
            conv_norm: copy_conv_norm_weights(self.conv1, self.bn1, target.conv_norm),
            layer1: copy_stage_weights("layer1", self.layer1, target.layer1)?,
            layer2: copy_stage_weights("layer2", self.layer2, target.layer2)?,
            layer3: copy_stage_weights("layer3", self.layer3, target.layer3)?,
            layer4: copy_stage_weights("layer4", self.layer4, target.layer4)?,
            ..target
        })
    }
}

fn copy_stage_weights<B: Backend>(
    name: &str,
    stubs: Vec<BottleneckStubRecord<B>>,
    target: Vec<BottleneckBlock<B>>,
) -> anyhow::Result<Vec<BottleneckBlock<B>>> {
    if stubs.len() != target.len() {
        bail!(
            "{name}: weights have {} blocks, model has {}",
            stubs.len(),
            target.len()
        );
    }
    stubs
        .into_iter()
        .zip(target)
        .enumerate()
        .map(|(idx, (stub, block))| {
            stub.copy_weights(block)
                .map_err(|err| err.context(format!("{name}.{idx}")))
        })
        .collect()
}

#[derive(Module, Debug)]
pub struct DownsampleStub<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

pub fn copy_conv_norm_weights<B: Backend>(
    conv: Conv2dRecord<B>,
    bn: BatchNormRecord<B, 2>,
    target: ConvNorm<B>,
) -> ConvNorm<B> {
    ConvNorm {
        conv: target.conv.load_record(conv),
        norm: target.norm.load_record(bn),
    }
}

pub fn copy_downsample_weights<B: Backend>(
    downsample: Option<DownsampleStubRecord<B>>,
    target: Option<ConvNorm<B>>,
) -> anyhow::Result<Option<ConvNorm<B>>> {
    match (downsample, target) {
        (Some(stub), Some(target)) => Ok(Some(copy_conv_norm_weights(stub.conv, stub.bn, target))),
        (None, None) => Ok(None),
        (None, Some(_)) => bail!("weights have no downsample; block has one"),
        (Some(_), None) => bail!("weights have a downsample; block has none"),
    }
}

#[derive(Module, Debug)]
pub struct BottleneckStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub conv3: Conv2d<B>,
    pub bn3: BatchNorm<B, 2>,
    pub downsample: Option<DownsampleStub<B>>,
}

impl<B: Backend> BottleneckStubRecord<B> {
    pub fn copy_weights(
        self,
        target: BottleneckBlock<B>,
    ) -> anyhow::Result<BottleneckBlock<B>> {
        Ok(BottleneckBlock {
            conv_norm1: copy_conv_norm_weights(self.conv1, self.bn1, target.conv_norm1),
            conv_norm2: copy_conv_norm_weights(self.conv2, self.bn2, target.conv_norm2),
            conv_norm3: copy_conv_norm_weights(self.conv3, self.bn3, target.conv_norm3),
            downsample: copy_downsample_weights(self.downsample, target.downsample)?,
            ..target
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnet50::resnet_model::ResNetConfig;
    use crate::testing::TestBackend;

    fn conv_norm_records<B: Backend>(
        conv_norm: ConvNorm<B>,
    ) -> (Conv2dRecord<B>, BatchNormRecord<B, 2>) {
        (conv_norm.conv.into_record(), conv_norm.norm.into_record())
    }

    fn block_stub<B: Backend>(block: BottleneckBlock<B>) -> BottleneckStubRecord<B> {
        let (conv1, bn1) = conv_norm_records(block.conv_norm1);
        let (conv2, bn2) = conv_norm_records(block.conv_norm2);
        let (conv3, bn3) = conv_norm_records(block.conv_norm3);
        BottleneckStubRecord {
            conv1,
            bn1,
            conv2,
            bn2,
            conv3,
            bn3,
            downsample: block.downsample.map(|ds| {
                let (conv, bn) = conv_norm_records(ds);
                DownsampleStubRecord { conv, bn }
            }),
        }
    }

    /// Mirror a live model into the torchvision record layout.
    fn model_stub<B: Backend>(model: ResNet<B>) -> ResNetStubRecord<B> {
        let (conv1, bn1) = conv_norm_records(model.conv_norm);
        let stage = |blocks: Vec<BottleneckBlock<B>>| {
            blocks.into_iter().map(block_stub).collect::<Vec<_>>()
        };
        ResNetStubRecord {
            conv1,
            bn1,
            layer1: stage(model.layer1),
            layer2: stage(model.layer2),
            layer3: stage(model.layer3),
            layer4: stage(model.layer4),
            fc: model.fc.into_record(),
        }
    }

    #[test]
    fn test_copy_weights_skips_classifier() {
        let device = Default::default();
        let config = ResNetConfig::new()
            .with_blocks([2, 1, 1, 1])
            .with_num_classes(10);

        let source: ResNet<TestBackend> = config.init(&device);
        let target: ResNet<TestBackend> = config.init(&device);

        let source_stem = source.conv_norm.conv.weight.val().into_data();
        let source_ds = source.layer2[0]
            .downsample
            .as_ref()
            .unwrap()
            .conv
            .weight
            .val()
            .into_data();
        let source_conv3 = source.layer1[1].conv_norm3.conv.weight.val().into_data();
        let target_fc = target.fc.weight.val().into_data();

        let loaded = model_stub(source).copy_weights(target).unwrap();

        assert_eq!(loaded.conv_norm.conv.weight.val().into_data(), source_stem);
        assert_eq!(
            loaded.layer2[0]
                .downsample
                .as_ref()
                .unwrap()
                .conv
                .weight
                .val()
                .into_data(),
            source_ds
        );
        assert_eq!(
            loaded.layer1[1].conv_norm3.conv.weight.val().into_data(),
            source_conv3
        );
        assert_eq!(loaded.fc.weight.val().into_data(), target_fc);
    }

    #[test]
    fn test_copy_weights_stage_mismatch() {
        let device = Default::default();
        let source: ResNet<TestBackend> = ResNetConfig::new()
            .with_blocks([1, 1, 1, 1])
            .init(&device);
        let target: ResNet<TestBackend> = ResNetConfig::new()
            .with_blocks([2, 1, 1, 1])
            .init(&device);

        let err = model_stub(source).copy_weights(target).unwrap_err();
        assert!(err.to_string().contains("layer1"));
    }
}
