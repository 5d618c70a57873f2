//! # Pretrained Weight Descriptors
//!
//! A [`PretrainedWeightsDescriptor`] names one downloadable weights file,
//! such as a torchvision `ResNet-50` checkpoint. Files are cached under
//! ``{cache}/weights/{name}-{crc16(url)}-{url basename}``; the url hash
//! keeps two releases with the same file name apart.
//!
//! Model modules publish their weights as a [`StaticPretrainedWeightsMap`]
//! and look entries up through the owned [`PretrainedWeightsMap`].

use crate::cache::disk::DiskCacheConfig;
use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::remove_file;
use std::path::PathBuf;

/// Sub-directory of the disk cache holding weight files.
pub const WEIGHTS_CACHE_DIR: &str = "weights";

const X25: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_SDLC);

/// The cache file name for a weights url.
///
/// ``{name}-{crc16(url)}-{url basename}``, or without the name prefix when
/// `name` is ``None``.
pub fn url_to_cache_key(
    name: Option<&str>,
    url: &str,
) -> String {
    let hash = X25.checksum(url.as_bytes());
    let base_name = url.rsplit_once('/').map_or(url, |(_, base)| base);
    match name {
        Some(name) => format!("{name}-{hash}-{base_name}"),
        None => format!("{hash}-{base_name}"),
    }
}

/// The disk cache resource key of a weights file.
pub fn pretrained_weights_resource_key(cache_key: &str) -> Vec<String> {
    vec![WEIGHTS_CACHE_DIR.to_string(), cache_key.to_string()]
}

/// A [`PretrainedWeightsDescriptor`] that can live in a ``static``.
#[derive(Debug)]
pub struct StaticPretrainedWeightsDescriptor<'a> {
    /// Lookup name, e.g. ``tv_in1k``.
    pub name: &'a str,

    /// Human readable summary; training recipe and accuracy.
    pub description: &'a str,

    /// License of the weights.
    pub license: Option<&'a str>,

    /// Project the weights were published by.
    pub origin: Option<&'a str>,

    /// Download urls; the first is used.
    pub urls: &'a [&'a str],
}

impl From<&StaticPretrainedWeightsDescriptor<'_>> for PretrainedWeightsDescriptor {
    fn from(entry: &StaticPretrainedWeightsDescriptor) -> Self {
        Self {
            name: entry.name.to_string(),
            description: entry.description.to_string(),
            license: entry.license.map(str::to_string),
            origin: entry.origin.map(str::to_string),
            urls: entry.urls.iter().map(|url| url.to_string()).collect(),
        }
    }
}

/// One downloadable weights file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PretrainedWeightsDescriptor {
    /// Lookup name.
    pub name: String,

    /// Human readable summary.
    pub description: String,

    /// License of the weights.
    pub license: Option<String>,

    /// Project the weights were published by.
    pub origin: Option<String>,

    /// Download urls; the first is used.
    pub urls: Vec<String>,
}

impl PretrainedWeightsDescriptor {
    /// The download url.
    pub fn url(&self) -> anyhow::Result<&str> {
        self.urls
            .first()
            .map(String::as_str)
            .with_context(|| format!("no urls for weights {:?}", self.name))
    }

    /// The cache file name; see [`url_to_cache_key`].
    pub fn cache_key(&self) -> anyhow::Result<String> {
        Ok(url_to_cache_key(Some(&self.name), self.url()?))
    }

    /// Where the weights live in `disk_cache`, whether or not they are there.
    pub fn cache_path(
        &self,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<PathBuf> {
        disk_cache.resource_to_path(&pretrained_weights_resource_key(&self.cache_key()?))
    }

    /// Are the weights already in `disk_cache`?
    pub fn is_cached(
        &self,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<bool> {
        Ok(self.cache_path(disk_cache)?.exists())
    }

    /// Read-through fetch of the weights.
    ///
    /// # Returns
    ///
    /// The disk location of the cached weights.
    pub fn fetch_weights_to_disk_cache(
        &self,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<PathBuf> {
        let resource = pretrained_weights_resource_key(&self.cache_key()?);
        disk_cache.fetch_resource(self.url()?, &resource)
    }

    /// Remove the weights from `disk_cache`; the next fetch downloads them.
    ///
    /// # Returns
    ///
    /// Whether a cached file was removed.
    pub fn evict(
        &self,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<bool> {
        let path = self.cache_path(disk_cache)?;
        if !path.exists() {
            return Ok(false);
        }
        tracing::warn!(weights = %self.name, path = %path.display(), "evicting cached weights");
        remove_file(&path)
            .with_context(|| format!("failed to remove cached weights: {}", path.display()))?;
        Ok(true)
    }
}

/// A [`PretrainedWeightsMap`] that can live in a ``static``.
#[derive(Debug)]
pub struct StaticPretrainedWeightsMap<'a> {
    /// The entries.
    pub items: &'a [&'a StaticPretrainedWeightsDescriptor<'a>],
}

impl From<&StaticPretrainedWeightsMap<'_>> for PretrainedWeightsMap {
    fn from(table: &StaticPretrainedWeightsMap) -> Self {
        Self {
            items: table
                .items
                .iter()
                .map(|&entry| (entry.name.to_string(), entry.into()))
                .collect(),
        }
    }
}

/// Pretrained weights of one model, by name.
#[derive(Debug, Clone)]
pub struct PretrainedWeightsMap {
    /// Descriptors by name.
    pub items: BTreeMap<String, PretrainedWeightsDescriptor>,
}

impl PretrainedWeightsMap {
    /// Known weight names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.items.keys().map(String::as_str).collect()
    }

    /// Lookup a descriptor by name.
    pub fn lookup_by_name(
        &self,
        name: &str,
    ) -> Option<PretrainedWeightsDescriptor> {
        self.items.get(name).cloned()
    }

    /// Lookup a descriptor by name.
    ///
    /// # Errors
    ///
    /// Unknown names; the message lists the known ones.
    pub fn try_lookup_by_name(
        &self,
        name: &str,
    ) -> anyhow::Result<PretrainedWeightsDescriptor> {
        match self.lookup_by_name(name) {
            Some(descriptor) => Ok(descriptor),
            None => bail!("Descriptor not found: {name}; known: {:?}", self.names()),
        }
    }
}
