//! # Module / Weight Caches
//!
//! * [`disk`] - the on-disk download cache.
//! * [`weights`] - pretrained weight descriptors.

pub mod disk;
pub mod weights;

pub use disk::DiskCacheConfig;
pub use weights::{
    PretrainedWeightsDescriptor, PretrainedWeightsMap, StaticPretrainedWeightsDescriptor,
    StaticPretrainedWeightsMap,
};
