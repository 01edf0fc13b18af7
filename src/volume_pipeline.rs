//! Volume conversion pipeline module
//!
//! This module provides a structured approach to converting volumetric
//! microscopy stacks into browser-ready NPZ bundles, with separate modules
//! for stack loading, channel processing, bundle writing, and conversion
//! orchestration.

pub mod common;
pub mod config;
pub mod conversions;
pub mod discovery;
pub mod npz;
pub mod processing;
pub mod stack;

pub use common::{
    ConvertError,
    Result,
};

pub use config::{
    ChannelMap,
    ConvertConfig,
    ConvertConfigBuilder,
};

pub use stack::{
    RawStack,
    StackReader,
    TiffStackReader,
    VoxelSize,
};

pub use processing::{
    process_channel,
};

pub use npz::{
    BundleMeta,
    BundleWriter,
    NpzBundleWriter,
    VolumeBundle,
};

pub use conversions::{
    StackToNpzPipeline,
};

pub use discovery::discover_files;
