//! Output bundle types

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::volume_pipeline::config::ChannelMap;

/// Geometry and provenance metadata stored as `meta.json` in the bundle.
///
/// The field order here is the key order viewers see; voxel sizes are in
/// micrometers. Changing keys or their meaning is a format break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMeta {
    pub vx_um: f64,
    pub vy_um: f64,
    pub vz_um: f64,
    pub ds: usize,
    pub sigma: f32,
    pub file: String,
    pub channel_map: ChannelMap,
}

/// A fully processed display bundle ready for serialization
#[derive(Debug, Clone)]
pub struct VolumeBundle {
    /// Red display channel, `(Z, Y, X)` with values in `[0, 1]`
    pub r: Array3<f32>,
    /// Green display channel
    pub g: Array3<f32>,
    /// Blue display channel
    pub b: Array3<f32>,
    /// Metadata serialized as `meta.json`
    pub meta: BundleMeta,
}
