use ndarray::{Axis, Ix4};
use tracing::debug;

use crate::volume_pipeline::common::error::{ConvertError, Result};
use crate::volume_pipeline::config::ConvertConfig;
use crate::volume_pipeline::npz::types::{BundleMeta, VolumeBundle};
use crate::volume_pipeline::processing::process_channel;
use crate::volume_pipeline::stack::types::RawStack;

/// Meters to micrometers, the unit LSM voxel sizes are stored in versus
/// the unit the bundle records.
const METERS_TO_UM: f64 = 1e6;

/// Spacing assumed per axis when the source carries no calibration,
/// in micrometers.
const DEFAULT_VOXEL_UM: f64 = 1.0;

/// Builds the display bundle from a decoded stack.
///
/// Validates that the stack is 4D `(Z, C, Y, X)` with at least three
/// channels and that every channel-map index is in range, then runs the
/// channel processor once per map entry (repeats are recomputed, not
/// shared) and fills in the geometry metadata.
pub fn assemble(stack: &RawStack, source_name: &str, config: &ConvertConfig) -> Result<VolumeBundle> {
    let volume = stack
        .data
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| ConvertError::ShapeError(stack.data.shape().to_vec()))?;

    let channels = volume.len_of(Axis(1));
    if channels < 3 {
        return Err(ConvertError::ChannelCountError(channels));
    }

    let map = config.channel_map.indices();
    for &index in &map {
        if index >= channels {
            return Err(ConvertError::ChannelMapError { index, channels });
        }
    }

    debug!(
        shape = ?volume.shape(),
        map = %config.channel_map,
        "Assembling display channels"
    );

    let r = process_channel(volume.index_axis(Axis(1), map[0]), config.sigma, config.ds);
    let g = process_channel(volume.index_axis(Axis(1), map[1]), config.sigma, config.ds);
    let b = process_channel(volume.index_axis(Axis(1), map[2]), config.sigma, config.ds);

    let meta = BundleMeta {
        vx_um: voxel_um(stack.voxel_size.x),
        vy_um: voxel_um(stack.voxel_size.y),
        vz_um: voxel_um(stack.voxel_size.z),
        ds: config.ds.get(),
        sigma: config.sigma,
        file: source_name.to_string(),
        channel_map: config.channel_map,
    };

    Ok(VolumeBundle { r, g, b, meta })
}

fn voxel_um(meters: Option<f64>) -> f64 {
    meters.map_or(DEFAULT_VOXEL_UM, |m| m * METERS_TO_UM)
}
