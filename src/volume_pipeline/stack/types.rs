//! Volumetric stack data types

use ndarray::ArrayD;

/// Physical voxel spacing in meters per axis, as recorded by the source
/// file. An axis is `None` when the source carries no calibration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoxelSize {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

/// Represents a decoded intensity stack
#[derive(Debug, Clone)]
pub struct RawStack {
    /// Sample data cast to f32. A valid multi-channel acquisition is 4D
    /// with axis order (Z, C, Y, X); 3D and 5D stacks are representable
    /// here and rejected by the assembler's rank check.
    pub data: ArrayD<f32>,
    /// Physical voxel spacing from source metadata
    pub voxel_size: VoxelSize,
}
