//! Volumetric stack reading module
//!
//! This module provides format-agnostic multi-channel stack reading
//! capabilities.

mod reader;
mod tiff_reader;
pub mod types;

pub use reader::StackReader;
pub use tiff_reader::TiffStackReader;
pub use types::{RawStack, VoxelSize};
