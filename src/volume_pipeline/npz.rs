//! NPZ bundle writing module
//!
//! This module provides the browser-facing output format: an NPZ archive
//! holding the three display volumes and a JSON metadata record.

mod npz_writer;
pub mod types;
mod writer;

pub use npz_writer::NpzBundleWriter;
pub use types::{BundleMeta, VolumeBundle};
pub use writer::BundleWriter;
