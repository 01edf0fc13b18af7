use std::io::Write;

use crate::volume_pipeline::common::error::Result;
use crate::volume_pipeline::npz::types::VolumeBundle;

pub trait BundleWriter {
    fn write_bundle(&self, bundle: &VolumeBundle, output: &mut dyn Write) -> Result<()>;
}
