use std::io::{Cursor, Seek, Write};

use ndarray::Array3;
use ndarray_npy::WriteNpyExt;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::volume_pipeline::common::error::{ConvertError, Result};
use crate::volume_pipeline::npz::types::VolumeBundle;
use crate::volume_pipeline::npz::writer::BundleWriter;

/// Bundle writer producing a deflate-compressed NPZ archive with exactly
/// four members, in order: `r.npy`, `g.npy`, `b.npy` (NPY v1.0, f32,
/// C-order) and `meta.json`.
pub struct NpzBundleWriter;

impl NpzBundleWriter {
    fn member_options() -> FileOptions {
        FileOptions::default().compression_method(CompressionMethod::Deflated)
    }

    fn write_volume<W: Write + Seek>(
        zip: &mut ZipWriter<W>,
        name: &str,
        volume: &Array3<f32>,
    ) -> Result<()> {
        zip.start_file(name, Self::member_options())
            .map_err(|e| ConvertError::EncodeError(e.to_string()))?;
        volume
            .as_standard_layout()
            .write_npy(&mut *zip)
            .map_err(|e| ConvertError::EncodeError(e.to_string()))?;
        Ok(())
    }
}

impl BundleWriter for NpzBundleWriter {
    fn write_bundle(&self, bundle: &VolumeBundle, output: &mut dyn Write) -> Result<()> {
        let (depth, height, width) = bundle.r.dim();
        debug!("Encoding NPZ bundle, {depth}x{height}x{width} per channel");

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);

            for (name, volume) in [
                ("r.npy", &bundle.r),
                ("g.npy", &bundle.g),
                ("b.npy", &bundle.b),
            ] {
                Self::write_volume(&mut zip, name, volume)?;
            }

            zip.start_file("meta.json", Self::member_options())
                .map_err(|e| ConvertError::EncodeError(e.to_string()))?;
            serde_json::to_writer(&mut zip, &bundle.meta)
                .map_err(|e| ConvertError::EncodeError(e.to_string()))?;

            zip.finish()
                .map_err(|e| ConvertError::EncodeError(e.to_string()))?;
        }

        output.write_all(buffer.get_ref())?;

        debug!("NPZ encoding complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use ndarray::{Array3, Ix3, OwnedRepr};
    use ndarray_npy::NpzReader;
    use serde_json::Value;

    use super::*;
    use crate::volume_pipeline::config::ChannelMap;
    use crate::volume_pipeline::npz::types::BundleMeta;

    fn sample_bundle() -> VolumeBundle {
        let r = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 12 + y * 4 + x) as f32 / 24.0);
        let g = Array3::from_elem((2, 3, 4), 0.5f32);
        let b = Array3::zeros((2, 3, 4));
        VolumeBundle {
            r,
            g,
            b,
            meta: BundleMeta {
                vx_um: 0.5,
                vy_um: 0.5,
                vz_um: 2.0,
                ds: 6,
                sigma: 12.0,
                file: "sample.lsm".to_string(),
                channel_map: ChannelMap([2, 0, 1]),
            },
        }
    }

    #[test]
    fn bundle_members_are_ordered_and_deflated() {
        let bundle = sample_bundle();
        let mut raw = Vec::new();
        NpzBundleWriter.write_bundle(&bundle, &mut raw).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(raw)).unwrap();
        assert_eq!(archive.len(), 4);

        let expected = ["r.npy", "g.npy", "b.npy", "meta.json"];
        for (index, name) in expected.iter().enumerate() {
            let member = archive.by_index(index).unwrap();
            assert_eq!(member.name(), *name);
            assert_eq!(member.compression(), CompressionMethod::Deflated);
        }
    }

    #[test]
    fn volumes_round_trip_bit_exact() {
        let bundle = sample_bundle();
        let mut raw = Vec::new();
        NpzBundleWriter.write_bundle(&bundle, &mut raw).unwrap();

        let mut npz = NpzReader::new(Cursor::new(raw)).unwrap();
        let r = npz.by_name::<OwnedRepr<f32>, Ix3>("r.npy").unwrap();
        let g = npz.by_name::<OwnedRepr<f32>, Ix3>("g.npy").unwrap();
        let b = npz.by_name::<OwnedRepr<f32>, Ix3>("b.npy").unwrap();

        assert_eq!(r, bundle.r);
        assert_eq!(g, bundle.g);
        assert_eq!(b, bundle.b);
    }

    #[test]
    fn metadata_round_trips_with_native_json_numbers() {
        let bundle = sample_bundle();
        let mut raw = Vec::new();
        NpzBundleWriter.write_bundle(&bundle, &mut raw).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(raw)).unwrap();
        let member = archive.by_name("meta.json").unwrap();

        let value: Value = serde_json::from_reader(member).unwrap();
        assert!(value["vx_um"].is_f64());
        assert!(value["ds"].is_u64());
        assert_eq!(value["file"], "sample.lsm");
        assert_eq!(value["channel_map"], serde_json::json!([2, 0, 1]));

        let meta: BundleMeta = serde_json::from_value(value).unwrap();
        assert_eq!(meta, bundle.meta);
    }

    #[test]
    fn npy_members_declare_f32_c_order() {
        let bundle = sample_bundle();
        let mut raw = Vec::new();
        NpzBundleWriter.write_bundle(&bundle, &mut raw).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(raw)).unwrap();
        let mut member = archive.by_name("r.npy").unwrap();
        let mut contents = Vec::new();
        std::io::copy(&mut member, &mut contents).unwrap();

        // NPY v1.0 magic, then a header declaring little-endian f32 in
        // C order with the volume's shape.
        assert_eq!(&contents[..6], b"\x93NUMPY");
        assert_eq!(contents[6], 1);
        let header = String::from_utf8_lossy(&contents[10..128]);
        assert!(header.contains("'descr': '<f4'"));
        assert!(header.contains("'fortran_order': False"));
        assert!(header.contains("(2, 3, 4)"));
    }
}
