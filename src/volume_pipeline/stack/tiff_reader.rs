//! Stack reader implementation using the tiff library.
//!
//! This module reads Zeiss LSM files and plain or ImageJ-flavored TIFF
//! stacks into a single f32 array. LSM acquisition geometry and voxel
//! spacing come from the private CZ_LSMINFO tag, ImageJ hyperstacks are
//! grouped from the ImageDescription text, and any other multi-page TIFF
//! falls back to one page per Z plane.

use std::io::{Cursor, Read, Seek};

use ndarray::{ArrayD, IxDyn};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::debug;

use crate::volume_pipeline::common::error::{ConvertError, Result};
use crate::volume_pipeline::stack::reader::StackReader;
use crate::volume_pipeline::stack::types::{RawStack, VoxelSize};

/// Private TIFF tag holding the Zeiss CZ_LSMINFO acquisition block.
const CZ_LSMINFO_TAG: u16 = 34412;

/// CZ_LSMINFO magic numbers, format revisions before and from 2.0.
const CZ_MAGIC_PRE_2_0: u32 = 0x0030_0494;
const CZ_MAGIC_2_0: u32 = 0x0040_0494;

// Byte offsets into the little-endian CZ_LSMINFO block.
const CZ_DIMENSION_Z: usize = 16;
const CZ_DIMENSION_CHANNELS: usize = 20;
const CZ_DIMENSION_TIME: usize = 24;
const CZ_VOXEL_SIZE_X: usize = 40;
const CZ_VOXEL_SIZE_Y: usize = 48;
const CZ_VOXEL_SIZE_Z: usize = 56;

/// Stack reader that uses the tiff library for decoding.
///
/// Handles three container flavors:
/// - Zeiss LSM (thumbnail pages skipped, CZ_LSMINFO geometry honored)
/// - ImageJ hyperstack TIFF (channels/slices/frames from the description)
/// - plain single- or multi-sample TIFF stacks
pub struct TiffStackReader;

/// Page grouping declared by the container metadata.
#[derive(Debug, Clone, Copy)]
struct StackLayout {
    channels: usize,
    slices: usize,
    frames: usize,
}

struct LsmInfo {
    layout: StackLayout,
    voxel_size: VoxelSize,
}

/// One full-resolution TIFF directory, decoded.
struct Page {
    width: usize,
    height: usize,
    samples: usize,
    planar: u16,
    data: Vec<f32>,
}

impl StackReader for TiffStackReader {
    /// Reads and decodes a volumetric stack from a byte array.
    ///
    /// This method:
    /// 1. Looks for LSM or ImageJ layout metadata on the first directory
    /// 2. Decodes every full-resolution page to f32 samples
    /// 3. Groups pages into a (Z, C, Y, X) array, with a leading time axis
    ///    for time series and no channel axis for single-channel stacks
    ///
    /// The array rank therefore reflects what the file actually holds;
    /// the assembler rejects anything that is not 4D.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lsm2npz_rs::volume_pipeline::stack::{StackReader, TiffStackReader};
    ///
    /// let reader = TiffStackReader;
    /// let bytes = std::fs::read("stack.lsm").unwrap();
    /// let stack = reader.read_stack(&bytes).unwrap();
    /// ```
    fn read_stack(&self, data: &[u8]) -> Result<RawStack> {
        debug!("Decoding TIFF stack, {} bytes", data.len());

        let mut decoder = Decoder::new(Cursor::new(data))
            .map_err(|e| ConvertError::DecodeError(e.to_string()))?
            .with_limits(Limits::unlimited());

        // Both metadata flavors live on the first directory.
        let lsm = read_lsm_info(&mut decoder);
        let layout = match &lsm {
            Some(info) => Some(info.layout),
            None => read_imagej_layout(&mut decoder),
        };
        let voxel_size = lsm.map(|info| info.voxel_size).unwrap_or_default();

        let mut pages = Vec::new();
        loop {
            if !is_reduced_page(&mut decoder) {
                pages.push(read_page(&mut decoder)?);
            }
            if !decoder.more_images() {
                break;
            }
            decoder
                .next_image()
                .map_err(|e| ConvertError::DecodeError(e.to_string()))?;
        }

        if pages.is_empty() {
            return Err(ConvertError::DecodeError(
                "no full-resolution pages in file".to_string(),
            ));
        }

        let (shape, volume) = assemble_pages(pages, layout)?;
        let data = ArrayD::from_shape_vec(IxDyn(&shape), volume)
            .map_err(|e| ConvertError::DecodeError(e.to_string()))?;

        debug!(shape = ?data.shape(), "Decoded stack");

        Ok(RawStack { data, voxel_size })
    }
}

fn read_lsm_info<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<LsmInfo> {
    decoder
        .find_tag(Tag::Unknown(CZ_LSMINFO_TAG))
        .ok()
        .flatten()
        .and_then(|value| value.into_u8_vec().ok())
        .and_then(|block| parse_lsm_block(&block))
}

fn read_imagej_layout<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<StackLayout> {
    decoder
        .find_tag(Tag::ImageDescription)
        .ok()
        .flatten()
        .and_then(|value| value.into_string().ok())
        .and_then(|description| parse_imagej_description(&description))
}

/// NewSubfileType bit 0 marks reduced-resolution images, which is how LSM
/// files tag the thumbnail page paired with every plane.
fn is_reduced_page<R: Read + Seek>(decoder: &mut Decoder<R>) -> bool {
    decoder
        .find_tag(Tag::NewSubfileType)
        .ok()
        .flatten()
        .and_then(|value| value.into_u64().ok())
        .is_some_and(|flags| flags & 1 != 0)
}

fn read_page<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Page> {
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| ConvertError::DecodeError(e.to_string()))?;

    let samples = decoder
        .find_tag(Tag::SamplesPerPixel)
        .ok()
        .flatten()
        .and_then(|value| value.into_u64().ok())
        .unwrap_or(1)
        .max(1) as usize;

    let planar = decoder
        .find_tag(Tag::PlanarConfiguration)
        .ok()
        .flatten()
        .and_then(|value| value.into_u64().ok())
        .unwrap_or(1) as u16;

    let result = decoder
        .read_image()
        .map_err(|e| ConvertError::DecodeError(e.to_string()))?;
    let data = samples_to_f32(result)?;

    let expected = width as usize * height as usize * samples;
    if data.len() != expected {
        return Err(ConvertError::DecodeError(format!(
            "page holds {} samples, expected {width}x{height}x{samples}",
            data.len()
        )));
    }

    Ok(Page {
        width: width as usize,
        height: height as usize,
        samples,
        planar,
        data,
    })
}

/// Casts any sample format the tiff library can decode to f32. The cast is
/// exact for the 8- and 16-bit data microscopy sources actually produce.
fn samples_to_f32(result: DecodingResult) -> Result<Vec<f32>> {
    let samples = match result {
        DecodingResult::U8(values) => values.into_iter().map(f32::from).collect(),
        DecodingResult::U16(values) => values.into_iter().map(f32::from).collect(),
        DecodingResult::U32(values) => values.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(values) => values.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(values) => values.into_iter().map(f32::from).collect(),
        DecodingResult::I16(values) => values.into_iter().map(f32::from).collect(),
        DecodingResult::I32(values) => values.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(values) => values.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(values) => values,
        DecodingResult::F64(values) => values.into_iter().map(|v| v as f32).collect(),
        _ => {
            return Err(ConvertError::DecodeError(
                "unsupported sample format".to_string(),
            ));
        }
    };
    Ok(samples)
}

/// Groups decoded pages into a dense volume and its shape.
///
/// With layout metadata, multi-sample pages are one (frame, slice) plane
/// each and get their samples de-interleaved into channel planes, while
/// single-sample pages are grouped channel-fastest (the ImageJ hyperstack
/// page order). Without metadata, pages stack along Z.
fn assemble_pages(pages: Vec<Page>, layout: Option<StackLayout>) -> Result<(Vec<usize>, Vec<f32>)> {
    let width = pages[0].width;
    let height = pages[0].height;
    let samples = pages[0].samples;

    if pages
        .iter()
        .any(|p| p.width != width || p.height != height || p.samples != samples)
    {
        return Err(ConvertError::DecodeError(
            "pages disagree on dimensions or sample count".to_string(),
        ));
    }

    let plane = width * height;

    let Some(mut layout) = layout else {
        // No grouping metadata: every page is one Z plane.
        let mut volume = Vec::with_capacity(pages.len() * samples * plane);
        for page in &pages {
            for channel in 0..samples {
                extract_channel(page, channel, &mut volume);
            }
        }
        let shape = if samples >= 2 {
            vec![pages.len(), samples, height, width]
        } else {
            vec![pages.len(), height, width]
        };
        return Ok((shape, volume));
    };

    // A multi-sample stack that declares no channel axis (e.g. an ImageJ
    // RGB stack) still carries its channels in the samples.
    if samples >= 2 && layout.channels == 1 {
        layout.channels = samples;
    }

    let volume = if samples == layout.channels {
        let expected = layout.frames * layout.slices;
        if pages.len() != expected {
            return Err(ConvertError::DecodeError(format!(
                "found {} plane pages, layout {}x{} (frames x slices) needs {expected}",
                pages.len(),
                layout.frames,
                layout.slices
            )));
        }
        let mut volume = Vec::with_capacity(pages.len() * samples * plane);
        for page in &pages {
            for channel in 0..samples {
                extract_channel(page, channel, &mut volume);
            }
        }
        volume
    } else if samples == 1 {
        let expected = layout.frames * layout.slices * layout.channels;
        if pages.len() != expected {
            return Err(ConvertError::DecodeError(format!(
                "found {} channel-plane pages, layout {}x{}x{} (frames x slices x channels) needs {expected}",
                pages.len(),
                layout.frames,
                layout.slices,
                layout.channels
            )));
        }
        let mut volume = Vec::with_capacity(pages.len() * plane);
        for page in &pages {
            volume.extend_from_slice(&page.data);
        }
        volume
    } else {
        return Err(ConvertError::DecodeError(format!(
            "{samples} samples per page does not match {} declared channels",
            layout.channels
        )));
    };

    Ok((layout_shape(&layout, height, width), volume))
}

/// Singleton time and channel axes are dropped, matching how scientific
/// TIFF readers report these stacks.
fn layout_shape(layout: &StackLayout, height: usize, width: usize) -> Vec<usize> {
    let mut shape = Vec::with_capacity(5);
    if layout.frames > 1 {
        shape.push(layout.frames);
    }
    shape.push(layout.slices);
    if layout.channels > 1 {
        shape.push(layout.channels);
    }
    shape.push(height);
    shape.push(width);
    shape
}

fn extract_channel(page: &Page, channel: usize, out: &mut Vec<f32>) {
    let plane = page.width * page.height;
    if page.planar == 2 {
        out.extend_from_slice(&page.data[channel * plane..(channel + 1) * plane]);
    } else {
        out.extend(page.data.iter().skip(channel).step_by(page.samples).copied());
    }
}

fn parse_lsm_block(block: &[u8]) -> Option<LsmInfo> {
    let magic = read_u32_le(block, 0)?;
    if magic != CZ_MAGIC_PRE_2_0 && magic != CZ_MAGIC_2_0 {
        return None;
    }

    let slices = read_i32_le(block, CZ_DIMENSION_Z)?.max(1) as usize;
    let channels = read_i32_le(block, CZ_DIMENSION_CHANNELS)?.max(1) as usize;
    let frames = read_i32_le(block, CZ_DIMENSION_TIME)?.max(1) as usize;

    let voxel_size = VoxelSize {
        x: Some(read_f64_le(block, CZ_VOXEL_SIZE_X)?),
        y: Some(read_f64_le(block, CZ_VOXEL_SIZE_Y)?),
        z: Some(read_f64_le(block, CZ_VOXEL_SIZE_Z)?),
    };

    Some(LsmInfo {
        layout: StackLayout {
            channels,
            slices,
            frames,
        },
        voxel_size,
    })
}

fn parse_imagej_description(description: &str) -> Option<StackLayout> {
    if !description.starts_with("ImageJ=") {
        return None;
    }

    let mut channels = 1usize;
    let mut slices = 1usize;
    let mut frames = 1usize;
    for line in description.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let target = match key.trim() {
            "channels" => &mut channels,
            "slices" => &mut slices,
            "frames" => &mut frames,
            _ => continue,
        };
        *target = value.trim().parse().ok()?;
    }

    Some(StackLayout {
        channels: channels.max(1),
        slices: slices.max(1),
        frames: frames.max(1),
    })
}

fn read_u32_le(block: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(
        block.get(offset..offset + 4)?.try_into().ok()?,
    ))
}

fn read_i32_le(block: &[u8], offset: usize) -> Option<i32> {
    Some(i32::from_le_bytes(
        block.get(offset..offset + 4)?.try_into().ok()?,
    ))
}

fn read_f64_le(block: &[u8], offset: usize) -> Option<f64> {
    Some(f64::from_le_bytes(
        block.get(offset..offset + 8)?.try_into().ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tiff::encoder::{TiffEncoder, colortype};
    use tiff::tags::Tag;

    use super::*;

    fn cz_block(slices: i32, channels: i32, frames: i32, vx: f64, vy: f64, vz: f64) -> Vec<u8> {
        let mut block = vec![0u8; 88];
        block[0..4].copy_from_slice(&CZ_MAGIC_2_0.to_le_bytes());
        block[16..20].copy_from_slice(&slices.to_le_bytes());
        block[20..24].copy_from_slice(&channels.to_le_bytes());
        block[24..28].copy_from_slice(&frames.to_le_bytes());
        block[40..48].copy_from_slice(&vx.to_le_bytes());
        block[48..56].copy_from_slice(&vy.to_le_bytes());
        block[56..64].copy_from_slice(&vz.to_le_bytes());
        block
    }

    fn write_imagej_hyperstack(channels: usize, slices: usize, width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
            let description = format!(
                "ImageJ=1.54f\nimages={}\nchannels={channels}\nslices={slices}\nhyperstack=true\n",
                channels * slices
            );
            for page in 0..channels * slices {
                let mut image = encoder
                    .new_image::<colortype::Gray16>(width, height)
                    .unwrap();
                if page == 0 {
                    image
                        .encoder()
                        .write_tag(Tag::ImageDescription, description.as_str())
                        .unwrap();
                }
                let data = vec![(page * 100) as u16; (width * height) as usize];
                image.write_data(&data).unwrap();
            }
        }
        buffer.into_inner()
    }

    #[test]
    fn reads_imagej_hyperstack_channel_fastest() {
        let bytes = write_imagej_hyperstack(2, 3, 4, 4);

        let stack = TiffStackReader.read_stack(&bytes).unwrap();

        assert_eq!(stack.data.shape(), &[3, 2, 4, 4]);
        assert_eq!(stack.voxel_size, VoxelSize::default());
        for z in 0..3 {
            for c in 0..2 {
                let expected = ((z * 2 + c) * 100) as f32;
                assert_eq!(stack.data[[z, c, 0, 0]], expected);
            }
        }
    }

    #[test]
    fn reads_interleaved_rgb_page() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
            // Pixel i holds (10i, 10i + 1, 10i + 2).
            let data: Vec<u16> = (0..4)
                .flat_map(|i| [i * 10, i * 10 + 1, i * 10 + 2])
                .collect();
            encoder
                .write_image::<colortype::RGB16>(2, 2, &data)
                .unwrap();
        }

        let stack = TiffStackReader.read_stack(buffer.get_ref()).unwrap();

        assert_eq!(stack.data.shape(), &[1, 3, 2, 2]);
        assert_eq!(stack.data[[0, 0, 0, 1]], 10.0);
        assert_eq!(stack.data[[0, 1, 0, 0]], 1.0);
        assert_eq!(stack.data[[0, 2, 1, 1]], 32.0);
    }

    #[test]
    fn planar_pages_split_into_channel_planes() {
        // PlanarConfiguration=2: samples stored as whole planes, one per
        // channel, rather than interleaved per pixel.
        let page = Page {
            width: 2,
            height: 2,
            samples: 3,
            planar: 2,
            data: (0..12).map(|v| v as f32).collect(),
        };

        let mut plane = Vec::new();
        extract_channel(&page, 1, &mut plane);

        assert_eq!(plane, vec![4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn assembles_planar_multi_channel_stack() {
        let pages: Vec<Page> = (0..2)
            .map(|z| Page {
                width: 2,
                height: 2,
                samples: 3,
                planar: 2,
                data: (0..12).map(|v| (z * 100 + v) as f32).collect(),
            })
            .collect();
        let layout = StackLayout {
            channels: 3,
            slices: 2,
            frames: 1,
        };

        let (shape, volume) = assemble_pages(pages, Some(layout)).unwrap();

        assert_eq!(shape, vec![2, 3, 2, 2]);
        // Plane c of slice z holds z*100 + 4c .. z*100 + 4c + 3.
        assert_eq!(volume[0], 0.0);
        assert_eq!(volume[4], 4.0);
        assert_eq!(volume[12], 100.0);
        assert_eq!(volume[23], 111.0);
    }

    #[test]
    fn reads_multi_channel_lsm_stack() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
            let block = cz_block(2, 3, 1, 0.5e-6, 0.5e-6, 1.5e-6);
            for z in 0..2u16 {
                let mut image = encoder.new_image::<colortype::RGB16>(2, 2).unwrap();
                if z == 0 {
                    image
                        .encoder()
                        .write_tag(Tag::Unknown(CZ_LSMINFO_TAG), block.as_slice())
                        .unwrap();
                }
                // Pixel i of plane z holds (v, v + 1, v + 2), v = 1000z + 10i.
                let data: Vec<u16> = (0..4u16)
                    .flat_map(|i| {
                        let v = z * 1000 + i * 10;
                        [v, v + 1, v + 2]
                    })
                    .collect();
                image.write_data(&data).unwrap();
            }
        }

        let stack = TiffStackReader.read_stack(buffer.get_ref()).unwrap();

        assert_eq!(stack.data.shape(), &[2, 3, 2, 2]);
        assert_eq!(stack.data[[0, 0, 0, 1]], 10.0);
        assert_eq!(stack.data[[0, 1, 0, 0]], 1.0);
        assert_eq!(stack.data[[1, 2, 1, 1]], 1032.0);
        assert_eq!(stack.voxel_size.x, Some(0.5e-6));
        assert_eq!(stack.voxel_size.z, Some(1.5e-6));
    }

    #[test]
    fn reads_lsm_geometry_and_voxel_size() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
            let block = cz_block(2, 1, 1, 0.5e-6, 0.4e-6, 2.0e-6);
            for page in 0..2u16 {
                let mut image = encoder.new_image::<colortype::Gray16>(4, 4).unwrap();
                if page == 0 {
                    image
                        .encoder()
                        .write_tag(Tag::Unknown(CZ_LSMINFO_TAG), block.as_slice())
                        .unwrap();
                }
                let data = vec![page * 11; 16];
                image.write_data(&data).unwrap();
            }
        }

        let stack = TiffStackReader.read_stack(buffer.get_ref()).unwrap();

        assert_eq!(stack.data.shape(), &[2, 4, 4]);
        assert_eq!(stack.data[[1, 0, 0]], 11.0);
        assert_eq!(stack.voxel_size.x, Some(0.5e-6));
        assert_eq!(stack.voxel_size.y, Some(0.4e-6));
        assert_eq!(stack.voxel_size.z, Some(2.0e-6));
    }

    #[test]
    fn skips_reduced_resolution_pages() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();

            let mut full = encoder.new_image::<colortype::Gray16>(4, 4).unwrap();
            full.write_data(&vec![7u16; 16]).unwrap();

            let mut thumb = encoder.new_image::<colortype::Gray16>(2, 2).unwrap();
            thumb
                .encoder()
                .write_tag(Tag::NewSubfileType, 1u32)
                .unwrap();
            thumb.write_data(&vec![9u16; 4]).unwrap();
        }

        let stack = TiffStackReader.read_stack(buffer.get_ref()).unwrap();

        assert_eq!(stack.data.shape(), &[1, 4, 4]);
        assert_eq!(stack.data[[0, 0, 0]], 7.0);
    }

    #[test]
    fn reads_float_samples_unchanged() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
            let data = vec![0.25f32, 0.5, 0.75, 1.0];
            encoder
                .write_image::<colortype::Gray32Float>(2, 2, &data)
                .unwrap();
        }

        let stack = TiffStackReader.read_stack(buffer.get_ref()).unwrap();

        assert_eq!(stack.data.shape(), &[1, 2, 2]);
        assert_eq!(stack.data[[0, 0, 1]], 0.5);
    }

    #[test]
    fn rejects_inconsistent_page_shapes() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
            encoder
                .write_image::<colortype::Gray16>(4, 4, &vec![0u16; 16])
                .unwrap();
            encoder
                .write_image::<colortype::Gray16>(8, 8, &vec![0u16; 64])
                .unwrap();
        }

        let result = TiffStackReader.read_stack(buffer.get_ref());

        assert!(matches!(result, Err(ConvertError::DecodeError(_))));
    }

    #[test]
    fn rejects_page_count_mismatch() {
        // Declares 2x3 hyperstack pages but only writes 4.
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
            let description = "ImageJ=1.54f\nimages=6\nchannels=2\nslices=3\n";
            for page in 0..4u16 {
                let mut image = encoder.new_image::<colortype::Gray16>(4, 4).unwrap();
                if page == 0 {
                    image
                        .encoder()
                        .write_tag(Tag::ImageDescription, description)
                        .unwrap();
                }
                image.write_data(&vec![page; 16]).unwrap();
            }
        }

        let result = TiffStackReader.read_stack(buffer.get_ref());

        assert!(matches!(result, Err(ConvertError::DecodeError(_))));
    }

    #[test]
    fn rejects_non_tiff_input() {
        let result = TiffStackReader.read_stack(b"plainly not a tiff");

        assert!(matches!(result, Err(ConvertError::DecodeError(_))));
    }

    #[test]
    fn lsm_block_with_wrong_magic_is_ignored() {
        let mut block = cz_block(4, 2, 1, 1e-6, 1e-6, 1e-6);
        block[0..4].copy_from_slice(&0xdead_beefu32.to_le_bytes());

        assert!(parse_lsm_block(&block).is_none());
    }

    #[test]
    fn imagej_description_defaults_missing_keys_to_one() {
        let layout = parse_imagej_description("ImageJ=1.54f\nimages=5\nslices=5\n").unwrap();

        assert_eq!(layout.channels, 1);
        assert_eq!(layout.slices, 5);
        assert_eq!(layout.frames, 1);
    }
}
