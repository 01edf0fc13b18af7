//! Per-slice channel processing.
//!
//! Each display channel goes through the same three steps, slice by slice
//! along Z: Gaussian background subtraction, robust percentile
//! normalization to `[0, 1]`, and finally XY decimation of the restacked
//! volume. Z resolution is never reduced.

use std::num::NonZeroUsize;

use image::{ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, s};

/// Lower robust percentile for display normalization.
const PERCENTILE_LO: f64 = 0.5;
/// Upper robust percentile for display normalization.
const PERCENTILE_HI: f64 = 99.5;

/// Estimates the slowly-varying background of a slice as a Gaussian blur
/// with standard deviation `sigma` pixels, subtracts it, and floors
/// negatives at zero. `sigma <= 0` disables subtraction and returns the
/// slice unchanged.
pub fn subtract_background(slice: ArrayView2<'_, f32>, sigma: f32) -> Array2<f32> {
    if sigma <= 0.0 {
        return slice.to_owned();
    }

    let (height, width) = slice.dim();
    if height == 0 || width == 0 {
        return slice.to_owned();
    }

    let image: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
            Luma([slice[(y as usize, x as usize)]])
        });
    let background = gaussian_blur_f32(&image, sigma);

    // The blur's truncated kernel is not renormalized, so its DC gain
    // sits below one and the raw estimate darkens even a constant
    // slice. Dividing by the blur of an all-ones slice restores unit
    // gain and evens out border falloff.
    let ones: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_pixel(width as u32, height as u32, Luma([1.0]));
    let gain = gaussian_blur_f32(&ones, sigma);

    Array2::from_shape_fn((height, width), |(y, x)| {
        let estimate =
            background.get_pixel(x as u32, y as u32)[0] / gain.get_pixel(x as u32, y as u32)[0];
        (slice[(y, x)] - estimate).max(0.0)
    })
}

/// Rescales a slice to `[0, 1]` between its 0.5th and 99.5th percentile
/// values, clipping everything outside. A degenerate range (constant or
/// empty slice) yields all zeros rather than an error.
pub fn normalize_slice(slice: ArrayView2<'_, f32>) -> Array2<f32> {
    if slice.is_empty() {
        return Array2::zeros(slice.dim());
    }

    let mut sorted: Vec<f32> = slice.iter().copied().collect();
    sorted.sort_unstable_by(f32::total_cmp);

    let lo = percentile_of_sorted(&sorted, PERCENTILE_LO);
    let hi = percentile_of_sorted(&sorted, PERCENTILE_HI);

    if hi <= lo {
        return Array2::zeros(slice.dim());
    }

    let range = hi - lo;
    slice.mapv(|v| ((v - lo) / range).clamp(0.0, 1.0))
}

/// Percentile of pre-sorted, non-empty samples using linear interpolation
/// between closest ranks.
fn percentile_of_sorted(sorted: &[f32], percentile: f64) -> f32 {
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = percentile / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    (sorted[lower] as f64 * (1.0 - weight) + sorted[upper] as f64 * weight) as f32
}

/// Keeps every `ds`-th sample along Y and X, starting at index 0, with no
/// anti-alias prefilter. Output extents are `ceil(len / ds)` per axis, so
/// `ds = 1` keeps the volume unchanged. Z is untouched.
pub fn decimate_xy(volume: ArrayView3<'_, f32>, ds: NonZeroUsize) -> Array3<f32> {
    let step = ds.get() as isize;
    volume.slice(s![.., ..;step, ..;step]).to_owned()
}

/// Runs the full channel pipeline on a `(Z, Y, X)` view: per-slice
/// background subtraction and normalization, then XY decimation of the
/// restacked volume. Output values are f32 in `[0, 1]`, never NaN.
pub fn process_channel(channel: ArrayView3<'_, f32>, sigma: f32, ds: NonZeroUsize) -> Array3<f32> {
    let mut processed = Array3::zeros(channel.dim());

    for (z, slice) in channel.outer_iter().enumerate() {
        let cleaned = subtract_background(slice, sigma);
        let normalized = normalize_slice(cleaned.view());
        processed.index_axis_mut(Axis(0), z).assign(&normalized);
    }

    decimate_xy(processed.view(), ds)
}
