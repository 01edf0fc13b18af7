//! Per-channel intensity processing module
//!
//! This module contains the pure per-slice operations applied to every
//! display channel before serialization.

mod channel;

pub use channel::{decimate_xy, normalize_slice, process_channel, subtract_background};
