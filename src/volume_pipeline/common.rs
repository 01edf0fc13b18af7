//! Common utilities module
//!
//! This module contains shared utilities used across the volume pipeline.

pub mod error;

pub use error::{ConvertError, Result};
