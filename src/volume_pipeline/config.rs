//! Conversion configuration types

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::volume_pipeline::common::error::{ConvertError, Result};

/// Default XY decimation stride.
pub const DEFAULT_DS: NonZeroUsize = NonZeroUsize::new(6).unwrap();

/// Default background blur standard deviation, in pixels.
pub const DEFAULT_SIGMA: f32 = 12.0;

/// Default source-channel assignment for the r/g/b display channels.
pub const DEFAULT_CHANNEL_MAP: ChannelMap = ChannelMap([2, 0, 1]);

/// Assignment of source channel indices to the r, g and b display
/// channels, in that order. Indices may repeat; range checks against the
/// actual channel count happen at assembly time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMap(pub [usize; 3]);

impl ChannelMap {
    pub fn indices(&self) -> [usize; 3] {
        self.0
    }
}

impl FromStr for ChannelMap {
    type Err = ConvertError;

    /// Parses `"r,g,b"`, exactly three comma-separated non-negative
    /// integers. Surrounding whitespace per entry is accepted.
    fn from_str(s: &str) -> Result<Self> {
        let entries: Vec<&str> = s.split(',').collect();
        if entries.len() != 3 {
            return Err(ConvertError::MapParseError(format!(
                "expected 3 comma-separated indices, got {} in {s:?}",
                entries.len()
            )));
        }

        let mut indices = [0usize; 3];
        for (slot, entry) in indices.iter_mut().zip(&entries) {
            *slot = entry.trim().parse().map_err(|_| {
                ConvertError::MapParseError(format!("{entry:?} is not a non-negative integer"))
            })?;
        }

        Ok(ChannelMap(indices))
    }
}

impl fmt::Display for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.0[0], self.0[1], self.0[2])
    }
}

/// Configuration for stack to NPZ conversion
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// XY decimation stride (1 keeps full resolution)
    pub ds: NonZeroUsize,
    /// Background blur standard deviation in pixels; <= 0 disables
    /// background subtraction
    pub sigma: f32,
    /// Source channel indices for the r/g/b display channels
    pub channel_map: ChannelMap,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            ds: DEFAULT_DS,
            sigma: DEFAULT_SIGMA,
            channel_map: DEFAULT_CHANNEL_MAP,
        }
    }
}

impl ConvertConfig {
    pub fn builder() -> ConvertConfigBuilder {
        ConvertConfigBuilder::default()
    }
}

/// Builder for ConvertConfig
#[derive(Default)]
pub struct ConvertConfigBuilder {
    ds: Option<NonZeroUsize>,
    sigma: Option<f32>,
    channel_map: Option<ChannelMap>,
}

impl ConvertConfigBuilder {
    pub fn ds(mut self, ds: NonZeroUsize) -> Self {
        self.ds = Some(ds);
        self
    }

    pub fn sigma(mut self, sigma: f32) -> Self {
        self.sigma = Some(sigma);
        self
    }

    pub fn channel_map(mut self, channel_map: ChannelMap) -> Self {
        self.channel_map = Some(channel_map);
        self
    }

    pub fn build(self) -> ConvertConfig {
        let default = ConvertConfig::default();
        ConvertConfig {
            ds: self.ds.unwrap_or(default.ds),
            sigma: self.sigma.unwrap_or(default.sigma),
            channel_map: self.channel_map.unwrap_or(default.channel_map),
        }
    }
}
