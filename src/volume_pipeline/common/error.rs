use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Failed to read input file: {0}")]
    InputReadError(String),

    #[error("Failed to write output file: {0}")]
    OutputWriteError(String),

    #[error("Failed to decode stack: {0}")]
    DecodeError(String),

    #[error("Failed to encode NPZ bundle: {0}")]
    EncodeError(String),

    #[error("Expected a (Z, C, Y, X) stack, got shape {0:?}")]
    ShapeError(Vec<usize>),

    #[error("Expected at least 3 channels, got {0}")]
    ChannelCountError(usize),

    #[error("Channel map index {index} out of range for {channels}-channel stack")]
    ChannelMapError { index: usize, channels: usize },

    #[error("Invalid channel map: {0}")]
    MapParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
