//! Error types for frame decoding and encoding

use thiserror::Error;

/// Errors that can occur while decoding or building a frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough bytes for a frame
    #[error("frame too short: need {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },

    /// Frame does not begin with 0x7878 or 0x7979
    #[error("bad start marker: {0:02X} {1:02X}")]
    BadStartMarker(u8, u8),

    /// Frame does not end with 0x0D0A
    #[error("bad stop marker: {0:02X} {1:02X}")]
    BadStopMarker(u8, u8),

    /// Declared length cannot describe a valid frame
    #[error("invalid length field: {0}")]
    InvalidLength(usize),

    /// Payload shorter than the protocol requires
    #[error("payload truncated for protocol 0x{protocol:02X}: need {need} bytes, got {got}")]
    PayloadTruncated { protocol: u8, need: usize, got: usize },

    /// Command text does not fit in a standard frame
    #[error("command too long: {0} bytes")]
    CommandTooLong(usize),
}

/// Result type for codec operations
pub type FrameResult<T> = Result<T, FrameError>;
