//! Error types for the color_hints library

use thiserror::Error;

/// Result type alias for color_hints operations
pub type Result<T> = std::result::Result<T, HintError>;

/// Every failure the encoder can surface to its caller.
///
/// Nothing is retried internally; the caller decides whether to skip the
/// image, retry at a higher level, or abort.
#[derive(Error, Debug)]
pub enum HintError {
    /// Mask side length is zero or does not fit the 2-byte header field
    #[error("Invalid mask size: {size} (must be within 1..=65535)")]
    InvalidMaskSize { size: usize },

    /// Patch radius does not fit the 1-byte header field
    #[error("Patch radius {radius} does not fit in one byte (max 255)")]
    PatchRadiusTooLarge { radius: usize },

    /// A hint was placed outside the mask
    #[error("Point ({row}, {col}) lies outside a {size}x{size} mask")]
    OutOfBounds { row: usize, col: usize, size: usize },

    /// Histogram has more bins than a 2-byte signed index can address here
    #[error("Histogram has {len} bins; at most {max} can be encoded")]
    HistogramTooLong { len: usize, max: usize },

    /// Mask buffers could not be allocated
    #[error("Could not allocate a mask of {cells} cells")]
    AllocationFailed { cells: usize },

    /// File ended before the mask header was complete
    #[error("Mask file header is truncated")]
    TruncatedHeader,

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    /// Global mode requested without a colour distribution model
    #[error("Method {method} requires a color distribution model")]
    MissingModel { method: String },

    /// Unreadable or unwritable path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// A batch worker task died before reporting
    #[error("Worker failed: {message}")]
    Worker { message: String },
}

impl HintError {
    /// Create an invalid parameter error
    pub fn invalid(parameter: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }

    /// True for errors raised before any I/O was attempted.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HintError::InvalidMaskSize { .. }
                | HintError::PatchRadiusTooLarge { .. }
                | HintError::HistogramTooLong { .. }
                | HintError::InvalidParameter { .. }
                | HintError::MissingModel { .. }
        )
    }
}
