//! Error types for image decoding.

use core::fmt;

/// The main error type for image decoding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Errors related to the structure of the image dictionary or data.
    Format(FormatError),
    /// Feature outside the supported set.
    Unsupported,
}

/// Errors related to the structure of the image dictionary or data.
///
/// These are recoverable at the document level but fatal for the image
/// they occur in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// Width or height below one pixel.
    InvalidDimensions,
    /// A non-mask image without a bits-per-component entry.
    MissingBitsPerComponent,
    /// A gray buffer was requested from a multi-component image.
    NotGrayscale,
    /// A mask entry in an unexpected shape.
    UnsupportedMask,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e) => write!(f, "{e}"),
            Self::Unsupported => write!(f, "unsupported feature"),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions => write!(f, "invalid image dimensions"),
            Self::MissingBitsPerComponent => write!(f, "missing bits per component"),
            Self::NotGrayscale => write!(f, "image has more than one component"),
            Self::UnsupportedMask => write!(f, "mask entry in an unexpected shape"),
        }
    }
}

impl core::error::Error for DecodeError {}
impl core::error::Error for FormatError {}

impl From<FormatError> for DecodeError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

/// Result type for image decoding operations.
pub type Result<T> = core::result::Result<T, DecodeError>;

macro_rules! bail {
    ($err:expr) => {
        return Err($err.into())
    };
}

macro_rules! err {
    ($err:expr) => {
        Err($err.into())
    };
}

pub(crate) use bail;
pub(crate) use err;
