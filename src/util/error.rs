//! Error types for faceboxes.

use thiserror::Error;

/// Result alias for faceboxes operations.
pub type FaceBoxesResult<T> = std::result::Result<T, FaceBoxesError>;

/// Errors that can occur while configuring or running the post-processor.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FaceBoxesError {
    /// Image or tensor dimensions are zero or overflow.
    #[error("invalid dimensions: {height}x{width}")]
    InvalidDimensions { height: usize, width: usize },
    /// A configuration value is out of range.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },
    /// The network does not expose exactly one input.
    #[error("expected 1 input tensor, got {got}")]
    InputCount { got: usize },
    /// The network does not expose exactly two outputs.
    #[error("expected 2 output tensors, got {got}")]
    OutputCount { got: usize },
    /// The input tensor shape is not `[1, 3, H, W]`.
    #[error("invalid input shape {shape:?}: {reason}")]
    InvalidInputShape {
        shape: Vec<usize>,
        reason: &'static str,
    },
    /// The output tensors are not `[1, N, 4]` and `[1, N, 2]`.
    #[error("expected output shapes [1, N, 4] and [1, N, 2], got {first:?} and {second:?}")]
    InvalidOutputShape {
        first: Vec<usize>,
        second: Vec<usize>,
    },
    /// The generated anchor set does not match the network's row count.
    #[error("anchor count {anchors} does not match output rows {rows}")]
    AnchorCountMismatch { anchors: usize, rows: usize },
    /// Paired sequences disagree in length.
    #[error("row count mismatch for {context}: expected {expected}, got {got}")]
    RowCountMismatch {
        expected: usize,
        got: usize,
        context: &'static str,
    },
    /// A tensor buffer is shorter than its shape requires.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// A named output tensor was not supplied.
    #[error("missing output tensor '{name}'")]
    MissingOutput { name: String },
    /// Failed to read image metadata.
    #[error("image io error: {reason}")]
    ImageIo { reason: String },
}
