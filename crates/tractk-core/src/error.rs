//! Errors raised when images are built or combined.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    /// Voxel buffer length does not match the requested shape.
    #[error("voxel buffer holds {actual} values but shape {shape:?} needs {expected}")]
    BufferLength {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    /// Two images that must share a voxel grid do not.
    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    /// Direction matrix has no inverse.
    #[error("direction matrix is singular")]
    SingularDirection,

    /// Transform record cannot be turned back into a transform.
    #[error("invalid transform record: {0}")]
    InvalidTransform(String),
}

pub type Result<T> = std::result::Result<T, ImageError>;
