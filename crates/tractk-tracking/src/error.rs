//! Error types for model fitting and tractography.

use thiserror::Error;
use tractk_core::ImageError;

#[derive(Error, Debug)]
pub enum TrackingError {
    /// Unknown model, classifier, strategy or sphere name, or a numeric
    /// setting outside its domain.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Parcellation without a single nonzero voxel.
    #[error("no nonzero voxels in parcellation: {0}")]
    EmptyParcellation(String),

    /// Seeding produced no seed point.
    #[error("empty seed set: {0}")]
    EmptySeeds(String),

    /// Gradient table does not match the diffusion series.
    #[error("gradient table mismatch: {0}")]
    GradientMismatch(String),

    /// Input volume violates a precondition other than the above.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("artifact I/O failed: {0:#}")]
    Io(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TrackingError>;

impl TrackingError {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the error comes from configuration rather than data.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_))
    }
}
