//! Error types for segmentation and alignment.

use thiserror::Error;
use tractk_core::ImageError;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// No voxel of the anatomical volume was classified as brain.
    #[error("no brain tissue detected: {0}")]
    NoBrainTissue(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Loss became NaN or infinite during optimisation.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    /// Grid or transform problem raised by the image model.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Reading or writing an artifact failed.
    #[error("artifact I/O failed: {0:#}")]
    Io(#[from] anyhow::Error),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    pub fn no_brain_tissue(msg: impl Into<String>) -> Self {
        Self::NoBrainTissue(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }
}
