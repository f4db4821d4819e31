//! Core data model for tractk: images with physical geometry, host volumes,
//! spatial transforms, interpolation and resampling.

pub mod error;
pub mod image;
pub mod spatial;
pub mod transform;
pub mod interpolation;
pub mod filter;

pub use error::ImageError;
pub use image::{DiffusionImage, Image, ImageMetadata, TissueMaps, Volume};
pub use spatial::{Direction, Point, Spacing, Vector};
