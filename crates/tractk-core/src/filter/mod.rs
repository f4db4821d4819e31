//! Image filters.

pub mod resample;
pub mod morphology;

pub use resample::ResampleImageFilter;
pub use morphology::{binarize, dilate, erode};
