//! Image types and voxel-grid geometry.

pub mod image;
pub mod metadata;
pub mod grid;
pub mod diffusion;
pub mod volume;
pub mod tissue;

pub use image::Image;
pub use metadata::ImageMetadata;
pub use grid::generate_grid;
pub use diffusion::DiffusionImage;
pub use volume::Volume;
pub use tissue::TissueMaps;
