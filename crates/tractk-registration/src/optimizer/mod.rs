//! Optimizers updating trainable transforms.

pub mod trait_;
pub mod adam;

pub use trait_::Optimizer;
pub use adam::AdamOptimizer;
