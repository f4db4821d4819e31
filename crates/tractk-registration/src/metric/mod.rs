//! Similarity metrics driving the optimiser.

pub mod trait_;
pub mod mse;
pub mod ncc;

pub use trait_::{Metric, MetricKind};
pub use mse::MeanSquaredError;
pub use ncc::NormalizedCrossCorrelation;
