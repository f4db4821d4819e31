//! Spatial transforms.
//!
//! Every transform maps `[N, D]` physical points and can describe itself as a
//! [`TransformRecord`] so it can be written to disk and rebuilt on any
//! backend.

pub mod trait_;
pub mod affine;
pub mod bspline;
pub mod chained;
pub mod composite;
pub mod inverse;
pub mod record;

pub use trait_::Transform;
pub use affine::AffineTransform;
pub use bspline::BSplineTransform;
pub use chained::ChainedTransform;
pub use composite::CompositeTransform;
pub use inverse::FixedPointInverse;
pub use record::TransformRecord;
