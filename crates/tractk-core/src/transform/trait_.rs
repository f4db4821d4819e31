//! Transform trait for spatial coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use super::record::TransformRecord;

/// Maps points from one physical space to another.
///
/// The trait does not require `burn::module::Module`, so trainable
/// transforms (used by the optimizer) and plain ones rebuilt from records
/// share it.
pub trait Transform<B: Backend, const D: usize> {
    /// Apply the transform to `[N, D]` points.
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Inverse transform, when one can be built.
    fn inverse(&self) -> Option<Box<dyn Transform<B, D>>> {
        None
    }

    /// Parameter snapshot used for persistence.
    fn to_record(&self) -> TransformRecord;
}

impl<B: Backend, const D: usize> Transform<B, D> for Box<dyn Transform<B, D>> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.as_ref().transform_points(points)
    }

    fn inverse(&self) -> Option<Box<dyn Transform<B, D>>> {
        self.as_ref().inverse()
    }

    fn to_record(&self) -> TransformRecord {
        self.as_ref().to_record()
    }
}
