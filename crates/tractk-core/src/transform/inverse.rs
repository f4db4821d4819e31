//! Numerical inverse of transforms without a closed form.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use super::record::TransformRecord;
use super::trait_::Transform;

/// Default number of fixed-point iterations.
pub const DEFAULT_INVERSE_ITERATIONS: usize = 20;

/// Inverts `forward` by the fixed-point iteration `x <- x + (y - T(x))`.
///
/// Converges when the displacement of `forward` is a contraction, which
/// holds for the smooth, small deformations produced by registration.
pub struct FixedPointInverse<B: Backend, const D: usize> {
    forward: Box<dyn Transform<B, D>>,
    iterations: usize,
}

impl<B: Backend, const D: usize> FixedPointInverse<B, D> {
    pub fn new(forward: Box<dyn Transform<B, D>>, iterations: usize) -> Self {
        Self { forward, iterations }
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for FixedPointInverse<B, D> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = points.clone();
        for _ in 0..self.iterations {
            let residual = points.clone() - self.forward.transform_points(x.clone());
            x = x + residual;
        }
        x
    }

    fn to_record(&self) -> TransformRecord {
        TransformRecord::Inverse {
            forward: Box::new(self.forward.to_record()),
            iterations: self.iterations,
        }
    }
}
