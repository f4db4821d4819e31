use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Samples a `[Z, Y, X]` volume at continuous indices.
pub trait Interpolator<B: Backend> {
    /// `indices` is `[N, 3]` ordered `(x, y, z)`; returns `[N]` values.
    /// Indices outside the grid are clamped to the border.
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1>;
}
