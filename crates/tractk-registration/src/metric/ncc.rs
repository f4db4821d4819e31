//! Normalized Cross Correlation (NCC) metric implementation.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use tractk_core::image::Image;
use tractk_core::interpolation::LinearInterpolator;
use tractk_core::transform::Transform;
use super::trait_::{warped_values, Metric};

/// Zero-normalised cross correlation, returned negated so that perfect
/// correlation gives the minimum loss of -1.
#[derive(Clone, Default)]
pub struct NormalizedCrossCorrelation {
    interpolator: LinearInterpolator,
}

impl NormalizedCrossCorrelation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric<B> for NormalizedCrossCorrelation {
    fn forward(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> Tensor<B, 1> {
        let m = warped_values(fixed, moving, transform, &self.interpolator);
        let f = fixed.data().clone().reshape([fixed.num_voxels()]);

        let f_centered = f.clone() - f.mean();
        let m_centered = m.clone() - m.mean();

        let numerator = (f_centered.clone() * m_centered.clone()).sum();
        let denom_f = f_centered.powf_scalar(2.0).sum();
        let denom_m = m_centered.powf_scalar(2.0).sum();
        let denominator = (denom_f * denom_m).sqrt() + 1e-10;

        (numerator / denominator).neg()
    }

    fn name(&self) -> &'static str {
        "NormalizedCrossCorrelation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Shape, TensorData};
    use burn_ndarray::NdArray;
    use tractk_core::spatial::{Direction, Point, Spacing};
    use tractk_core::transform::AffineTransform;

    type B = NdArray<f32>;

    fn create_test_image(data: Vec<f32>, shape: [usize; 3]) -> Image<B, 3> {
        let device = Default::default();
        let tensor = Tensor::from_data(TensorData::new(data, Shape::new(shape)), &device);
        Image::new(tensor, Point::origin(), Spacing::uniform(1.0), Direction::identity())
    }

    fn identity() -> AffineTransform<B, 3> {
        AffineTransform::identity(None, &Default::default())
    }

    #[test]
    fn test_ncc_linear_relationship() {
        let size = 10;
        let data1: Vec<f32> = (0..size * size * size).map(|x| x as f32).collect();
        let data2: Vec<f32> = data1.iter().map(|&x| 2.0 * x + 10.0).collect();
        let fixed = create_test_image(data1, [size, size, size]);
        let moving = create_test_image(data2, [size, size, size]);

        let loss = NormalizedCrossCorrelation::new().forward(&fixed, &moving, &identity()).into_scalar();
        assert!((loss + 1.0).abs() < 1e-4, "NCC for linear relationship should be 1.0 (loss -1.0), got {}", loss);
    }

    #[test]
    fn test_ncc_inverse_relationship() {
        let size = 10;
        let data1: Vec<f32> = (0..size * size * size).map(|x| x as f32).collect();
        let data2: Vec<f32> = data1.iter().map(|&x| -x).collect();
        let fixed = create_test_image(data1, [size, size, size]);
        let moving = create_test_image(data2, [size, size, size]);

        let loss = NormalizedCrossCorrelation::new().forward(&fixed, &moving, &identity()).into_scalar();
        assert!((loss - 1.0).abs() < 1e-4, "got {}", loss);
    }

    #[test]
    fn test_ncc_uncorrelated() {
        let data1: Vec<f32> = (0..100).map(|x| x as f32).collect();
        let data2: Vec<f32> = (0..100).map(|x| if x % 2 == 0 { 10.0 } else { -10.0 }).collect();
        // tensor shape is [Z, Y, X]; a single row along x
        let fixed = create_test_image(data1, [1, 1, 100]);
        let moving = create_test_image(data2, [1, 1, 100]);

        let loss = NormalizedCrossCorrelation::new().forward(&fixed, &moving, &identity()).into_scalar();
        assert!(loss.abs() < 0.5, "got loss {}", loss);
    }
}
