//! Mean Squared Error metric implementation.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use tractk_core::image::Image;
use tractk_core::interpolation::LinearInterpolator;
use tractk_core::transform::Transform;
use super::trait_::{warped_values, Metric};

/// MSE = (1/N) * sum((Fixed(x) - Moving(T(x)))^2)
#[derive(Clone, Default)]
pub struct MeanSquaredError {
    interpolator: LinearInterpolator,
}

impl MeanSquaredError {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric<B> for MeanSquaredError {
    fn forward(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> Tensor<B, 1> {
        let moving_values = warped_values(fixed, moving, transform, &self.interpolator);
        let fixed_values = fixed.data().clone().reshape([fixed.num_voxels()]);
        (moving_values - fixed_values).powf_scalar(2.0).mean()
    }

    fn name(&self) -> &'static str {
        "MeanSquaredError"
    }
}
