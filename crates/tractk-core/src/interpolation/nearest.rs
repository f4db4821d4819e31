//! Nearest-neighbour interpolation for label and mask volumes.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use super::trait_::Interpolator;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [d0, d1, d2] = data.dims();

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let x_i = x.round().clamp(0.0, (d2 - 1) as f64).int();
        let y_i = y.round().clamp(0.0, (d1 - 1) as f64).int();
        let z_i = z.round().clamp(0.0, (d0 - 1) as f64).int();

        let idx = z_i * (d1 * d2) as i32 + y_i * d2 as i32 + x_i;
        data.clone().reshape([d0 * d1 * d2]).gather(0, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Shape, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_nearest_picks_closest_label() {
        let device = Default::default();
        let labels = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], Shape::new([2, 2, 2])),
            &device,
        );
        let indices = Tensor::<TestBackend, 2>::from_floats([[0.4, 0.0, 0.0], [0.6, 0.9, 0.2], [0.9, 0.9, 0.9]], &device);
        let out = NearestNeighborInterpolator::new().interpolate(&labels, indices).into_data().to_vec::<f32>().unwrap();
        assert_eq!(out, vec![1.0, 4.0, 8.0]);
    }
}
