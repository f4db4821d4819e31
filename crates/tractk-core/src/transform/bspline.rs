//! Cubic B-spline free-form deformation.

use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};
use crate::image::ImageMetadata;
use crate::spatial::Point;
use super::record::{tensor_values, TransformRecord};
use super::trait_::Transform;

/// Displacement field interpolated from a regular grid of control points.
///
/// Control point `(i, j, k)` sits at `origin + (i, j, k) * spacing` in
/// physical space and holds a displacement; `T(x) = x + sum(w * c)` over the
/// 4x4x4 neighbourhood of `x`.
#[derive(Module, Debug)]
pub struct BSplineTransform<B: Backend> {
    grid_size: [usize; 3],
    origin: [f64; 3],
    physical_size: [f64; 3],
    /// Control point displacements `[num_control_points, 3]`, x fastest.
    coefficients: Param<Tensor<B, 2>>,
    control_point_spacing: [f64; 3],
}

impl<B: Backend> BSplineTransform<B> {
    pub fn new(
        grid_size: [usize; 3],
        origin: [f64; 3],
        physical_size: [f64; 3],
        coefficients: Tensor<B, 2>,
    ) -> Self {
        let control_point_spacing: [f64; 3] =
            std::array::from_fn(|i| physical_size[i] / (grid_size[i].max(2) - 1) as f64);
        Self {
            grid_size,
            origin,
            physical_size,
            coefficients: Param::from_tensor(coefficients),
            control_point_spacing,
        }
    }

    /// Zero-displacement grid spanning the physical bounding box of an image grid.
    pub fn covering(
        metadata: &ImageMetadata<3>,
        shape: [usize; 3],
        grid_size: [usize; 3],
        device: &B::Device,
    ) -> Self {
        let [nz, ny, nx] = shape;
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for corner in 0..8 {
            let index = Point::new([
                if corner & 1 == 0 { 0.0 } else { (nx - 1) as f64 },
                if corner & 2 == 0 { 0.0 } else { (ny - 1) as f64 },
                if corner & 4 == 0 { 0.0 } else { (nz - 1) as f64 },
            ]);
            let p = metadata.index_to_physical(&index);
            for a in 0..3 {
                lo[a] = lo[a].min(p[a]);
                hi[a] = hi[a].max(p[a]);
            }
        }
        let size: [f64; 3] = std::array::from_fn(|a| (hi[a] - lo[a]).max(1e-3));
        let n: usize = grid_size.iter().product();
        let coefficients = Tensor::<B, 2>::zeros([n, 3], device);
        Self::new(grid_size, lo, size, coefficients)
    }

    pub fn grid_size(&self) -> [usize; 3] {
        self.grid_size
    }

    pub fn physical_size(&self) -> [f64; 3] {
        self.physical_size
    }

    pub fn control_point_spacing(&self) -> [f64; 3] {
        self.control_point_spacing
    }

    pub fn coefficients(&self) -> Tensor<B, 2> {
        self.coefficients.val()
    }

    /// Cubic B-spline basis at `u` in `[0, 1)`, stacked `[N, 4]`.
    fn basis(u: Tensor<B, 1>) -> Tensor<B, 2> {
        let one_minus_u = u.clone().neg().add_scalar(1.0);
        let u2 = u.clone().powf_scalar(2.0);
        let u3 = u.clone().powf_scalar(3.0);

        let b0 = one_minus_u.powf_scalar(3.0) / 6.0;
        let b1 = (u3.clone().mul_scalar(3.0) - u2.clone().mul_scalar(6.0)).add_scalar(4.0) / 6.0;
        let b2 = (u3.clone().mul_scalar(-3.0) + u2.mul_scalar(3.0) + u.mul_scalar(3.0)).add_scalar(1.0) / 6.0;
        let b3 = u3 / 6.0;

        Tensor::cat(
            vec![
                b0.unsqueeze_dim::<2>(1),
                b1.unsqueeze_dim::<2>(1),
                b2.unsqueeze_dim::<2>(1),
                b3.unsqueeze_dim::<2>(1),
            ],
            1,
        )
    }
}

impl<B: Backend> Transform<B, 3> for BSplineTransform<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let batch = points.dims()[0];

        let origin = Tensor::<B, 1>::from_data(
            TensorData::new(self.origin.map(|v| v as f32).to_vec(), Shape::new([3])),
            &device,
        )
        .reshape([1, 3]);
        let spacing = Tensor::<B, 1>::from_data(
            TensorData::new(self.control_point_spacing.map(|v| v as f32).to_vec(), Shape::new([3])),
            &device,
        )
        .reshape([1, 3]);

        let grid_coords = (points.clone() - origin) / spacing;
        let floor = grid_coords.clone().floor();
        let u = grid_coords - floor.clone();
        let base = floor.int() - 1;

        let bx = Self::basis(u.clone().narrow(1, 0, 1).squeeze(1));
        let by = Self::basis(u.clone().narrow(1, 1, 1).squeeze(1));
        let bz = Self::basis(u.narrow(1, 2, 1).squeeze(1));

        // W[b, i, j, k] = Bx[b, i] * By[b, j] * Bz[b, k]
        let weights = bx.unsqueeze_dim::<3>(2).unsqueeze_dim::<4>(3)
            * by.unsqueeze_dim::<3>(1).unsqueeze_dim::<4>(3)
            * bz.unsqueeze_dim::<3>(1).unsqueeze_dim::<4>(1);
        let weights = weights.reshape([batch, 64, 1]);

        let [nx, ny, nz] = self.grid_size.map(|v| v as i32);
        let range = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 3], &device);
        let zeros = Tensor::<B, 4, Int>::zeros([1, 4, 4, 4], &device);

        let axis = |a: usize, offsets: Tensor<B, 4, Int>, n: i32| {
            let b = base.clone().narrow(1, a, 1).unsqueeze_dim::<3>(2).unsqueeze_dim::<4>(3);
            (b + offsets + zeros.clone()).reshape([batch, 64]).clamp(0, n - 1)
        };
        let ix = axis(0, range.clone().reshape([1, 4, 1, 1]), nx);
        let iy = axis(1, range.clone().reshape([1, 1, 4, 1]), ny);
        let iz = axis(2, range.reshape([1, 1, 1, 4]), nz);

        let flat = iz * (nx * ny) + iy * nx + ix;
        let coeffs = self
            .coefficients
            .val()
            .select(0, flat.reshape([batch * 64]))
            .reshape([batch, 64, 3]);

        let displacement = (coeffs * weights).sum_dim(1).squeeze(1);
        points + displacement
    }

    fn to_record(&self) -> TransformRecord {
        TransformRecord::BSpline {
            grid_size: self.grid_size.to_vec(),
            origin: self.origin.to_vec(),
            physical_size: self.physical_size.to_vec(),
            coefficients: tensor_values(self.coefficients.val()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_single_control_point_displacement() {
        let device = Default::default();
        // 4x4x4 control grid over 30mm starting at (5, 5, 5): spacing 10mm
        let mut coeffs = vec![0.0f32; 64 * 3];
        // control point (1, 1, 1) -> flat 21
        coeffs[21 * 3..21 * 3 + 3].copy_from_slice(&[1.0, 1.0, 1.0]);
        let coefficients = Tensor::<TestBackend, 2>::from_data(TensorData::new(coeffs, Shape::new([64, 3])), &device);
        let transform = BSplineTransform::new([4, 4, 4], [5.0, 5.0, 5.0], [30.0, 30.0, 30.0], coefficients);

        let points = Tensor::<TestBackend, 2>::from_floats([[15.0, 15.0, 15.0]], &device);
        let out = transform.transform_points(points).into_data().to_vec::<f32>().unwrap();

        // On a knot the centre basis weight is 2/3 per axis.
        let w = 8.0 / 27.0;
        for v in out {
            assert!((v - (15.0 + w)).abs() < 1e-5);
        }
    }

    #[test]
    fn test_covering_grid_is_identity() {
        let device = Default::default();
        let meta = ImageMetadata::<3>::default();
        let transform = BSplineTransform::<TestBackend>::covering(&meta, [8, 8, 8], [5, 5, 5], &device);
        assert_eq!(transform.control_point_spacing(), [7.0 / 4.0; 3]);
        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.5, 6.0]], &device);
        let out = transform.transform_points(points).into_data().to_vec::<f32>().unwrap();
        assert_eq!(out, vec![1.0, 2.5, 6.0]);
    }
}
