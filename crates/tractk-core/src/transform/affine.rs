//! Affine transform about a fixed centre.

use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::DMatrix;
use super::record::{tensor_values, TransformRecord};
use super::trait_::Transform;

/// `T(x) = A (x - c) + c + t`
///
/// `A` and `t` are trainable; the centre `c` is fixed.
#[derive(Module, Debug)]
pub struct AffineTransform<B: Backend, const D: usize> {
    matrix: Param<Tensor<B, 2>>,
    translation: Param<Tensor<B, 1>>,
    center: Tensor<B, 1>,
}

impl<B: Backend, const D: usize> AffineTransform<B, D> {
    pub fn new(matrix: Tensor<B, 2>, translation: Tensor<B, 1>, center: Tensor<B, 1>) -> Self {
        Self {
            matrix: Param::from_tensor(matrix),
            translation: Param::from_tensor(translation),
            center,
        }
    }

    /// Build from host values; `matrix` is row-major `D x D`.
    pub fn from_values(matrix: &[f64], translation: &[f64], center: &[f64], device: &B::Device) -> Self {
        let to_f32 = |v: &[f64]| v.iter().map(|x| *x as f32).collect::<Vec<_>>();
        let matrix = Tensor::<B, 2>::from_data(TensorData::new(to_f32(matrix), Shape::new([D, D])), device);
        let translation = Tensor::<B, 1>::from_data(TensorData::new(to_f32(translation), Shape::new([D])), device);
        let center = Tensor::<B, 1>::from_data(TensorData::new(to_f32(center), Shape::new([D])), device);
        Self::new(matrix, translation, center)
    }

    /// Identity about `center` (origin when `None`).
    pub fn identity(center: Option<Tensor<B, 1>>, device: &B::Device) -> Self {
        let matrix = Tensor::<B, 2>::eye(D, device);
        let translation = Tensor::<B, 1>::zeros([D], device);
        let center = center.unwrap_or_else(|| Tensor::<B, 1>::zeros([D], device));
        Self::new(matrix, translation, center)
    }

    pub fn matrix(&self) -> Tensor<B, 2> {
        self.matrix.val()
    }

    pub fn translation(&self) -> Tensor<B, 1> {
        self.translation.val()
    }

    pub fn center(&self) -> Tensor<B, 1> {
        self.center.clone()
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for AffineTransform<B, D> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // Row-vector form: y = (x - c) @ A^T + c + t
        let c = self.center.clone().reshape([1, D]);
        let t = self.translation.val().reshape([1, D]);
        let a = self.matrix.val();
        (points - c.clone()).matmul(a.transpose()) + c + t
    }

    /// `A' = A^-1`, `c' = c + t`, `t' = -t`.
    fn inverse(&self) -> Option<Box<dyn Transform<B, D>>> {
        let matrix = tensor_values(self.matrix.val());
        let inv = DMatrix::from_row_slice(D, D, &matrix).try_inverse()?;
        let inv_rows: Vec<f64> = (0..D).flat_map(|r| (0..D).map(move |c| (r, c))).map(|rc| inv[rc]).collect();

        let t = tensor_values(self.translation.val());
        let c = tensor_values(self.center.clone());
        let new_center: Vec<f64> = c.iter().zip(&t).map(|(c, t)| c + t).collect();
        let new_translation: Vec<f64> = t.iter().map(|t| -t).collect();

        let device = self.center.device();
        Some(Box::new(Self::from_values(&inv_rows, &new_translation, &new_center, &device)))
    }

    fn to_record(&self) -> TransformRecord {
        TransformRecord::Affine {
            matrix: tensor_values(self.matrix.val()),
            translation: tensor_values(self.translation.val()),
            center: tensor_values(self.center.clone()),
        }
    }
}
