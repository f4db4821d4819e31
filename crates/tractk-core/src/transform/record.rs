//! Serializable transform parameters.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use serde::{Deserialize, Serialize};
use crate::error::{ImageError, Result};
use super::affine::AffineTransform;
use super::bspline::BSplineTransform;
use super::composite::CompositeTransform;
use super::inverse::{FixedPointInverse, DEFAULT_INVERSE_ITERATIONS};
use super::trait_::Transform;

/// Backend-independent description of a transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformRecord {
    Affine {
        /// Row-major `D x D`.
        matrix: Vec<f64>,
        translation: Vec<f64>,
        center: Vec<f64>,
    },
    BSpline {
        grid_size: Vec<usize>,
        origin: Vec<f64>,
        physical_size: Vec<f64>,
        /// `[num_control_points * 3]`, x fastest.
        coefficients: Vec<f64>,
    },
    Chain {
        stages: Vec<TransformRecord>,
    },
    Inverse {
        forward: Box<TransformRecord>,
        iterations: usize,
    },
}

impl TransformRecord {
    /// Record of the inverse mapping. Affine parts are inverted exactly,
    /// deformable parts numerically.
    pub fn inverted(&self) -> Self {
        match self {
            Self::Affine { matrix, translation, center } => {
                let d = center.len();
                let inv = nalgebra::DMatrix::from_row_slice(d, d, matrix).try_inverse();
                match inv {
                    Some(inv) => Self::Affine {
                        matrix: (0..d).flat_map(|r| (0..d).map(move |c| (r, c))).map(|rc| inv[rc]).collect(),
                        translation: translation.iter().map(|t| -t).collect(),
                        center: center.iter().zip(translation).map(|(c, t)| c + t).collect(),
                    },
                    None => Self::Inverse {
                        forward: Box::new(self.clone()),
                        iterations: DEFAULT_INVERSE_ITERATIONS,
                    },
                }
            }
            Self::BSpline { .. } => Self::Inverse {
                forward: Box::new(self.clone()),
                iterations: DEFAULT_INVERSE_ITERATIONS,
            },
            Self::Chain { stages } => Self::Chain {
                stages: stages.iter().rev().map(Self::inverted).collect(),
            },
            Self::Inverse { forward, .. } => (**forward).clone(),
        }
    }

    /// Rebuild a 3D transform on `device`.
    pub fn build<B: Backend>(&self, device: &B::Device) -> Result<Box<dyn Transform<B, 3>>> {
        match self {
            Self::Affine { matrix, translation, center } => {
                if matrix.len() != 9 || translation.len() != 3 || center.len() != 3 {
                    return Err(ImageError::InvalidTransform(format!(
                        "affine needs 9/3/3 values, got {}/{}/{}",
                        matrix.len(),
                        translation.len(),
                        center.len()
                    )));
                }
                Ok(Box::new(AffineTransform::<B, 3>::from_values(matrix, translation, center, device)))
            }
            Self::BSpline { grid_size, origin, physical_size, coefficients } => {
                let (Ok(grid), Ok(origin), Ok(size)) = (
                    <[usize; 3]>::try_from(grid_size.as_slice()),
                    <[f64; 3]>::try_from(origin.as_slice()),
                    <[f64; 3]>::try_from(physical_size.as_slice()),
                ) else {
                    return Err(ImageError::InvalidTransform("b-spline needs 3D grid metadata".into()));
                };
                let n: usize = grid.iter().product();
                if coefficients.len() != n * 3 {
                    return Err(ImageError::InvalidTransform(format!(
                        "b-spline grid {grid:?} needs {} coefficients, got {}",
                        n * 3,
                        coefficients.len()
                    )));
                }
                let values: Vec<f32> = coefficients.iter().map(|v| *v as f32).collect();
                let coeffs = Tensor::<B, 2>::from_data(TensorData::new(values, Shape::new([n, 3])), device);
                Ok(Box::new(BSplineTransform::new(grid, origin, size, coeffs)))
            }
            Self::Chain { stages } => {
                let stages = stages
                    .iter()
                    .map(|s| s.build::<B>(device))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(CompositeTransform::new(stages)))
            }
            Self::Inverse { forward, iterations } => {
                Ok(Box::new(FixedPointInverse::new(forward.build::<B>(device)?, *iterations)))
            }
        }
    }
}

/// Host copy of tensor values as `f64`.
pub(crate) fn tensor_values<B: Backend, const N: usize>(tensor: Tensor<B, N>) -> Vec<f64> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .expect("converted tensor data is f64")
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn shear() -> TransformRecord {
        TransformRecord::Affine {
            matrix: vec![1.0, 0.1, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0],
            translation: vec![1.0, 2.0, 3.0],
            center: vec![5.0, 5.0, 5.0],
        }
    }

    #[test]
    fn test_inverted_affine_undoes_forward() {
        let device = Default::default();
        let forward = shear().build::<TestBackend>(&device).unwrap();
        let inverse = shear().inverted().build::<TestBackend>(&device).unwrap();
        let points = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0, 2.0], [7.0, -3.0, 4.0]], &device);
        let back = inverse.transform_points(forward.transform_points(points.clone()));
        let a = points.into_data().to_vec::<f32>().unwrap();
        let b = back.into_data().to_vec::<f32>().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-4);
        }
    }

    #[test]
    fn test_chain_inversion_reverses_stages() {
        let bspline = TransformRecord::BSpline {
            grid_size: vec![4, 4, 4],
            origin: vec![0.0; 3],
            physical_size: vec![30.0; 3],
            coefficients: vec![0.0; 192],
        };
        let chain = TransformRecord::Chain { stages: vec![bspline.clone(), shear()] };
        let TransformRecord::Chain { stages } = chain.inverted() else {
            panic!("chain inverts to a chain");
        };
        assert!(matches!(stages[0], TransformRecord::Affine { .. }));
        assert!(matches!(&stages[1], TransformRecord::Inverse { forward, .. } if **forward == bspline));
        assert_eq!(bspline.inverted().inverted(), bspline);
    }

    #[test]
    fn test_build_rejects_malformed_records() {
        let device = Default::default();
        let bad = TransformRecord::BSpline {
            grid_size: vec![4, 4, 4],
            origin: vec![0.0; 3],
            physical_size: vec![30.0; 3],
            coefficients: vec![0.0; 10],
        };
        assert!(matches!(bad.build::<TestBackend>(&device), Err(ImageError::InvalidTransform(_))));
    }
}
