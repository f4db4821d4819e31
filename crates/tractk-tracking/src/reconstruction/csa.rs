//! Constant-solid-angle Q-ball ODF.
//!
//! Parameters are the SH coefficients of `ln(-ln E)` over the
//! diffusion-weighted frames; the ODF coefficients follow from the
//! Funk-Radon transform of their Laplace-Beltrami image, and the constant
//! term is fixed so the ODF integrates to one.

use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;
use crate::error::{Result, TrackingError};
use crate::gradients::GradientTable;
use crate::reconstruction::ReconstructionModel;
use crate::shm;
use crate::sphere::Sphere;

/// Laplace-Beltrami regularisation weight.
const SMOOTH: f64 = 0.006;
const MIN_SIGNAL: f64 = 1e-3;
const MAX_SIGNAL: f64 = 1.0 - 1e-3;

pub struct CsaModel {
    dw: Vec<usize>,
    n_frames: usize,
    basis_dw: DMatrix<f64>,
    fit_matrix: DMatrix<f64>,
    odf_scale: Vec<f64>,
    basis_sphere: DMatrix<f64>,
}

impl CsaModel {
    pub fn new(gradients: &GradientTable, order: usize, sphere: &Sphere) -> Result<Self> {
        let dw = gradients.dw_indices();
        let n = shm::n_coeffs(order);
        if dw.len() < n {
            return Err(TrackingError::invalid_configuration(format!(
                "sh_order {order} needs {n} diffusion-weighted frames, got {}",
                dw.len()
            )));
        }
        let dirs: Vec<[f64; 3]> = dw.iter().map(|&i| gradients.bvecs()[i]).collect();
        let basis_dw = shm::basis_matrix(order, &dirs);
        let degrees = shm::degrees(order);
        let laplacian = DMatrix::from_diagonal(&DVector::from_iterator(
            n,
            degrees.iter().map(|l| (l * (l + 1)) as f64),
        ));
        let normal = basis_dw.transpose() * &basis_dw + &laplacian * &laplacian * SMOOTH;
        let fit_matrix = normal
            .try_inverse()
            .ok_or_else(|| TrackingError::GradientMismatch("singular CSA normal matrix".into()))?
            * basis_dw.transpose();
        let odf_scale = degrees
            .iter()
            .map(|&l| -((l * (l + 1)) as f64) * shm::legendre_at_zero(l) / (8.0 * PI))
            .collect();
        Ok(Self {
            dw,
            n_frames: gradients.len(),
            basis_dw,
            fit_matrix,
            odf_scale,
            basis_sphere: shm::basis_matrix(order, sphere.vertices()),
        })
    }

    fn odf_coefficients(&self, params: &[f64]) -> DVector<f64> {
        let mut c = DVector::from_iterator(params.len(), params.iter().zip(&self.odf_scale).map(|(p, s)| p * s));
        c[0] = 0.5 / PI.sqrt();
        c
    }
}

impl ReconstructionModel for CsaModel {
    fn name(&self) -> &'static str {
        "csa"
    }

    fn fit_voxel(&self, signal: &[f64]) -> Option<Vec<f64>> {
        let y = DVector::from_iterator(
            self.dw.len(),
            self.dw.iter().map(|&i| {
                let e = signal[i].clamp(MIN_SIGNAL, MAX_SIGNAL);
                (-e.ln()).ln()
            }),
        );
        let c = &self.fit_matrix * y;
        c.iter().all(|v| v.is_finite()).then(|| c.iter().copied().collect())
    }

    fn predict(&self, params: &[f64]) -> Vec<f64> {
        let loglog = &self.basis_dw * DVector::from_column_slice(params);
        let mut out = vec![1.0; self.n_frames];
        for (k, &i) in self.dw.iter().enumerate() {
            out[i] = (-loglog[k].exp()).exp();
        }
        out
    }

    fn odf(&self, params: &[f64]) -> Vec<f64> {
        (&self.basis_sphere * self.odf_coefficients(params)).iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruction::test_support::{crossing_signal, gradient_table, stick_signal};

    #[test]
    fn test_odf_integrates_to_one() {
        let gradients = gradient_table();
        let sphere = Sphere::fibonacci(2000);
        let model = CsaModel::new(&gradients, 4, &sphere).unwrap();
        let params = model.fit_voxel(&stick_signal(&gradients, [0.0, 0.0, 1.0])).unwrap();
        let integral: f64 = model.odf(&params).iter().sum::<f64>() * 4.0 * PI / sphere.len() as f64;
        assert!((integral - 1.0).abs() < 1e-2, "integral = {integral}");
    }

    #[test]
    fn test_resolves_perpendicular_crossing() {
        let gradients = gradient_table();
        let sphere = Sphere::fibonacci(400);
        let model = CsaModel::new(&gradients, 6, &sphere).unwrap();
        let params = model
            .fit_voxel(&crossing_signal(&gradients, [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]))
            .unwrap();
        let odf = model.odf(&params);
        let at = |d: [f64; 3]| odf[sphere.closest(&d)];
        assert!(at([1.0, 0.0, 0.0]) > at([0.0, 0.0, 1.0]));
        assert!(at([0.0, 1.0, 0.0]) > at([0.0, 0.0, 1.0]));
        let ratio = at([1.0, 0.0, 0.0]) / at([0.0, 1.0, 0.0]);
        assert!((0.7..1.43).contains(&ratio), "ratio = {ratio}");
    }

    #[test]
    fn test_prediction_keeps_b0_frames() {
        let gradients = gradient_table();
        let model = CsaModel::new(&gradients, 4, &Sphere::fibonacci(50)).unwrap();
        let signal = stick_signal(&gradients, [1.0, 0.0, 0.0]);
        let predicted = model.predict(&model.fit_voxel(&signal).unwrap());
        assert_eq!(&predicted[..2], &[1.0, 1.0]);
        let err: f64 = predicted.iter().zip(&signal).map(|(p, s)| (p - s).abs()).sum::<f64>() / signal.len() as f64;
        assert!(err < 0.05, "mean error {err}");
    }

    #[test]
    fn test_order_needs_enough_directions() {
        let gradients = gradient_table();
        let result = CsaModel::new(&gradients, 8, &Sphere::fibonacci(50));
        assert!(matches!(result, Err(e) if e.is_configuration()));
    }
}
