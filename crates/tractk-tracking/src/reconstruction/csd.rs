//! Constrained spherical deconvolution.
//!
//! The signal is modelled as a fibre orientation distribution convolved with
//! an axially symmetric single-fibre response. Deconvolution is iterated with
//! a penalty on fODF amplitudes below `tau` times the mean amplitude of the
//! unconstrained estimate, evaluated on a fixed constraint sphere.

use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;
use tracing::warn;
use crate::error::{Result, TrackingError};
use crate::gradients::GradientTable;
use crate::reconstruction::tensor::{fractional_anisotropy, TensorModel};
use crate::reconstruction::ReconstructionModel;
use crate::shm;
use crate::sphere::Sphere;

/// Voxels above this FA feed the response estimate.
const RESPONSE_FA: f64 = 0.7;
const CONSTRAINT_VERTICES: usize = 300;
const MAX_ITERATIONS: usize = 50;

/// Single-fibre response: tensor eigenvalues along and across the fibre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Response {
    pub axial: f64,
    pub radial: f64,
    /// Voxels averaged into the estimate; zero for the fallback.
    pub voxels: usize,
}

impl Default for Response {
    fn default() -> Self {
        Self { axial: 1.7e-3, radial: 0.2e-3, voxels: 0 }
    }
}

impl Response {
    /// Average the tensors of the most anisotropic voxels.
    ///
    /// Voxels with FA above 0.7 are used; when there are none, the top tenth
    /// by FA. Falls back to the default when the data hold no anisotropy.
    pub fn estimate<'a>(tensor: &TensorModel, signals: impl Iterator<Item = &'a [f64]>) -> Result<Self> {
        let mut candidates: Vec<(f64, f64, f64)> = signals
            .filter_map(|s| tensor.fit_voxel(s))
            .map(|p| TensorModel::eigen(&p).0)
            .filter(|ev| ev[2] > 0.0)
            .map(|ev| (fractional_anisotropy(&ev), ev[0], 0.5 * (ev[1] + ev[2])))
            .collect();
        if candidates.is_empty() {
            return Err(TrackingError::invalid_input("no voxel yields a positive-definite tensor"));
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        let above = candidates.iter().take_while(|c| c.0 > RESPONSE_FA).count();
        let n = if above > 0 { above } else { (candidates.len() / 10).max(1) };
        let axial = candidates[..n].iter().map(|c| c.1).sum::<f64>() / n as f64;
        let radial = candidates[..n].iter().map(|c| c.2).sum::<f64>() / n as f64;
        if axial <= radial * 1.05 {
            warn!(axial, radial, "data hold no anisotropic voxels, using the default response");
            return Ok(Self::default());
        }
        Ok(Self { axial, radial, voxels: n })
    }

    /// Rotational harmonic of degree `l` at b-value `b`:
    /// `2 pi * integral over [-1, 1] of E(x) P_l(x)`.
    fn rotational_harmonic(&self, l: usize, b: f64) -> f64 {
        const INTERVALS: usize = 1000;
        let h = 2.0 / INTERVALS as f64;
        let f = |x: f64| (-b * (self.radial + (self.axial - self.radial) * x * x)).exp() * shm::associated_legendre(l, 0, x);
        let mut acc = f(-1.0) + f(1.0);
        for i in 1..INTERVALS {
            let x = -1.0 + i as f64 * h;
            acc += if i % 2 == 1 { 4.0 } else { 2.0 } * f(x);
        }
        2.0 * PI * acc * h / 3.0
    }
}

pub struct CsdModel {
    dw: Vec<usize>,
    n_frames: usize,
    forward: DMatrix<f64>,
    normal: DMatrix<f64>,
    forward_t: DMatrix<f64>,
    init_penalty: DMatrix<f64>,
    constraint: DMatrix<f64>,
    constraint_weight: f64,
    ridge: f64,
    tau: f64,
    basis_sphere: DMatrix<f64>,
}

fn solve(a: DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    match a.clone().cholesky() {
        Some(c) => Some(c.solve(b)),
        None => a.lu().solve(b),
    }
}

impl CsdModel {
    pub fn new(
        gradients: &GradientTable,
        order: usize,
        response: &Response,
        lambda: f64,
        tau: f64,
        sphere: &Sphere,
    ) -> Result<Self> {
        let dw = gradients.dw_indices();
        if dw.len() < 6 {
            return Err(TrackingError::GradientMismatch(format!(
                "deconvolution needs at least 6 diffusion-weighted frames, got {}",
                dw.len()
            )));
        }
        let b = gradients.mean_dw_bval();
        let degrees = shm::degrees(order);
        let rh: Vec<f64> = (0..=order).map(|l| if l % 2 == 0 { response.rotational_harmonic(l, b) } else { 0.0 }).collect();

        let dirs: Vec<[f64; 3]> = dw.iter().map(|&i| gradients.bvecs()[i]).collect();
        let mut forward = shm::basis_matrix(order, &dirs);
        for (c, l) in degrees.iter().enumerate() {
            forward.column_mut(c).scale_mut(rh[*l]);
        }
        let normal = forward.transpose() * &forward;
        let n = degrees.len();
        let scale = normal.trace() / n as f64;
        // the unconstrained start is damped above degree 4
        let init_penalty = DMatrix::from_diagonal(&DVector::from_iterator(
            n,
            degrees.iter().map(|l| if *l > 4 { scale } else { 0.0 }),
        ));

        Ok(Self {
            dw,
            n_frames: gradients.len(),
            forward_t: forward.transpose(),
            forward,
            normal,
            init_penalty,
            constraint: shm::basis_matrix(order, Sphere::fibonacci(CONSTRAINT_VERTICES).vertices()),
            constraint_weight: lambda * dirs.len() as f64 * rh[0] / CONSTRAINT_VERTICES as f64,
            ridge: scale * 1e-8,
            tau,
            basis_sphere: shm::basis_matrix(order, sphere.vertices()),
        })
    }
}

impl ReconstructionModel for CsdModel {
    fn name(&self) -> &'static str {
        "csd"
    }

    fn fit_voxel(&self, signal: &[f64]) -> Option<Vec<f64>> {
        let s = DVector::from_iterator(self.dw.len(), self.dw.iter().map(|&i| signal[i]));
        let rhs = &self.forward_t * s;
        let n = self.normal.nrows();
        let identity = DMatrix::<f64>::identity(n, n);

        let mut f = solve(&self.normal + &self.init_penalty + &identity * self.ridge, &rhs)?;
        let threshold = self.tau * (&self.constraint * &f).mean();
        let w2 = self.constraint_weight * self.constraint_weight;
        let mut previous: Option<Vec<usize>> = None;
        for _ in 0..MAX_ITERATIONS {
            let amplitudes = &self.constraint * &f;
            let negative: Vec<usize> = (0..amplitudes.len()).filter(|&k| amplitudes[k] < threshold).collect();
            if previous.as_ref() == Some(&negative) {
                break;
            }
            let mut a = &self.normal + &identity * self.ridge;
            for &k in &negative {
                let row = self.constraint.row(k);
                a += row.transpose() * row * w2;
            }
            f = solve(a, &rhs)?;
            previous = Some(negative);
        }
        f.iter().all(|v| v.is_finite()).then(|| f.iter().copied().collect())
    }

    fn predict(&self, params: &[f64]) -> Vec<f64> {
        let s = &self.forward * DVector::from_column_slice(params);
        let mut out = vec![1.0; self.n_frames];
        for (k, &i) in self.dw.iter().enumerate() {
            out[i] = s[k];
        }
        out
    }

    fn odf(&self, params: &[f64]) -> Vec<f64> {
        (&self.basis_sphere * DVector::from_column_slice(params)).iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruction::test_support::{crossing_signal, gradient_table, stick_signal};

    fn model(sphere: &Sphere) -> CsdModel {
        let gradients = gradient_table();
        let response = Response { axial: 1.7e-3, radial: 0.3e-3, voxels: 1 };
        CsdModel::new(&gradients, 6, &response, 1.0, 0.1, sphere).unwrap()
    }

    #[test]
    fn test_response_from_anisotropic_voxels() {
        let gradients = gradient_table();
        let tensor = TensorModel::new(&gradients, &Sphere::fibonacci(20)).unwrap();
        let stick = stick_signal(&gradients, [0.0, 0.0, 1.0]);
        let iso: Vec<f64> = gradients.bvals().iter().map(|b| (-b * 0.8e-3).exp()).collect();
        let signals = [stick.as_slice(), iso.as_slice(), stick.as_slice()];
        let response = Response::estimate(&tensor, signals.into_iter()).unwrap();
        assert_eq!(response.voxels, 2);
        assert!((response.axial - 1.7e-3).abs() < 1e-6);
        assert!((response.radial - 0.3e-3).abs() < 1e-6);

        let only_iso = Response::estimate(&tensor, [iso.as_slice()].into_iter()).unwrap();
        assert_eq!(only_iso, Response::default());
    }

    #[test]
    fn test_single_fibre_fodf_is_sharp_and_nonnegative() {
        let sphere = Sphere::fibonacci(400);
        let csd = model(&sphere);
        let gradients = gradient_table();
        let fodf = csd.odf(&csd.fit_voxel(&stick_signal(&gradients, [0.0, 1.0, 0.0])).unwrap());
        let max = fodf.iter().cloned().fold(f64::MIN, f64::max);
        let min = fodf.iter().cloned().fold(f64::MAX, f64::min);
        assert!(fodf[sphere.closest(&[0.0, 1.0, 0.0])] > 0.9 * max);
        assert!(fodf[sphere.closest(&[1.0, 0.0, 0.0])] < 0.2 * max);
        assert!(min > -0.2 * max, "min {min} max {max}");
    }

    #[test]
    fn test_resolves_crossing_and_predicts_signal() {
        let sphere = Sphere::fibonacci(400);
        let csd = model(&sphere);
        let gradients = gradient_table();
        let signal = crossing_signal(&gradients, [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]);
        let params = csd.fit_voxel(&signal).unwrap();
        let fodf = csd.odf(&params);
        let at = |d: [f64; 3]| fodf[sphere.closest(&d)];
        assert!(at([1.0, 0.0, 0.0]) > 2.0 * at([0.7071, 0.0, 0.7071]));
        assert!(at([0.0, 0.0, 1.0]) > 2.0 * at([0.7071, 0.0, 0.7071]));

        let predicted = csd.predict(&params);
        assert_eq!(predicted[0], 1.0);
        let err: f64 = predicted.iter().zip(&signal).map(|(p, s)| (p - s).abs()).sum::<f64>() / signal.len() as f64;
        assert!(err < 0.05, "mean error {err}");
    }
}
