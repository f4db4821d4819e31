//! Diffusion tensor model fitted by weighted log-linear least squares.

use nalgebra::{DMatrix, DVector, Matrix3, SymmetricEigen};
use crate::error::{Result, TrackingError};
use crate::gradients::GradientTable;
use crate::reconstruction::ReconstructionModel;
use crate::sphere::Sphere;

/// Parameters are `[ln S0, Dxx, Dyy, Dzz, Dxy, Dxz, Dyz]`.
pub struct TensorModel {
    design: DMatrix<f64>,
    pseudo_inverse: DMatrix<f64>,
    vertices: Vec<[f64; 3]>,
}

impl TensorModel {
    pub fn new(gradients: &GradientTable, sphere: &Sphere) -> Result<Self> {
        if gradients.dw_indices().len() < 6 {
            return Err(TrackingError::GradientMismatch(format!(
                "tensor fit needs at least 6 diffusion-weighted frames, got {}",
                gradients.dw_indices().len()
            )));
        }
        let n = gradients.len();
        let mut design = DMatrix::zeros(n, 7);
        for (r, (b, g)) in gradients.bvals().iter().zip(gradients.bvecs()).enumerate() {
            let row = [
                1.0,
                -b * g[0] * g[0],
                -b * g[1] * g[1],
                -b * g[2] * g[2],
                -2.0 * b * g[0] * g[1],
                -2.0 * b * g[0] * g[2],
                -2.0 * b * g[1] * g[2],
            ];
            for (c, v) in row.into_iter().enumerate() {
                design[(r, c)] = v;
            }
        }
        let pseudo_inverse = design
            .clone()
            .pseudo_inverse(1e-10)
            .map_err(|e| TrackingError::GradientMismatch(format!("degenerate tensor design: {e}")))?;
        Ok(Self { design, pseudo_inverse, vertices: sphere.vertices().to_vec() })
    }

    /// Eigenvalues, largest first, with matching eigenvectors.
    pub fn eigen(params: &[f64]) -> ([f64; 3], [[f64; 3]; 3]) {
        let eig = SymmetricEigen::new(tensor_matrix(params));
        let mut order = [0usize, 1, 2];
        order.sort_by(|a, b| eig.eigenvalues[*b].total_cmp(&eig.eigenvalues[*a]));
        let values = order.map(|i| eig.eigenvalues[i]);
        let vectors = order.map(|i| {
            let c = eig.eigenvectors.column(i);
            [c[0], c[1], c[2]]
        });
        (values, vectors)
    }
}

pub(crate) fn tensor_matrix(p: &[f64]) -> Matrix3<f64> {
    Matrix3::new(
        p[1], p[4], p[5],
        p[4], p[2], p[6],
        p[5], p[6], p[3],
    )
}

pub fn fractional_anisotropy(evals: &[f64; 3]) -> f64 {
    let mean = (evals[0] + evals[1] + evals[2]) / 3.0;
    let num: f64 = evals.iter().map(|l| (l - mean).powi(2)).sum();
    let den: f64 = evals.iter().map(|l| l * l).sum();
    if den <= 0.0 {
        0.0
    } else {
        (1.5 * num / den).sqrt().min(1.0)
    }
}

impl ReconstructionModel for TensorModel {
    fn name(&self) -> &'static str {
        "tensor"
    }

    fn fit_voxel(&self, signal: &[f64]) -> Option<Vec<f64>> {
        let y = DVector::from_iterator(signal.len(), signal.iter().map(|s| s.max(1e-6).ln()));
        let ols = &self.pseudo_inverse * &y;

        // weights: squared predicted signal
        let predicted = &self.design * &ols;
        let w = predicted.map(|v| (2.0 * v).min(50.0).exp());
        let xtw = self.design.transpose() * DMatrix::from_diagonal(&w);
        let params = (&xtw * &self.design)
            .cholesky()
            .map(|c| c.solve(&(&xtw * &y)))
            .unwrap_or(ols);

        params.iter().all(|v| v.is_finite()).then(|| params.iter().copied().collect())
    }

    fn predict(&self, params: &[f64]) -> Vec<f64> {
        let p = DVector::from_column_slice(params);
        (&self.design * p).iter().map(|v| v.exp()).collect()
    }

    fn odf(&self, params: &[f64]) -> Vec<f64> {
        let (values, vectors) = Self::eigen(params);
        let floor = (values[0].abs() * 1e-3).max(1e-9);
        let inv = values.map(|l| 1.0 / l.max(floor));
        self.vertices
            .iter()
            .map(|u| {
                let q: f64 = (0..3)
                    .map(|k| {
                        let c = u[0] * vectors[k][0] + u[1] * vectors[k][1] + u[2] * vectors[k][2];
                        inv[k] * c * c
                    })
                    .sum();
                q.powf(-1.5)
            })
            .collect()
    }
}
