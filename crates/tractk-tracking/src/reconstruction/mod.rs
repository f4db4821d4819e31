//! Diffusion model fitting.
//!
//! A [`DiffusionModelFitter`] turns a diffusion series into a
//! [`FittedModel`]: per-voxel parameters of one [`ReconstructionModel`] plus
//! the normalised signal they were fitted from. Tracking reads orientation
//! distributions from it; the bootstrap strategy also reads predictions and
//! refits perturbed signals.

pub mod csa;
pub mod csd;
pub mod tensor;

pub use csa::CsaModel;
pub use csd::{CsdModel, Response};
pub use tensor::TensorModel;

use burn::tensor::backend::Backend;
use tracing::{debug, info};
use tractk_core::image::{DiffusionImage, ImageMetadata, Volume};
use tractk_core::ImageError;
use crate::config::{ReconModel, TrackingConfig};
use crate::error::{Result, TrackingError};
use crate::gradients::GradientTable;
use crate::sphere::Sphere;

/// A voxel-wise diffusion model.
///
/// Signals passed in and returned are normalised by the voxel's mean b0 and
/// hold one value per frame of the gradient table.
pub trait ReconstructionModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fit one voxel. `None` when the fit is not finite.
    fn fit_voxel(&self, signal: &[f64]) -> Option<Vec<f64>>;

    /// Signal predicted by fitted parameters.
    fn predict(&self, params: &[f64]) -> Vec<f64>;

    /// Orientation distribution sampled on the tracking sphere.
    fn odf(&self, params: &[f64]) -> Vec<f64>;
}

/// Builds a [`FittedModel`] for one model family.
#[derive(Debug, Clone)]
pub struct DiffusionModelFitter {
    model: ReconModel,
    sh_order: usize,
    csd_lambda: f64,
    csd_tau: f64,
}

impl DiffusionModelFitter {
    pub fn new(model: ReconModel) -> Self {
        let defaults = TrackingConfig::default();
        Self {
            model,
            sh_order: defaults.sh_order,
            csd_lambda: defaults.csd_lambda,
            csd_tau: defaults.csd_tau,
        }
    }

    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            model: config.model,
            sh_order: config.sh_order,
            csd_lambda: config.csd_lambda,
            csd_tau: config.csd_tau,
        }
    }

    pub fn with_sh_order(mut self, order: usize) -> Self {
        self.sh_order = order;
        self
    }

    /// Fit every voxel of `mask` that has a positive b0 signal.
    pub fn fit<B: Backend>(
        &self,
        dwi: &DiffusionImage<B>,
        gradients: &GradientTable,
        mask: &Volume,
        sphere: &Sphere,
    ) -> Result<FittedModel> {
        gradients.check_frames(dwi.num_frames())?;
        let [nz, ny, nx] = dwi.spatial_shape();
        let dims = [nx, ny, nz];
        if mask.dims() != dims || !mask.metadata().approx_eq(dwi.metadata()) {
            return Err(ImageError::GridMismatch(format!(
                "brain mask {:?} vs diffusion {:?}",
                mask.dims(),
                dims
            ))
            .into());
        }

        let n_frames = dwi.num_frames();
        let raw = dwi.voxel_signals();
        let b0 = gradients.b0_indices();
        let mut voxels = Vec::new();
        let mut normalised = Vec::new();
        for (offset, m) in mask.values().iter().enumerate() {
            if *m <= 0.0 {
                continue;
            }
            let signal = &raw[offset * n_frames..(offset + 1) * n_frames];
            let s0 = b0.iter().map(|&i| signal[i] as f64).sum::<f64>() / b0.len() as f64;
            if !(s0 > 0.0 && s0.is_finite()) {
                continue;
            }
            voxels.push(offset);
            normalised.extend(signal.iter().map(|v| *v as f64 / s0));
        }
        if voxels.is_empty() {
            return Err(TrackingError::invalid_input("brain mask holds no voxel with b0 signal"));
        }

        let model: Box<dyn ReconstructionModel> = match self.model {
            ReconModel::Tensor => Box::new(TensorModel::new(gradients, sphere)?),
            ReconModel::Csa => Box::new(CsaModel::new(gradients, self.sh_order, sphere)?),
            ReconModel::Csd => {
                let tensor = TensorModel::new(gradients, sphere)?;
                let response = Response::estimate(&tensor, normalised.chunks(n_frames))?;
                debug!(
                    axial = response.axial,
                    radial = response.radial,
                    voxels = response.voxels,
                    "estimated single-fibre response"
                );
                Box::new(CsdModel::new(gradients, self.sh_order, &response, self.csd_lambda, self.csd_tau, sphere)?)
            }
        };

        let mut slots = vec![None; dims.iter().product()];
        let mut params = Vec::new();
        let mut signals = Vec::new();
        let mut n_params = 0;
        let mut row = 0u32;
        for (offset, signal) in voxels.iter().zip(normalised.chunks(n_frames)) {
            let Some(p) = model.fit_voxel(signal) else {
                continue;
            };
            n_params = p.len();
            params.extend(p);
            signals.extend(signal.iter().map(|v| *v as f32));
            slots[*offset] = Some(row);
            row += 1;
        }
        if row == 0 {
            return Err(TrackingError::invalid_input(format!(
                "{} fit failed in every masked voxel",
                model.name()
            )));
        }
        info!(model = model.name(), voxels = row, "fitted diffusion model");

        Ok(FittedModel {
            model,
            dims,
            metadata: *dwi.metadata(),
            slots,
            n_params,
            params,
            n_frames,
            signals,
        })
    }
}

/// Per-voxel parameters of a fitted model on the diffusion grid.
pub struct FittedModel {
    model: Box<dyn ReconstructionModel>,
    dims: [usize; 3],
    metadata: ImageMetadata<3>,
    slots: Vec<Option<u32>>,
    n_params: usize,
    params: Vec<f64>,
    n_frames: usize,
    signals: Vec<f32>,
}

impl std::fmt::Debug for FittedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FittedModel")
            .field("model", &self.model.name())
            .field("dims", &self.dims)
            .field("fitted_voxels", &self.fitted_voxels())
            .finish()
    }
}

impl FittedModel {
    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn metadata(&self) -> &ImageMetadata<3> {
        &self.metadata
    }

    pub fn fitted_voxels(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn offset(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.dims[1] + y) * self.dims[0] + x
    }

    /// Flat offset of the voxel nearest to a continuous index.
    pub fn voxel_at(&self, index: &[f64; 3]) -> Option<usize> {
        let mut v = [0usize; 3];
        for axis in 0..3 {
            let r = index[axis].round();
            if !(r >= 0.0 && r < self.dims[axis] as f64) {
                return None;
            }
            v[axis] = r as usize;
        }
        Some(self.offset(v[0], v[1], v[2]))
    }

    pub fn params(&self, offset: usize) -> Option<&[f64]> {
        let row = self.slots.get(offset).copied().flatten()? as usize;
        Some(&self.params[row * self.n_params..(row + 1) * self.n_params])
    }

    /// Normalised signal the voxel was fitted from.
    pub fn signal(&self, offset: usize) -> Option<&[f32]> {
        let row = self.slots.get(offset).copied().flatten()? as usize;
        Some(&self.signals[row * self.n_frames..(row + 1) * self.n_frames])
    }

    /// Parameters interpolated trilinearly over the fitted corners around
    /// `index`. `None` when the nearest voxel has no model.
    pub fn params_at(&self, index: &[f64; 3]) -> Option<Vec<f64>> {
        self.params(self.voxel_at(index)?)?;
        let mut base = [0usize; 3];
        let mut w = [0.0f64; 3];
        for axis in 0..3 {
            let max = (self.dims[axis] - 1) as f64;
            let p = index[axis].clamp(0.0, max);
            let f = p.floor().min((max - 1.0).max(0.0));
            base[axis] = f as usize;
            w[axis] = p - f;
        }
        let step = |axis: usize| usize::from(self.dims[axis] > 1);
        let mut acc = vec![0.0; self.n_params];
        let mut total = 0.0;
        for (dz, wz) in [(0, 1.0 - w[2]), (step(2), w[2])] {
            for (dy, wy) in [(0, 1.0 - w[1]), (step(1), w[1])] {
                for (dx, wx) in [(0, 1.0 - w[0]), (step(0), w[0])] {
                    let weight = wx * wy * wz;
                    if weight <= 0.0 {
                        continue;
                    }
                    let offset = self.offset(base[0] + dx, base[1] + dy, base[2] + dz);
                    if let Some(p) = self.params(offset) {
                        for (a, v) in acc.iter_mut().zip(p) {
                            *a += weight * v;
                        }
                        total += weight;
                    }
                }
            }
        }
        if total <= 0.0 {
            return None;
        }
        acc.iter_mut().for_each(|a| *a /= total);
        Some(acc)
    }

    /// ODF at a continuous index of the diffusion grid.
    pub fn odf_at(&self, index: &[f64; 3]) -> Option<Vec<f64>> {
        self.params_at(index).map(|p| self.model.odf(&p))
    }

    pub fn odf(&self, params: &[f64]) -> Vec<f64> {
        self.model.odf(params)
    }

    pub fn predict(&self, params: &[f64]) -> Vec<f64> {
        self.model.predict(params)
    }

    /// Fit a perturbed signal with the same model.
    pub fn refit(&self, signal: &[f64]) -> Option<Vec<f64>> {
        self.model.fit_voxel(signal)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Synthetic single-fibre signals.

    use crate::gradients::GradientTable;
    use crate::sphere::Sphere;

    /// 32 diffusion directions at b = 1000 plus two b0 frames.
    pub fn gradient_table() -> GradientTable {
        let dirs = Sphere::fibonacci(64);
        let mut bvals = vec![0.0, 0.0];
        let mut bvecs = vec![[0.0; 3], [0.0; 3]];
        // upper hemisphere only
        for v in dirs.vertices().iter().filter(|v| v[2] > 0.0).take(32) {
            bvals.push(1000.0);
            bvecs.push(*v);
        }
        GradientTable::new(bvals, bvecs, 50.0).unwrap()
    }

    /// Normalised signal of a prolate tensor along `axis`.
    pub fn stick_signal(gradients: &GradientTable, axis: [f64; 3]) -> Vec<f64> {
        let (axial, radial) = (1.7e-3, 0.3e-3);
        gradients
            .bvals()
            .iter()
            .zip(gradients.bvecs())
            .map(|(b, g)| {
                let c = g[0] * axis[0] + g[1] * axis[1] + g[2] * axis[2];
                (-b * (radial + (axial - radial) * c * c)).exp()
            })
            .collect()
    }

    /// Equal mixture of two sticks.
    pub fn crossing_signal(gradients: &GradientTable, a: [f64; 3], b: [f64; 3]) -> Vec<f64> {
        stick_signal(gradients, a)
            .iter()
            .zip(stick_signal(gradients, b))
            .map(|(x, y)| 0.5 * (x + y))
            .collect()
    }
}
