//! Three-class tissue segmentation of a T1-weighted volume.
//!
//! The brain is separated from background with Otsu's threshold (unless a
//! mask is supplied), intensities inside it are clustered into CSF < GM < WM
//! with k-means, and a Gaussian mixture built from the clusters turns every
//! voxel into class posteriors.

use tractk_core::filter::{binarize, erode};
use tractk_core::image::{TissueMaps, Volume};
use crate::error::{RegistrationError, Result};

const HISTOGRAM_BINS: usize = 256;
const KMEANS_ITERATIONS: usize = 50;

/// Segmenter settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TissueSegmenter {
    /// Erosion of the brain mask that separates ventricles from outer CSF.
    pub ventricle_erosion_mm: f64,
}

impl Default for TissueSegmenter {
    fn default() -> Self {
        Self { ventricle_erosion_mm: 3.0 }
    }
}

/// Segmentation outputs in anatomical space.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// 0 background, 1 CSF, 2 GM, 3 WM.
    pub labels: Volume,
    pub brain_mask: Volume,
    pub tissue: TissueMaps,
}

/// Otsu's method: the threshold maximising between-class variance.
pub fn otsu_threshold(data: &[f32], num_bins: usize) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let min_val = data.iter().fold(f32::MAX, |a, &b| a.min(b));
    let max_val = data.iter().fold(f32::MIN, |a, &b| a.max(b));
    if (max_val - min_val).abs() < 1e-10 {
        return min_val;
    }

    let bin_width = (max_val - min_val) / num_bins as f32;
    let mut histogram = vec![0usize; num_bins];
    for &v in data {
        let bin = (((v - min_val) / bin_width).floor() as usize).min(num_bins - 1);
        histogram[bin] += 1;
    }

    let total = data.len() as f64;
    let sum_total: f64 = histogram.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();
    let mut sum_background = 0.0;
    let mut weight_background = 0.0;
    let mut max_variance = 0.0;
    let mut best_bin = 0;
    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count as f64;
        if weight_background == 0.0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0.0 {
            break;
        }
        sum_background += t as f64 * count as f64;
        let mean_background = sum_background / weight_background;
        let mean_foreground = (sum_total - sum_background) / weight_foreground;
        let variance = weight_background * weight_foreground * (mean_background - mean_foreground).powi(2);
        if variance > max_variance {
            max_variance = variance;
            best_bin = t;
        }
    }
    // upper edge of the background bin
    min_val + (best_bin + 1) as f32 * bin_width
}

/// One-dimensional k-means with `k = 3`, seeded evenly across `[lo, hi]`.
/// Returns sorted centroids.
fn kmeans3(values: &[f32], lo: f64, hi: f64) -> [f64; 3] {
    let span = hi - lo;
    let mut centroids = [lo + span / 6.0, lo + span / 2.0, lo + 5.0 * span / 6.0];
    let tolerance = 1e-6 * span.max(1e-12);

    for _ in 0..KMEANS_ITERATIONS {
        let mut sums = [0.0f64; 3];
        let mut counts = [0usize; 3];
        for &v in values {
            let k = nearest(&centroids, v as f64);
            sums[k] += v as f64;
            counts[k] += 1;
        }
        let mut shift = 0.0f64;
        for k in 0..3 {
            if counts[k] > 0 {
                let updated = sums[k] / counts[k] as f64;
                shift = shift.max((updated - centroids[k]).abs());
                centroids[k] = updated;
            }
        }
        if shift < tolerance {
            break;
        }
    }
    centroids.sort_by(|a, b| a.total_cmp(b));
    centroids
}

fn nearest(centroids: &[f64; 3], v: f64) -> usize {
    (0..3)
        .min_by(|&a, &b| (v - centroids[a]).abs().total_cmp(&(v - centroids[b]).abs()))
        .unwrap_or(0)
}

/// Per-class weight, mean and variance of a Gaussian mixture.
struct Mixture {
    weight: [f64; 3],
    mean: [f64; 3],
    variance: [f64; 3],
}

impl Mixture {
    fn from_clusters(values: &[f32], centroids: &[f64; 3], variance_floor: f64) -> Self {
        let mut count = [0.0f64; 3];
        let mut sq = [0.0f64; 3];
        for &v in values {
            let k = nearest(centroids, v as f64);
            count[k] += 1.0;
            sq[k] += (v as f64 - centroids[k]).powi(2);
        }
        let total = values.len() as f64;
        Self {
            weight: std::array::from_fn(|k| (count[k] / total).max(1e-3)),
            mean: *centroids,
            variance: std::array::from_fn(|k| {
                if count[k] > 1.0 { (sq[k] / count[k]).max(variance_floor) } else { variance_floor }
            }),
        }
    }

    fn posteriors(&self, v: f64) -> [f64; 3] {
        // log-domain so distant voxels do not underflow to all zeros
        let log_p: [f64; 3] = std::array::from_fn(|k| {
            self.weight[k].ln()
                - 0.5 * self.variance[k].ln()
                - (v - self.mean[k]).powi(2) / (2.0 * self.variance[k])
        });
        let max = log_p.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let p = log_p.map(|l| (l - max).exp());
        let sum: f64 = p.iter().sum();
        p.map(|x| x / sum)
    }
}

impl TissueSegmenter {
    pub fn new(ventricle_erosion_mm: f64) -> Self {
        Self { ventricle_erosion_mm }
    }

    /// Segment `anat`, optionally restricted to `mask` (nonzero = brain).
    pub fn segment(&self, anat: &Volume, mask: Option<&Volume>) -> Result<Segmentation> {
        let brain_mask = match mask {
            Some(mask) => {
                anat.ensure_same_grid(mask, "anatomical/brain mask")?;
                binarize(mask, 0.0)
            }
            None => {
                let threshold = otsu_threshold(anat.values(), HISTOGRAM_BINS);
                binarize(anat, threshold)
            }
        };

        let inside: Vec<f32> = anat
            .values()
            .iter()
            .zip(brain_mask.values())
            .filter(|(_, m)| **m > 0.0)
            .map(|(v, _)| *v)
            .collect();
        if inside.is_empty() {
            return Err(RegistrationError::no_brain_tissue("brain mask of the anatomical volume is empty"));
        }
        let lo = inside.iter().cloned().fold(f32::MAX, f32::min);
        let hi = inside.iter().cloned().fold(f32::MIN, f32::max);
        if hi - lo <= f32::EPSILON * hi.abs().max(1.0) {
            return Err(RegistrationError::no_brain_tissue(
                "anatomical intensities are constant inside the brain mask",
            ));
        }

        let centroids = kmeans3(&inside, lo as f64, hi as f64);
        let variance_floor = (1e-3 * (hi - lo) as f64).powi(2);
        let mixture = Mixture::from_clusters(&inside, &centroids, variance_floor);
        tracing::debug!(?centroids, weights = ?mixture.weight, "tissue mixture");

        let grid = Volume::zeros(anat.dims(), *anat.metadata());
        let mut csf = grid.clone();
        let mut gm = grid.clone();
        let mut wm = grid.clone();
        let mut labels = grid;
        for (i, (&v, &m)) in anat.values().iter().zip(brain_mask.values()).enumerate() {
            if m == 0.0 {
                continue;
            }
            let p = mixture.posteriors(v as f64);
            csf.values_mut()[i] = p[0] as f32;
            gm.values_mut()[i] = p[1] as f32;
            wm.values_mut()[i] = p[2] as f32;
            let best = (0..3).max_by(|&a, &b| p[a].total_cmp(&p[b])).unwrap_or(0);
            labels.values_mut()[i] = (best + 1) as f32;
        }

        let deep = erode(&brain_mask, self.ventricle_erosion_mm);
        let mut vent_csf = csf.clone();
        for (v, d) in vent_csf.values_mut().iter_mut().zip(deep.values()) {
            if *d == 0.0 {
                *v = 0.0;
            }
        }
        let csf_mask = binarize(&csf, 0.5);

        let wm_voxels = labels.values().iter().filter(|l| **l == 3.0).count();
        tracing::info!(
            brain_voxels = inside.len(),
            wm_voxels,
            "segmented anatomical volume"
        );
        Ok(Segmentation {
            labels,
            brain_mask,
            tissue: TissueMaps::new(wm, gm, vent_csf, csf_mask)?,
        })
    }
}
