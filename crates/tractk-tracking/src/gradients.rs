//! Gradient table: one b-value and unit direction per diffusion frame.

use std::path::Path;
use tractk_io::read_fsl_gradients;
use crate::error::{Result, TrackingError};

#[derive(Debug, Clone, PartialEq)]
pub struct GradientTable {
    bvals: Vec<f64>,
    bvecs: Vec<[f64; 3]>,
    b0_threshold: f64,
}

impl GradientTable {
    /// Directions are normalised; b0 frames may carry zero vectors.
    pub fn new(bvals: Vec<f64>, bvecs: Vec<[f64; 3]>, b0_threshold: f64) -> Result<Self> {
        if bvals.len() != bvecs.len() {
            return Err(TrackingError::GradientMismatch(format!(
                "{} b-values but {} directions",
                bvals.len(),
                bvecs.len()
            )));
        }
        let mut normalized = Vec::with_capacity(bvecs.len());
        for (i, (b, v)) in bvals.iter().zip(&bvecs).enumerate() {
            let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
            if *b > b0_threshold {
                if norm < 1e-6 {
                    return Err(TrackingError::GradientMismatch(format!(
                        "frame {i} has b = {b} but a zero gradient direction"
                    )));
                }
                normalized.push([v[0] / norm, v[1] / norm, v[2] / norm]);
            } else if norm > 1e-6 {
                normalized.push([v[0] / norm, v[1] / norm, v[2] / norm]);
            } else {
                normalized.push([0.0; 3]);
            }
        }
        let table = Self { bvals, bvecs: normalized, b0_threshold };
        if table.b0_indices().is_empty() {
            return Err(TrackingError::GradientMismatch(format!(
                "no b0 frame (b <= {b0_threshold})"
            )));
        }
        if table.dw_indices().is_empty() {
            return Err(TrackingError::GradientMismatch("no diffusion-weighted frame".into()));
        }
        Ok(table)
    }

    /// Read FSL `bvals`/`bvecs` files.
    pub fn from_fsl(bvals: &Path, bvecs: &Path, b0_threshold: f64) -> Result<Self> {
        let (values, vectors) = read_fsl_gradients(bvals, bvecs)?;
        Self::new(values, vectors, b0_threshold)
    }

    pub fn len(&self) -> usize {
        self.bvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bvals.is_empty()
    }

    pub fn bvals(&self) -> &[f64] {
        &self.bvals
    }

    pub fn bvecs(&self) -> &[[f64; 3]] {
        &self.bvecs
    }

    pub fn b0_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.bvals[i] <= self.b0_threshold).collect()
    }

    pub fn dw_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.bvals[i] > self.b0_threshold).collect()
    }

    /// Mean b-value of the diffusion-weighted frames.
    pub fn mean_dw_bval(&self) -> f64 {
        let dw = self.dw_indices();
        dw.iter().map(|&i| self.bvals[i]).sum::<f64>() / dw.len() as f64
    }

    /// The table must describe exactly `frames` frames.
    pub fn check_frames(&self, frames: usize) -> Result<()> {
        if self.len() == frames {
            Ok(())
        } else {
            Err(TrackingError::GradientMismatch(format!(
                "{} gradient entries for {} diffusion frames",
                self.len(),
                frames
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalises_and_splits_frames() {
        let table = GradientTable::new(
            vec![0.0, 1000.0, 1000.0, 5.0],
            vec![[0.0; 3], [2.0, 0.0, 0.0], [0.0, 3.0, 4.0], [0.0; 3]],
            50.0,
        )
        .unwrap();
        assert_eq!(table.b0_indices(), vec![0, 3]);
        assert_eq!(table.dw_indices(), vec![1, 2]);
        assert_eq!(table.bvecs()[1], [1.0, 0.0, 0.0]);
        assert!((table.bvecs()[2][2] - 0.8).abs() < 1e-12);
        assert_eq!(table.mean_dw_bval(), 1000.0);
    }

    #[test]
    fn test_rejects_inconsistent_tables() {
        assert!(GradientTable::new(vec![0.0, 1000.0], vec![[0.0; 3]], 50.0).is_err());
        // no b0
        assert!(GradientTable::new(vec![1000.0], vec![[1.0, 0.0, 0.0]], 50.0).is_err());
        // zero direction on a weighted frame
        assert!(GradientTable::new(vec![0.0, 1000.0], vec![[0.0; 3], [0.0; 3]], 50.0).is_err());

        let table = GradientTable::new(vec![0.0, 1000.0], vec![[0.0; 3], [0.0, 0.0, 1.0]], 50.0).unwrap();
        assert!(table.check_frames(2).is_ok());
        assert!(matches!(table.check_frames(3), Err(TrackingError::GradientMismatch(_))));
    }
}
