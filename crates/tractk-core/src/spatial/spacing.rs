//! Physical distance between adjacent voxels along each axis.

use super::Vector;

/// Spacing is a vector whose i-th component is the voxel size along axis i
/// (axis 0 is x).
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Create uniform spacing (same value for all dimensions).
    pub fn uniform(value: f64) -> Self {
        Vector::new([value; D])
    }

    /// Get the minimum spacing value.
    pub fn min_spacing(&self) -> f64 {
        (0..D).map(|i| self[i]).fold(f64::INFINITY, f64::min)
    }

    /// Get the maximum spacing value.
    pub fn max_spacing(&self) -> f64 {
        (0..D).map(|i| self[i]).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Physical volume of one voxel.
    pub fn voxel_volume(&self) -> f64 {
        (0..D).map(|i| self[i]).product()
    }
}
