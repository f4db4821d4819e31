//! Host-resident 3D volumes for voxel-wise CPU work.
//!
//! Tracking, segmentation and morphology visit voxels one at a time; doing
//! that through tensor ops would dispatch per voxel, so those stages pull the
//! data into a flat buffer with the same `[Z, Y, X]` layout as the tensors.

use burn::tensor::backend::Backend;
use crate::error::{ImageError, Result};
use crate::image::{Image, ImageMetadata};
use crate::spatial::Point;

#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    values: Vec<f32>,
    /// Grid size ordered `(nx, ny, nz)`.
    dims: [usize; 3],
    metadata: ImageMetadata<3>,
}

impl Volume {
    /// Create a volume from values in `[Z, Y, X]` order.
    pub fn new(values: Vec<f32>, dims: [usize; 3], metadata: ImageMetadata<3>) -> Self {
        assert_eq!(values.len(), dims.iter().product::<usize>(), "value count must match dims");
        Self { values, dims, metadata }
    }

    pub fn zeros(dims: [usize; 3], metadata: ImageMetadata<3>) -> Self {
        Self::new(vec![0.0; dims.iter().product()], dims, metadata)
    }

    pub fn from_image<B: Backend>(image: &Image<B, 3>) -> Self {
        let [nz, ny, nx] = image.shape();
        Self::new(image.to_vec(), [nx, ny, nz], *image.metadata())
    }

    pub fn to_image<B: Backend>(&self, device: &B::Device) -> Result<Image<B, 3>> {
        Image::from_vec(self.values.clone(), self.shape(), self.metadata, device)
    }

    pub fn into_image<B: Backend>(self, device: &B::Device) -> Result<Image<B, 3>> {
        let shape = self.shape();
        Image::from_vec(self.values, shape, self.metadata, device)
    }

    /// Same grid, new values.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self::new(self.values.iter().map(|v| f(*v)).collect(), self.dims, self.metadata)
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Tensor shape `[Z, Y, X]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.dims[2], self.dims[1], self.dims[0]]
    }

    pub fn metadata(&self) -> &ImageMetadata<3> {
        &self.metadata
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn offset(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.dims[1] + y) * self.dims[0] + x
    }

    /// Voxel coordinates `(x, y, z)` of a flat offset.
    #[inline]
    pub fn coords(&self, offset: usize) -> [usize; 3] {
        let x = offset % self.dims[0];
        let y = (offset / self.dims[0]) % self.dims[1];
        let z = offset / (self.dims[0] * self.dims[1]);
        [x, y, z]
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.values[self.offset(x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let i = self.offset(x, y, z);
        self.values[i] = value;
    }

    /// Flat offset of the voxel containing a continuous index, if inside.
    pub fn voxel_at(&self, index: &[f64; 3]) -> Option<usize> {
        let mut v = [0usize; 3];
        for axis in 0..3 {
            let r = index[axis].round();
            if r < 0.0 || r >= self.dims[axis] as f64 || !r.is_finite() {
                return None;
            }
            v[axis] = r as usize;
        }
        Some(self.offset(v[0], v[1], v[2]))
    }

    /// Nearest-voxel value at a continuous index; `None` outside the grid.
    pub fn sample_nearest(&self, index: &[f64; 3]) -> Option<f32> {
        self.voxel_at(index).map(|i| self.values[i])
    }

    /// Trilinear value at a continuous index; `None` outside the grid.
    pub fn sample_linear(&self, index: &[f64; 3]) -> Option<f32> {
        let mut base = [0usize; 3];
        let mut w = [0.0f64; 3];
        for axis in 0..3 {
            let p = index[axis];
            let max = (self.dims[axis] - 1) as f64;
            if !(p >= -0.5 && p <= max + 0.5) {
                return None;
            }
            let p = p.clamp(0.0, max);
            let f = p.floor().min((max - 1.0).max(0.0));
            base[axis] = f as usize;
            w[axis] = p - f;
        }
        let step = |axis: usize| if self.dims[axis] > 1 { 1 } else { 0 };
        let (sx, sy, sz) = (step(0), step(1), step(2));
        let mut acc = 0.0f64;
        for (dz, wz) in [(0, 1.0 - w[2]), (sz, w[2])] {
            for (dy, wy) in [(0, 1.0 - w[1]), (sy, w[1])] {
                for (dx, wx) in [(0, 1.0 - w[0]), (sx, w[0])] {
                    let weight = wx * wy * wz;
                    if weight != 0.0 {
                        acc += weight * self.get(base[0] + dx, base[1] + dy, base[2] + dz) as f64;
                    }
                }
            }
        }
        Some(acc as f32)
    }

    /// Physical position of a voxel centre.
    pub fn voxel_to_physical(&self, offset: usize) -> Point<3> {
        let [x, y, z] = self.coords(offset);
        self.metadata.index_to_physical(&Point::new([x as f64, y as f64, z as f64]))
    }

    /// Whether both volumes share dims and geometry.
    pub fn same_grid(&self, other: &Self) -> bool {
        self.dims == other.dims && self.metadata.approx_eq(&other.metadata)
    }

    pub fn ensure_same_grid(&self, other: &Self, what: &str) -> Result<()> {
        if self.same_grid(other) {
            Ok(())
        } else {
            Err(ImageError::GridMismatch(format!("{what}: {:?} vs {:?}", self.dims, other.dims)))
        }
    }

    /// Number of voxels above `threshold`.
    pub fn count_above(&self, threshold: f32) -> usize {
        self.values.iter().filter(|v| **v > threshold).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Volume {
        // value = x + 10 y + 100 z on a 3x2x2 grid
        let dims = [3, 2, 2];
        let mut values = Vec::new();
        for z in 0..2 {
            for y in 0..2 {
                for x in 0..3 {
                    values.push((x + 10 * y + 100 * z) as f32);
                }
            }
        }
        Volume::new(values, dims, ImageMetadata::default())
    }

    #[test]
    fn test_offsets_follow_tensor_layout() {
        let v = ramp();
        assert_eq!(v.shape(), [2, 2, 3]);
        assert_eq!(v.get(2, 1, 1), 112.0);
        let off = v.offset(2, 1, 1);
        assert_eq!(v.coords(off), [2, 1, 1]);
    }

    #[test]
    fn test_sampling() {
        let v = ramp();
        assert_eq!(v.sample_nearest(&[1.4, 0.6, 0.0]), Some(11.0));
        assert_eq!(v.sample_nearest(&[3.0, 0.0, 0.0]), None);
        let mid = v.sample_linear(&[0.5, 0.5, 0.5]).unwrap();
        assert!((mid - 55.5).abs() < 1e-4);
        let edge = v.sample_linear(&[2.0, 1.0, 1.0]).unwrap();
        assert!((edge - 112.0).abs() < 1e-4);
        assert_eq!(v.sample_linear(&[-1.0, 0.0, 0.0]), None);
    }
}
