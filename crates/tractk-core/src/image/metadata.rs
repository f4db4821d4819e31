//! Voxel-grid geometry shared by every image type.
//!
//! Continuous indices are ordered `(x, y, z)` while tensor data is laid out
//! `[Z, Y, X]`. The mapping between index and physical space is
//! `point = origin + Direction * (index * spacing)`.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use serde::{Deserialize, Serialize};
use crate::spatial::{Direction, Point, Spacing, Vector};

/// Tolerance used when deciding whether two grids coincide.
pub const GRID_TOLERANCE: f64 = 1e-4;

/// Origin, spacing and orientation of a voxel grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata<const D: usize> {
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
}

impl<const D: usize> ImageMetadata<D> {
    pub fn new(origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        Self {
            origin,
            spacing,
            direction,
        }
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Same geometry with a different voxel size, keeping origin and axes.
    pub fn with_spacing(mut self, spacing: Spacing<D>) -> Self {
        self.spacing = spacing;
        self
    }

    /// Whether two grids agree on origin, spacing and direction.
    pub fn approx_eq(&self, other: &Self) -> bool {
        (0..D).all(|i| {
            (self.origin[i] - other.origin[i]).abs() < GRID_TOLERANCE
                && (self.spacing[i] - other.spacing[i]).abs() < GRID_TOLERANCE
                && (0..D).all(|j| {
                    (self.direction[(i, j)] - other.direction[(i, j)]).abs() < GRID_TOLERANCE
                })
        })
    }

    /// Convert a physical point to a continuous index.
    pub fn physical_to_index(&self, point: &Point<D>) -> Point<D> {
        let diff = *point - self.origin;
        let inv_dir = self
            .direction
            .try_inverse()
            .expect("Direction matrix must be invertible");
        let rotated = inv_dir * diff;
        let mut index = Point::<D>::origin();
        for i in 0..D {
            index[i] = rotated[i] / self.spacing[i];
        }
        index
    }

    /// Convert a continuous index to a physical point.
    pub fn index_to_physical(&self, index: &Point<D>) -> Point<D> {
        let mut scaled = Vector::<D>::zeros();
        for i in 0..D {
            scaled[i] = index[i] * self.spacing[i];
        }
        self.origin + self.direction * scaled
    }

    /// Batch version of [`Self::physical_to_index`] on `[N, D]` tensors.
    pub fn world_to_index_tensor<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let origin = self.origin_tensor::<B>(&device);

        // I = (P - O) @ T with T[r, c] = inv(Dir)[c, r] / s[c]
        let inv_dir = self
            .direction
            .try_inverse()
            .expect("Direction matrix must be invertible");
        let mut t_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                t_data.push((inv_dir[(c, r)] / self.spacing[c]) as f32);
            }
        }
        let t = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([D, D])), &device);

        (points - origin).matmul(t)
    }

    /// Batch version of [`Self::index_to_physical`] on `[N, D]` tensors.
    pub fn index_to_world_tensor<B: Backend>(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();
        let origin = self.origin_tensor::<B>(&device);

        // P = O + I @ M with M[r, c] = s[r] * Dir[c, r]
        let mut m_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                m_data.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m = Tensor::<B, 2>::from_data(TensorData::new(m_data, Shape::new([D, D])), &device);

        indices.matmul(m) + origin
    }

    fn origin_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let origin: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(origin, Shape::new([D])), device).reshape([1, D])
    }
}

impl ImageMetadata<3> {
    /// Voxel-to-world affine as a row-major 4x4 matrix.
    pub fn affine(&self) -> [[f64; 4]; 4] {
        let mut affine = [[0.0; 4]; 4];
        for r in 0..3 {
            for c in 0..3 {
                affine[r][c] = self.direction[(r, c)] * self.spacing[c];
            }
            affine[r][3] = self.origin[r];
        }
        affine[3][3] = 1.0;
        affine
    }

    /// Physical centre of a grid with the given `[Z, Y, X]` shape.
    pub fn center(&self, shape: [usize; 3]) -> Point<3> {
        let index = Point::new([
            (shape[2] as f64 - 1.0) / 2.0,
            (shape[1] as f64 - 1.0) / 2.0,
            (shape[0] as f64 - 1.0) / 2.0,
        ]);
        self.index_to_physical(&index)
    }
}

impl<const D: usize> Default for ImageMetadata<D> {
    fn default() -> Self {
        Self {
            origin: Point::origin(),
            spacing: Spacing::uniform(1.0),
            direction: Direction::identity(),
        }
    }
}
