use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use std::ops::Range;

/// Continuous indices of every voxel of a `[Z, Y, X]` grid.
///
/// Returns `[N, 3]` rows ordered `(x, y, z)`, z outermost, matching the
/// flattened tensor layout.
pub fn generate_grid<B: Backend>(shape: [usize; 3], device: &B::Device) -> Tensor<B, 2> {
    let total = shape.iter().product();
    generate_grid_range(shape, 0..total, device)
}

/// Rows `range` of [`generate_grid`], for chunked sampling.
pub fn generate_grid_range<B: Backend>(
    shape: [usize; 3],
    range: Range<usize>,
    device: &B::Device,
) -> Tensor<B, 2> {
    let [_, h, w] = shape;
    let n = range.len();
    let mut grid = Vec::with_capacity(n * 3);
    for flat in range {
        grid.push((flat % w) as f32);
        grid.push(((flat / w) % h) as f32);
        grid.push((flat / (w * h)) as f32);
    }
    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([n * 3])), device).reshape([n, 3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    #[test]
    fn test_grid_order() {
        let device = Default::default();
        let grid = generate_grid::<NdArray<f32>>([2, 2, 3], &device);
        assert_eq!(grid.dims(), [12, 3]);
        let v = grid.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&v[0..3], &[0.0, 0.0, 0.0]);
        assert_eq!(&v[3..6], &[1.0, 0.0, 0.0]);
        assert_eq!(&v[9..12], &[0.0, 1.0, 0.0]);
        assert_eq!(&v[33..36], &[2.0, 1.0, 1.0]);
    }

    #[test]
    fn test_grid_range() {
        let device = Default::default();
        let grid = generate_grid_range::<NdArray<f32>>([2, 2, 3], 6..8, &device);
        let v = grid.into_data().to_vec::<f32>().unwrap();
        assert_eq!(v, vec![0.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
    }
}
