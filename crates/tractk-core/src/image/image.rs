//! Image type with physical metadata and coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use crate::error::{ImageError, Result};
use crate::image::metadata::ImageMetadata;
use crate::spatial::{Direction, Point, Spacing};

/// Volumetric image: tensor data plus the grid geometry that places it in
/// physical space.
///
/// For `D = 3` the tensor is laid out `[Z, Y, X]`; continuous indices and
/// physical points are ordered `(x, y, z)`.
///
/// # Examples
/// ```rust
/// use tractk_core::Image;
/// use tractk_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// let device = Default::default();
/// let data = Tensor::<NdArray<f32>, 3>::zeros([4, 5, 6], &device);
/// let image = Image::new(data, Point3::origin(), Spacing3::uniform(2.0), Direction3::identity());
/// assert_eq!(image.shape(), [4, 5, 6]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    metadata: ImageMetadata<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Self {
        Self::from_metadata(data, ImageMetadata::new(origin, spacing, direction))
    }

    pub fn from_metadata(data: Tensor<B, D>, metadata: ImageMetadata<D>) -> Self {
        Self { data, metadata }
    }

    /// Build an image from a host buffer in tensor (row-major `[Z, Y, X]`) order.
    pub fn from_vec(
        values: Vec<f32>,
        shape: [usize; D],
        metadata: ImageMetadata<D>,
        device: &B::Device,
    ) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(ImageError::BufferLength {
                shape: shape.to_vec(),
                expected,
                actual: values.len(),
            });
        }
        let data = Tensor::<B, D>::from_data(TensorData::new(values, Shape::new(shape)), device);
        Ok(Self::from_metadata(data, metadata))
    }

    /// New image on the same grid holding different data.
    pub fn with_data(&self, data: Tensor<B, D>) -> Self {
        Self::from_metadata(data, self.metadata)
    }

    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    pub fn into_tensor(self) -> Tensor<B, D> {
        self.data
    }

    pub fn metadata(&self) -> &ImageMetadata<D> {
        &self.metadata
    }

    pub fn origin(&self) -> &Point<D> {
        self.metadata.origin()
    }

    pub fn spacing(&self) -> &Spacing<D> {
        self.metadata.spacing()
    }

    pub fn direction(&self) -> &Direction<D> {
        self.metadata.direction()
    }

    pub fn shape(&self) -> [usize; D] {
        self.data.shape().dims.try_into().expect("Tensor rank mismatch")
    }

    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    /// Copy voxel values to the host in tensor order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .expect("converted tensor data is f32")
    }

    /// Whether both images share shape and geometry.
    pub fn same_grid(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.metadata.approx_eq(&other.metadata)
    }

    /// Fail unless both images share a grid; `what` names the pair in the error.
    pub fn ensure_same_grid(&self, other: &Self, what: &str) -> Result<()> {
        if self.same_grid(other) {
            Ok(())
        } else {
            Err(ImageError::GridMismatch(format!(
                "{what}: {:?} vs {:?}",
                self.shape(),
                other.shape()
            )))
        }
    }

    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Point<D> {
        self.metadata.physical_to_index(point)
    }

    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        self.metadata.index_to_physical(index)
    }

    /// Map `[N, D]` physical points to continuous indices.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.metadata.world_to_index_tensor(points)
    }

    /// Map `[N, D]` continuous indices to physical points.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        self.metadata.index_to_world_tensor(indices)
    }
}

impl<B: Backend> Image<B, 3> {
    /// Zero-mean, unit-variance copy computed over nonzero voxels; the
    /// background stays at zero.
    pub fn normalized(&self) -> Self {
        let values = self.to_vec();
        let foreground: Vec<f64> = values.iter().filter(|v| **v != 0.0).map(|v| *v as f64).collect();
        if foreground.is_empty() {
            return self.clone();
        }
        let n = foreground.len() as f64;
        let mean = foreground.iter().sum::<f64>() / n;
        let var = foreground.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt().max(1e-12);
        let normalized = values
            .iter()
            .map(|v| if *v == 0.0 { 0.0 } else { ((*v as f64 - mean) / std) as f32 })
            .collect();
        let device = self.data.device();
        Self::from_vec(normalized, self.shape(), self.metadata, &device)
            .expect("shape is unchanged")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn image(spacing: [f64; 3], origin: [f64; 3]) -> Image<Backend, 3> {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
        Image::new(data, Point::new(origin), Spacing::new(spacing), Direction::identity())
    }

    #[test]
    fn test_image_creation() {
        let image = image([1.0; 3], [0.0; 3]);
        assert_eq!(image.shape(), [10, 10, 10]);
        assert_eq!(image.num_voxels(), 1000);
        assert_eq!(image.direction(), &Direction::identity());
    }

    #[test]
    fn test_non_unit_spacing_and_origin() {
        let image = image([2.0, 2.0, 2.0], [10.0, 20.0, 30.0]);
        let index = image.transform_physical_point_to_continuous_index(&Point::new([20.0, 30.0, 40.0]));
        assert_eq!(index.to_array(), [5.0, 5.0, 5.0]);
        let point = image.transform_continuous_index_to_physical_point(&index);
        assert_eq!(point.to_array(), [20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_from_vec_checks_length() {
        let device = Default::default();
        let err = Image::<Backend, 3>::from_vec(vec![0.0; 5], [2, 2, 2], ImageMetadata::default(), &device);
        assert!(matches!(err, Err(ImageError::BufferLength { expected: 8, actual: 5, .. })));

        let ok = Image::<Backend, 3>::from_vec((0..8).map(|v| v as f32).collect(), [2, 2, 2], ImageMetadata::default(), &device)
            .unwrap();
        assert_eq!(ok.to_vec()[7], 7.0);
    }

    #[test]
    fn test_same_grid() {
        let a = image([1.0; 3], [0.0; 3]);
        let b = image([1.0; 3], [0.0; 3]);
        let c = image([1.0; 3], [1.0, 0.0, 0.0]);
        assert!(a.same_grid(&b));
        assert!(a.ensure_same_grid(&c, "a/c").is_err());
    }

    #[test]
    fn test_normalized_keeps_background() {
        let device = Default::default();
        let values = vec![0.0, 2.0, 4.0, 0.0, 6.0, 0.0, 0.0, 0.0];
        let image = Image::<Backend, 3>::from_vec(values, [2, 2, 2], ImageMetadata::default(), &device).unwrap();
        let norm = image.normalized().to_vec();
        assert_eq!(norm[0], 0.0);
        assert!((norm[2]).abs() < 1e-6);
        assert!((norm[1] + norm[4]).abs() < 1e-6);
    }
}
