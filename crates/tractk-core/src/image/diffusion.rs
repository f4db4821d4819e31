//! Four-dimensional diffusion-weighted images.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use crate::image::{Image, ImageMetadata};

/// Diffusion-weighted series: one 3D frame per gradient.
///
/// Data is laid out `[frames, Z, Y, X]`; every frame shares `metadata`.
#[derive(Debug, Clone)]
pub struct DiffusionImage<B: Backend> {
    data: Tensor<B, 4>,
    metadata: ImageMetadata<3>,
}

impl<B: Backend> DiffusionImage<B> {
    pub fn new(data: Tensor<B, 4>, metadata: ImageMetadata<3>) -> Self {
        Self { data, metadata }
    }

    pub fn data(&self) -> &Tensor<B, 4> {
        &self.data
    }

    pub fn metadata(&self) -> &ImageMetadata<3> {
        &self.metadata
    }

    pub fn num_frames(&self) -> usize {
        self.data.dims()[0]
    }

    /// Spatial shape `[Z, Y, X]`.
    pub fn spatial_shape(&self) -> [usize; 3] {
        let [_, z, y, x] = self.data.dims();
        [z, y, x]
    }

    /// Extract one frame as a 3D image.
    pub fn frame(&self, index: usize) -> Image<B, 3> {
        let [_, z, y, x] = self.data.dims();
        let frame = self.data.clone().narrow(0, index, 1).reshape([z, y, x]);
        Image::from_metadata(frame, self.metadata)
    }

    /// Voxel-wise mean over the selected frames.
    pub fn mean_of_frames(&self, frames: &[usize]) -> Image<B, 3> {
        let [z, y, x] = self.spatial_shape();
        let device = self.data.device();
        let mut acc = Tensor::<B, 3>::zeros([z, y, x], &device);
        for &f in frames {
            acc = acc + self.frame(f).into_tensor();
        }
        let n = frames.len().max(1) as f64;
        Image::from_metadata(acc.div_scalar(n), self.metadata)
    }

    /// Host copy of the signal, voxel-major: `values[voxel * frames + frame]`
    /// with voxels in `[Z, Y, X]` order.
    pub fn voxel_signals(&self) -> Vec<f32> {
        self.data
            .clone()
            .permute([1, 2, 3, 0])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .expect("converted tensor data is f32")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Shape, TensorData};
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn series() -> DiffusionImage<Backend> {
        // 3 frames over a 1x2x2 grid; frame f holds 10 * f + voxel
        let values: Vec<f32> = (0..3)
            .flat_map(|f| (0..4).map(move |v| (10 * f + v) as f32))
            .collect();
        let data = Tensor::<Backend, 4>::from_data(
            TensorData::new(values, Shape::new([3, 1, 2, 2])),
            &Default::default(),
        );
        DiffusionImage::new(data, ImageMetadata::default())
    }

    #[test]
    fn test_frames_and_signals() {
        let dwi = series();
        assert_eq!(dwi.num_frames(), 3);
        assert_eq!(dwi.spatial_shape(), [1, 2, 2]);
        assert_eq!(dwi.frame(2).to_vec(), vec![20.0, 21.0, 22.0, 23.0]);

        let signals = dwi.voxel_signals();
        assert_eq!(&signals[0..3], &[0.0, 10.0, 20.0]);
        assert_eq!(&signals[9..12], &[3.0, 13.0, 23.0]);
    }

    #[test]
    fn test_mean_of_frames() {
        let dwi = series();
        let mean = dwi.mean_of_frames(&[0, 2]).to_vec();
        assert_eq!(mean, vec![10.0, 11.0, 12.0, 13.0]);
    }
}
