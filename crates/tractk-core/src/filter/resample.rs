//! Resample image filter.

use std::marker::PhantomData;
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor};
use crate::image::grid::generate_grid_range;
use crate::image::{Image, ImageMetadata};
use crate::interpolation::Interpolator;
use crate::transform::Transform;

/// Output voxels processed per batch.
const CHUNK_SIZE: usize = 32768;

/// Resamples an image onto a new grid.
///
/// `transform` maps output physical points to input physical points, so a
/// registration transform (fixed -> moving) pulls the moving image onto the
/// fixed grid. Output voxels whose source falls outside the input grid get
/// `default_pixel_value`.
pub struct ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    size: [usize; 3],
    metadata: ImageMetadata<3>,
    transform: T,
    interpolator: I,
    default_pixel_value: f64,
    _phantom: PhantomData<B>,
}

impl<B, T, I> ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    /// `size` is the output tensor shape `[Z, Y, X]`.
    pub fn new(size: [usize; 3], metadata: ImageMetadata<3>, transform: T, interpolator: I) -> Self {
        Self {
            size,
            metadata,
            transform,
            interpolator,
            default_pixel_value: 0.0,
            _phantom: PhantomData,
        }
    }

    /// Output on the grid of `reference`.
    pub fn new_from_reference(reference: &Image<B, 3>, transform: T, interpolator: I) -> Self {
        Self::new(reference.shape(), *reference.metadata(), transform, interpolator)
    }

    pub fn with_default_pixel_value(mut self, value: f64) -> Self {
        self.default_pixel_value = value;
        self
    }

    pub fn apply(&self, input: &Image<B, 3>) -> Image<B, 3> {
        let device = input.data().device();
        let n: usize = self.size.iter().product();
        let [d0, d1, d2] = input.shape();

        let mut chunks = Vec::with_capacity(n.div_ceil(CHUNK_SIZE));
        let mut start = 0;
        while start < n {
            let end = (start + CHUNK_SIZE).min(n);
            let indices = generate_grid_range::<B>(self.size, start..end, &device);
            let points = self.metadata.index_to_world_tensor(indices);
            let source = input.world_to_index_tensor(self.transform.transform_points(points));

            let mut outside = Tensor::<B, 1>::zeros([end - start], &device);
            for (axis, dim) in [d2, d1, d0].into_iter().enumerate() {
                let c = source.clone().narrow(1, axis, 1).squeeze::<1>(1);
                outside = outside
                    + c.clone().lower_elem(-0.5).float()
                    + c.greater_elem(dim as f64 - 0.5).float();
            }

            let values = self
                .interpolator
                .interpolate(input.data(), source)
                .mask_fill(outside.greater_elem(0.0), self.default_pixel_value);
            chunks.push(values);
            start = end;
        }

        let data = Tensor::cat(chunks, 0).reshape(Shape::new(self.size));
        Image::from_metadata(data, self.metadata)
    }
}
