//! Metric trait for image similarity measurement.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tractk_core::image::grid::generate_grid_range;
use tractk_core::image::Image;
use tractk_core::interpolation::{Interpolator, LinearInterpolator};
use tractk_core::transform::Transform;
use crate::error::RegistrationError;

/// Grid points pushed through the transform per batch.
const CHUNK_SIZE: usize = 32768;

/// Measures dissimilarity between a fixed image and a moving image pulled
/// onto the fixed grid. Lower is better.
pub trait Metric<B: Backend> {
    /// `transform` maps fixed physical points into moving physical space.
    fn forward(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> Tensor<B, 1>;

    fn name(&self) -> &'static str;
}

/// Moving intensities at every fixed voxel, in fixed flat order.
pub(crate) fn warped_values<B: Backend>(
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
    transform: &impl Transform<B, 3>,
    interpolator: &LinearInterpolator,
) -> Tensor<B, 1> {
    let shape = fixed.shape();
    let device = fixed.data().device();
    let n = fixed.num_voxels();
    let mut chunks = Vec::with_capacity(n.div_ceil(CHUNK_SIZE));
    let mut start = 0;
    while start < n {
        let end = (start + CHUNK_SIZE).min(n);
        let indices = generate_grid_range::<B>(shape, start..end, &device);
        let points = transform.transform_points(fixed.index_to_world_tensor(indices));
        let moving_indices = moving.world_to_index_tensor(points);
        chunks.push(interpolator.interpolate(moving.data(), moving_indices));
        start = end;
    }
    Tensor::cat(chunks, 0)
}

/// Metric selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Mse,
    #[default]
    Ncc,
}

impl FromStr for MetricKind {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mse" => Ok(Self::Mse),
            "ncc" => Ok(Self::Ncc),
            other => Err(RegistrationError::invalid_configuration(format!(
                "unknown registration metric '{other}' (expected mse or ncc)"
            ))),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mse => "mse",
            Self::Ncc => "ncc",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_parsing() {
        assert_eq!("ncc".parse::<MetricKind>().unwrap(), MetricKind::Ncc);
        assert_eq!(MetricKind::default(), MetricKind::Ncc);
        assert!("mattes".parse::<MetricKind>().is_err());
    }
}
