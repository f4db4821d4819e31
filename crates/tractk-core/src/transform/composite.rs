//! Runtime sequence of boxed transforms.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use super::record::TransformRecord;
use super::trait_::Transform;

/// Applies `stages` in order. Built when transforms are loaded from disk or
/// when a chain is inverted.
pub struct CompositeTransform<B: Backend, const D: usize> {
    stages: Vec<Box<dyn Transform<B, D>>>,
}

impl<B: Backend, const D: usize> CompositeTransform<B, D> {
    pub fn new(stages: Vec<Box<dyn Transform<B, D>>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for CompositeTransform<B, D> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.stages
            .iter()
            .fold(points, |p, stage| stage.transform_points(p))
    }

    fn inverse(&self) -> Option<Box<dyn Transform<B, D>>> {
        let stages = self
            .stages
            .iter()
            .rev()
            .map(|s| s.inverse())
            .collect::<Option<Vec<_>>>()?;
        Some(Box::new(Self::new(stages)))
    }

    fn to_record(&self) -> TransformRecord {
        TransformRecord::Chain {
            stages: self.stages.iter().map(|s| s.to_record()).collect(),
        }
    }
}
