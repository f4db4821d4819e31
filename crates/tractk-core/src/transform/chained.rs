//! Two trainable transforms applied in sequence.

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::marker::PhantomData;
use super::composite::CompositeTransform;
use super::record::TransformRecord;
use super::trait_::Transform;

/// `y = second(first(x))`, optimised jointly as one module.
#[derive(Module, Debug)]
pub struct ChainedTransform<B: Backend, T1, T2, const D: usize> {
    pub first: T1,
    pub second: T2,
    pub _phantom: PhantomData<B>,
}

impl<B: Backend, T1, T2, const D: usize> ChainedTransform<B, T1, T2, D> {
    pub fn new(first: T1, second: T2) -> Self {
        Self {
            first,
            second,
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend, T1, T2, const D: usize> Transform<B, D> for ChainedTransform<B, T1, T2, D>
where
    T1: Transform<B, D> + Module<B>,
    T2: Transform<B, D> + Module<B>,
{
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.second.transform_points(self.first.transform_points(points))
    }

    fn inverse(&self) -> Option<Box<dyn Transform<B, D>>> {
        let first = self.first.inverse()?;
        let second = self.second.inverse()?;
        Some(Box::new(CompositeTransform::new(vec![second, first])))
    }

    fn to_record(&self) -> TransformRecord {
        TransformRecord::Chain {
            stages: vec![self.first.to_record(), self.second.to_record()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::AffineTransform;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_chain_order_and_inverse() {
        let device = Default::default();
        let scale = AffineTransform::<TestBackend, 2>::from_values(&[2.0, 0.0, 0.0, 2.0], &[0.0, 0.0], &[0.0, 0.0], &device);
        let shift = AffineTransform::<TestBackend, 2>::from_values(&[1.0, 0.0, 0.0, 1.0], &[1.0, 0.0], &[0.0, 0.0], &device);
        let chain = ChainedTransform::<TestBackend, _, _, 2>::new(scale, shift);

        // scale then shift: (1, 1) -> (2, 2) -> (3, 2)
        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0]], &device);
        let out = chain.transform_points(points);
        assert_eq!(out.clone().into_data().to_vec::<f32>().unwrap(), vec![3.0, 2.0]);

        let back = chain.inverse().unwrap().transform_points(out);
        let v = back.into_data().to_vec::<f32>().unwrap();
        assert!((v[0] - 1.0).abs() < 1e-6 && (v[1] - 1.0).abs() < 1e-6);

        assert!(matches!(chain.to_record(), TransformRecord::Chain { ref stages } if stages.len() == 2));
    }
}
