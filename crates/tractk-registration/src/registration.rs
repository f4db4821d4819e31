//! Gradient-descent fitting of one trainable transform.

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use std::marker::PhantomData;
use tractk_core::image::Image;
use tractk_core::transform::Transform;
use crate::error::{RegistrationError, Result};
use crate::metric::Metric;
use crate::optimizer::Optimizer;

/// Iterations between loss reports.
const REPORT_EVERY: usize = 50;

/// Pairs an optimiser with a metric for one alignment stage.
pub struct Registration<B, O, M, T>
where
    B: AutodiffBackend,
    O: Optimizer<T, B>,
    M: Metric<B>,
    T: Transform<B, 3> + AutodiffModule<B>,
{
    optimizer: O,
    metric: M,
    _stage: PhantomData<(B, T)>,
}

impl<B, O, M, T> Registration<B, O, M, T>
where
    B: AutodiffBackend,
    O: Optimizer<T, B>,
    M: Metric<B>,
    T: Transform<B, 3> + AutodiffModule<B>,
{
    pub fn new(optimizer: O, metric: M) -> Self {
        Self { optimizer, metric, _stage: PhantomData }
    }

    /// Run `iterations` steps pulling `moving` onto `fixed`.
    ///
    /// The loss is checked at every report; a non-finite value aborts the
    /// stage with [`RegistrationError::NumericalInstability`].
    pub fn execute(
        &mut self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        mut transform: T,
        iterations: usize,
        learning_rate: f64,
    ) -> Result<T> {
        self.optimizer.set_learning_rate(learning_rate);
        let mut first = None;

        for iteration in 0..iterations {
            let loss = self.metric.forward(fixed, moving, &transform);
            if iteration % REPORT_EVERY == 0 || iteration + 1 == iterations {
                let value: f64 = loss.clone().into_scalar().elem();
                if !value.is_finite() {
                    return Err(RegistrationError::numerical_instability(format!(
                        "{} loss is {value} at iteration {iteration}",
                        self.metric.name()
                    )));
                }
                first.get_or_insert(value);
                tracing::debug!(metric = self.metric.name(), iteration, loss = value, "registration step");
            }
            let grads = GradientsParams::from_grads(loss.backward(), &transform);
            transform = self.optimizer.step(transform, grads);
        }

        if let Some(initial) = first {
            let final_loss: f64 = self.metric.forward(fixed, moving, &transform).into_scalar().elem();
            tracing::info!(
                metric = self.metric.name(),
                iterations,
                initial_loss = initial,
                final_loss,
                "stage finished"
            );
        }
        Ok(transform)
    }
}
