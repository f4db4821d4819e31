//! Residual bootstrap.
//!
//! The nearest voxel's fitted signal is perturbed by its own residuals drawn
//! with replacement, refitted, and the closest peak of the refit is taken.

use rand::rngs::StdRng;
use rand::Rng;
use crate::direction::{closest_peak, Cone, DirectionGetter, PeakFinder};
use crate::reconstruction::FittedModel;

pub struct BootstrapDirectionGetter<'a> {
    peaks: PeakFinder<'a>,
    cone: Cone,
}

impl<'a> BootstrapDirectionGetter<'a> {
    pub fn new(peaks: PeakFinder<'a>, cone: Cone) -> Self {
        Self { peaks, cone }
    }
}

impl DirectionGetter for BootstrapDirectionGetter<'_> {
    fn peak_finder(&self) -> &PeakFinder<'_> {
        &self.peaks
    }

    fn next_direction(
        &self,
        model: &FittedModel,
        index: &[f64; 3],
        previous: &[f64; 3],
        rng: &mut StdRng,
    ) -> Option<[f64; 3]> {
        let offset = model.voxel_at(index)?;
        let params = model.params(offset)?;
        let signal = model.signal(offset)?;
        let predicted = model.predict(params);
        let residuals: Vec<f64> = signal.iter().zip(&predicted).map(|(s, p)| *s as f64 - p).collect();

        let resampled: Vec<f64> = predicted
            .iter()
            .map(|p| p + residuals[rng.random_range(0..residuals.len())])
            .collect();
        let odf = match model.refit(&resampled) {
            Some(refit) => model.odf(&refit),
            None => model.odf(params),
        };
        closest_peak(&self.peaks.find(&odf), previous, &self.cone)
    }
}
