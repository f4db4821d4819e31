//! Closest peak: the ODF peak best aligned with the previous step.

use rand::rngs::StdRng;
use crate::direction::{closest_peak, Cone, DirectionGetter, PeakFinder};
use crate::reconstruction::FittedModel;

pub struct ClosestPeakDirectionGetter<'a> {
    peaks: PeakFinder<'a>,
    cone: Cone,
}

impl<'a> ClosestPeakDirectionGetter<'a> {
    pub fn new(peaks: PeakFinder<'a>, cone: Cone) -> Self {
        Self { peaks, cone }
    }
}

impl DirectionGetter for ClosestPeakDirectionGetter<'_> {
    fn peak_finder(&self) -> &PeakFinder<'_> {
        &self.peaks
    }

    fn next_direction(
        &self,
        model: &FittedModel,
        index: &[f64; 3],
        previous: &[f64; 3],
        _rng: &mut StdRng,
    ) -> Option<[f64; 3]> {
        let peaks = self.peaks.find(&model.odf_at(index)?);
        closest_peak(&peaks, previous, &self.cone)
    }
}
