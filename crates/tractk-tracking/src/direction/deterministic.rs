//! Deterministic maximum: the largest ODF value inside the cone.

use rand::rngs::StdRng;
use crate::direction::{pmf, Cone, DirectionGetter, PeakFinder};
use crate::reconstruction::FittedModel;

pub struct DeterministicMaximumDirectionGetter<'a> {
    peaks: PeakFinder<'a>,
    cone: Cone,
    pmf_threshold: f64,
}

impl<'a> DeterministicMaximumDirectionGetter<'a> {
    pub fn new(peaks: PeakFinder<'a>, cone: Cone, pmf_threshold: f64) -> Self {
        Self { peaks, cone, pmf_threshold }
    }
}

impl DirectionGetter for DeterministicMaximumDirectionGetter<'_> {
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
        let pmf = pmf(&model.odf_at(index)?, self.pmf_threshold);
        let sphere = self.peaks.sphere();
        let mut best: Option<([f64; 3], f64)> = None;
        for (i, value) in pmf.iter().enumerate() {
            if *value <= 0.0 || best.is_some_and(|(_, b)| *value <= b) {
                continue;
            }
            if let Some(v) = self.cone.admit(previous, &sphere.vertex(i)) {
                best = Some((v, *value));
            }
        }
        best.map(|(v, _)| v)
    }
}
