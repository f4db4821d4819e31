//! Probabilistic: a vertex drawn with probability proportional to the ODF
//! inside the cone.

use rand::rngs::StdRng;
use rand::Rng;
use crate::direction::{pmf, Cone, DirectionGetter, PeakFinder};
use crate::reconstruction::FittedModel;

pub struct ProbabilisticDirectionGetter<'a> {
    peaks: PeakFinder<'a>,
    cone: Cone,
    pmf_threshold: f64,
}

impl<'a> ProbabilisticDirectionGetter<'a> {
    pub fn new(peaks: PeakFinder<'a>, cone: Cone, pmf_threshold: f64) -> Self {
        Self { peaks, cone, pmf_threshold }
    }
}

impl DirectionGetter for ProbabilisticDirectionGetter<'_> {
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
        let pmf = pmf(&model.odf_at(index)?, self.pmf_threshold);
        let sphere = self.peaks.sphere();
        let candidates: Vec<([f64; 3], f64)> = pmf
            .iter()
            .enumerate()
            .filter(|(_, p)| **p > 0.0)
            .filter_map(|(i, p)| self.cone.admit(previous, &sphere.vertex(i)).map(|v| (v, *p)))
            .collect();
        let total: f64 = candidates.iter().map(|(_, p)| p).sum();
        if candidates.is_empty() || total <= 0.0 {
            return None;
        }

        let mut draw = rng.random::<f64>() * total;
        for (v, p) in &candidates {
            if draw < *p {
                return Some(*v);
            }
            draw -= p;
        }
        candidates.last().map(|(v, _)| *v)
    }
}
