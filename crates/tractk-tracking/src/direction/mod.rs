//! Direction-getting strategies.
//!
//! Every strategy reads the fitted model at the current position and returns
//! the next unit step direction inside a cone around the previous one, or
//! `None` when no admissible direction exists. Directions are in the
//! voxel-axis frame of the diffusion grid.

pub mod bootstrap;
pub mod closest;
pub mod deterministic;
pub mod peaks;
pub mod probabilistic;

pub use bootstrap::BootstrapDirectionGetter;
pub use closest::ClosestPeakDirectionGetter;
pub use deterministic::DeterministicMaximumDirectionGetter;
pub use peaks::PeakFinder;
pub use probabilistic::ProbabilisticDirectionGetter;

use rand::rngs::StdRng;
use crate::config::{DirectionGetterKind, TrackingConfig};
use crate::reconstruction::FittedModel;
use crate::sphere::{dot, Sphere};

pub trait DirectionGetter {
    fn peak_finder(&self) -> &PeakFinder<'_>;

    /// Starting directions at a seed: the ODF peaks, strongest first.
    fn initial_directions(&self, model: &FittedModel, index: &[f64; 3]) -> Vec<[f64; 3]> {
        model
            .odf_at(index)
            .map(|odf| self.peak_finder().find(&odf))
            .unwrap_or_default()
    }

    fn next_direction(
        &self,
        model: &FittedModel,
        index: &[f64; 3],
        previous: &[f64; 3],
        rng: &mut StdRng,
    ) -> Option<[f64; 3]>;
}

/// Admissible directions around the previous step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cone {
    cos_max: f64,
}

impl Cone {
    pub fn new(max_angle_deg: f64) -> Self {
        Self { cos_max: max_angle_deg.to_radians().cos() }
    }

    /// `v` or its antipode, whichever continues `previous`, if within the cone.
    pub fn admit(&self, previous: &[f64; 3], v: &[f64; 3]) -> Option<[f64; 3]> {
        let c = dot(previous, v);
        if c.abs() < self.cos_max {
            None
        } else if c >= 0.0 {
            Some(*v)
        } else {
            Some([-v[0], -v[1], -v[2]])
        }
    }
}

/// ODF clipped at zero with values under `threshold * max` removed.
pub(crate) fn pmf(odf: &[f64], threshold: f64) -> Vec<f64> {
    let max = odf.iter().cloned().fold(0.0, f64::max);
    let cut = threshold * max;
    odf.iter().map(|v| if *v > cut && *v > 0.0 { *v } else { 0.0 }).collect()
}

/// Peak in the cone that best continues `previous`.
pub(crate) fn closest_peak(peaks: &[[f64; 3]], previous: &[f64; 3], cone: &Cone) -> Option<[f64; 3]> {
    peaks
        .iter()
        .filter_map(|p| cone.admit(previous, p))
        .max_by(|a, b| dot(a, previous).total_cmp(&dot(b, previous)))
}

/// The strategy selected by configuration.
pub enum DirectionStrategy<'a> {
    Deterministic(DeterministicMaximumDirectionGetter<'a>),
    Probabilistic(ProbabilisticDirectionGetter<'a>),
    ClosestPeak(ClosestPeakDirectionGetter<'a>),
    Bootstrap(BootstrapDirectionGetter<'a>),
}

impl<'a> DirectionStrategy<'a> {
    /// Strategy for one pass with turning angle `max_angle_deg`.
    pub fn new(kind: DirectionGetterKind, config: &TrackingConfig, sphere: &'a Sphere, max_angle_deg: f64) -> Self {
        let peaks = PeakFinder::new(
            sphere,
            config.relative_peak_threshold,
            config.min_separation_angle,
            config.max_crossing,
        );
        let cone = Cone::new(max_angle_deg);
        match kind {
            DirectionGetterKind::Det => {
                Self::Deterministic(DeterministicMaximumDirectionGetter::new(peaks, cone, config.pmf_threshold))
            }
            DirectionGetterKind::Prob => {
                Self::Probabilistic(ProbabilisticDirectionGetter::new(peaks, cone, config.pmf_threshold))
            }
            DirectionGetterKind::Closest => Self::ClosestPeak(ClosestPeakDirectionGetter::new(peaks, cone)),
            DirectionGetterKind::Boot => Self::Bootstrap(BootstrapDirectionGetter::new(peaks, cone)),
        }
    }

    fn inner(&self) -> &dyn DirectionGetter {
        match self {
            Self::Deterministic(g) => g,
            Self::Probabilistic(g) => g,
            Self::ClosestPeak(g) => g,
            Self::Bootstrap(g) => g,
        }
    }
}

impl DirectionGetter for DirectionStrategy<'_> {
    fn peak_finder(&self) -> &PeakFinder<'_> {
        self.inner().peak_finder()
    }

    fn initial_directions(&self, model: &FittedModel, index: &[f64; 3]) -> Vec<[f64; 3]> {
        self.inner().initial_directions(model, index)
    }

    fn next_direction(
        &self,
        model: &FittedModel,
        index: &[f64; 3],
        previous: &[f64; 3],
        rng: &mut StdRng,
    ) -> Option<[f64; 3]> {
        self.inner().next_direction(model, index, previous, rng)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_cone_flips_and_rejects() {
        let cone = Cone::new(30.0);
        assert_eq!(cone.admit(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]), Some([1.0, 0.0, 0.0]));
        assert_eq!(cone.admit(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]), None);
        let c = 40f64.to_radians();
        assert_eq!(cone.admit(&[1.0, 0.0, 0.0], &[c.cos(), c.sin(), 0.0]), None);
    }

    #[test]
    fn test_every_strategy_follows_a_straight_fibre() {
        let sphere = Sphere::fibonacci(724);
        let model = test_support::uniform_model([0.0, 0.0, 1.0], &sphere);
        let config = TrackingConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        for kind in [
            DirectionGetterKind::Det,
            DirectionGetterKind::Prob,
            DirectionGetterKind::Closest,
            DirectionGetterKind::Boot,
        ] {
            let strategy = DirectionStrategy::new(kind, &config, &sphere, 30.0);
            let initial = strategy.initial_directions(&model, &[2.0, 2.0, 2.0]);
            assert_eq!(initial.len(), 1, "{kind}: {initial:?}");
            assert!(initial[0][2].abs() > 0.99);

            let next = strategy
                .next_direction(&model, &[2.0, 2.0, 2.3], &[0.0, 0.0, -1.0], &mut rng)
                .unwrap_or_else(|| panic!("{kind} found no direction"));
            assert!(next[2] < -0.85, "{kind}: {next:?}");

            // perpendicular to the fibre nothing is admissible
            let narrow = DirectionStrategy::new(kind, &config, &sphere, 20.0);
            assert!(narrow
                .next_direction(&model, &[2.0, 2.0, 2.0], &[1.0, 0.0, 0.0], &mut rng)
                .is_none());
        }
    }

    #[test]
    fn test_no_direction_outside_the_model() {
        let sphere = Sphere::fibonacci(100);
        let model = test_support::uniform_model([1.0, 0.0, 0.0], &sphere);
        let strategy = DirectionStrategy::new(DirectionGetterKind::Det, &TrackingConfig::default(), &sphere, 45.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(strategy.initial_directions(&model, &[9.0, 0.0, 0.0]).is_empty());
        assert!(strategy.next_direction(&model, &[-1.0, 0.0, 0.0], &[1.0, 0.0, 0.0], &mut rng).is_none());
    }
}
