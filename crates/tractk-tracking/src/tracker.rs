//! Local streamline propagation.

use rand::rngs::StdRng;
use crate::classifier::{TissueClass, TissueClassifier};
use crate::direction::DirectionGetter;
use crate::reconstruction::FittedModel;
use crate::streamline::Streamline;

/// Bidirectional Euler integration from a seed.
pub struct LocalTracker<'a, G: DirectionGetter> {
    model: &'a FittedModel,
    classifier: &'a TissueClassifier,
    getter: &'a G,
    /// Step in voxel units along each axis.
    step: [f64; 3],
    max_points: usize,
}

impl<'a, G: DirectionGetter> LocalTracker<'a, G> {
    /// `step_mm` is converted per axis with the diffusion voxel size.
    pub fn new(
        model: &'a FittedModel,
        classifier: &'a TissueClassifier,
        getter: &'a G,
        step_mm: f64,
        max_points: usize,
    ) -> Self {
        let spacing = model.metadata().spacing();
        Self {
            model,
            classifier,
            getter,
            step: std::array::from_fn(|a| step_mm / spacing[a]),
            max_points,
        }
    }

    /// Track both ways along `direction` and join the halves through the
    /// seed. `None` when the seed lies outside trackable space or either
    /// half enters excluded tissue.
    pub fn track(&self, seed: [f64; 3], direction: [f64; 3], rng: &mut StdRng) -> Option<Streamline> {
        if matches!(self.classifier.classify(&seed), TissueClass::Excluded | TissueClass::Outside) {
            return None;
        }
        let budget = self.max_points.saturating_sub(1);
        let backward_steps = budget / 2;
        let forward = self.walk(seed, direction, budget - backward_steps, rng)?;
        let backward = self.walk(seed, direction.map(|c| -c), backward_steps, rng)?;

        let mut points = Vec::with_capacity(forward.len() + backward.len() + 1);
        points.extend(backward.into_iter().rev());
        points.push(seed);
        points.extend(forward);
        Some(Streamline::new(points))
    }

    /// Points after the seed; `None` if the walk was discarded.
    fn walk(&self, seed: [f64; 3], direction: [f64; 3], max_steps: usize, rng: &mut StdRng) -> Option<Vec<[f64; 3]>> {
        let mut points = Vec::new();
        let mut position = seed;
        let mut direction = direction;
        for _ in 0..max_steps {
            position = std::array::from_fn(|a| position[a] + direction[a] * self.step[a]);
            match self.classifier.classify(&position) {
                TissueClass::Outside => break,
                TissueClass::Excluded => return None,
                TissueClass::Terminal => {
                    points.push(position);
                    break;
                }
                TissueClass::Trackable => {
                    points.push(position);
                    match self.getter.next_direction(self.model, &position, &direction, rng) {
                        Some(next) => direction = next,
                        None => break,
                    }
                }
            }
        }
        Some(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierKind, DirectionGetterKind, TrackingConfig};
    use crate::direction::test_support::uniform_model;
    use crate::direction::DirectionStrategy;
    use crate::sphere::Sphere;
    use rand::SeedableRng;
    use tractk_core::image::{ImageMetadata, TissueMaps, Volume};
    use tractk_core::spatial::Spacing;

    /// 5^3 grid, wm everywhere except the listed x columns.
    fn classifier(gm_x: &[usize], csf_x: &[usize]) -> TissueClassifier {
        let meta = ImageMetadata::default();
        let mut wm = Volume::new(vec![1.0; 125], [5, 5, 5], meta);
        let mut gm = Volume::zeros([5, 5, 5], meta);
        let mut csf = Volume::zeros([5, 5, 5], meta);
        for z in 0..5 {
            for y in 0..5 {
                for &x in gm_x {
                    gm.set(x, y, z, 1.0);
                    wm.set(x, y, z, 0.0);
                }
                for &x in csf_x {
                    csf.set(x, y, z, 1.0);
                    wm.set(x, y, z, 0.0);
                }
            }
        }
        let tissue = TissueMaps::new(wm, gm, csf.clone(), csf).unwrap();
        TissueClassifier::new(ClassifierKind::Act, &tissue, &Volume::new(vec![1.0; 125], [5, 5, 5], meta)).unwrap()
    }

    #[test]
    fn test_tracks_straight_through_white_matter() {
        let sphere = Sphere::fibonacci(724);
        let model = uniform_model([1.0, 0.0, 0.0], &sphere);
        let classifier = classifier(&[], &[]);
        let config = TrackingConfig::default();
        let getter = DirectionStrategy::new(DirectionGetterKind::Det, &config, &sphere, 30.0);
        let tracker = LocalTracker::new(&model, &classifier, &getter, 0.5, 100);
        let mut rng = StdRng::seed_from_u64(0);

        let direction = getter.initial_directions(&model, &[2.0, 2.0, 2.0])[0];
        let line = tracker.track([2.0, 2.0, 2.0], direction, &mut rng).unwrap();
        let first = line.points()[0];
        let last = *line.points().last().unwrap();
        // stops at the last in-grid point on both sides
        assert!(first[0].min(last[0]) < -0.4 && first[0].max(last[0]) > 4.4);
        // ten half-millimetre steps
        assert!((line.length_mm(&Spacing::uniform(1.0)) - 5.0).abs() < 1e-6);
        assert!(line.points().contains(&[2.0, 2.0, 2.0]));
    }

    #[test]
    fn test_terminal_keeps_and_excluded_discards() {
        let sphere = Sphere::fibonacci(724);
        let model = uniform_model([1.0, 0.0, 0.0], &sphere);
        let config = TrackingConfig::default();
        let getter = DirectionStrategy::new(DirectionGetterKind::Det, &config, &sphere, 30.0);
        let mut rng = StdRng::seed_from_u64(0);

        let with_gm = classifier(&[4], &[]);
        let tracker = LocalTracker::new(&model, &with_gm, &getter, 0.5, 100);
        let line = tracker.track([2.0, 2.0, 2.0], [1.0, 0.0, 0.0], &mut rng).unwrap();
        let end = line.points().iter().map(|p| p[0]).fold(f64::MIN, f64::max);
        assert!((3.5..=4.0).contains(&end), "ends at {end}");

        let with_csf = classifier(&[], &[4]);
        let tracker = LocalTracker::new(&model, &with_csf, &getter, 0.5, 100);
        assert!(tracker.track([2.0, 2.0, 2.0], [1.0, 0.0, 0.0], &mut rng).is_none());
        // seeds in excluded tissue produce nothing
        assert!(tracker.track([4.0, 2.0, 2.0], [1.0, 0.0, 0.0], &mut rng).is_none());
    }

    #[test]
    fn test_point_budget() {
        let sphere = Sphere::fibonacci(724);
        let model = uniform_model([1.0, 0.0, 0.0], &sphere);
        let classifier = classifier(&[], &[]);
        let getter = DirectionStrategy::new(DirectionGetterKind::Det, &TrackingConfig::default(), &sphere, 30.0);
        let tracker = LocalTracker::new(&model, &classifier, &getter, 0.1, 7);
        let mut rng = StdRng::seed_from_u64(0);
        let line = tracker.track([2.0, 2.0, 2.0], [1.0, 0.0, 0.0], &mut rng).unwrap();
        assert_eq!(line.len(), 7);
    }
}
