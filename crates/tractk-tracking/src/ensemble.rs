//! Ensemble tractography over a (curvature, step) sweep.
//!
//! Every pass seeds the parcel voxels on the white/grey matter interface,
//! tracks from each ODF peak, filters the results and appends the survivors.
//! Passes run curvature-major in configuration order. One seeded RNG drives
//! the whole run, so a sweep is reproducible bit for bit.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use tractk_core::filter::morphology::{binarize, dilate};
use tractk_core::image::Volume;
use crate::classifier::TissueClassifier;
use crate::config::TrackingConfig;
use crate::direction::{DirectionGetter, DirectionStrategy};
use crate::error::{Result, TrackingError};
use crate::reconstruction::FittedModel;
use crate::seeds::{Parcellation, SeedRegion};
use crate::sphere::Sphere;
use crate::streamline::{PassSummary, Streamline, StreamlineBundle};
use crate::tracker::LocalTracker;

pub struct EnsembleTracker {
    config: TrackingConfig,
    sphere: Sphere,
    seeds: SeedRegion,
    /// Parcels dilated by the ROI neighbourhood tolerance.
    proximity: Volume,
}

/// Whether some point of `line` falls on a nonzero voxel of `mask`.
fn passes_through(line: &Streamline, mask: &Volume) -> bool {
    line.points().iter().any(|p| mask.sample_nearest(p).is_some_and(|v| v > 0.0))
}

impl EnsembleTracker {
    /// Validate the configuration and derive seeds from the parcellation.
    ///
    /// Runs before any model fitting, so configuration and seeding errors
    /// surface first.
    pub fn new(config: TrackingConfig, parcellation: &Parcellation, interface: &Volume) -> Result<Self> {
        config.validate()?;
        let sphere = Sphere::named(&config.sphere)?;
        let seeds = parcellation.seed_region(interface)?;
        let proximity = parcellation.proximity_mask(config.roi_neighborhood_tol);
        info!(
            parcels = parcellation.num_parcels(),
            seed_voxels = seeds.num_voxels(),
            sphere = sphere.name(),
            "prepared ensemble tracking"
        );
        Ok(Self { config, sphere, seeds, proximity })
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Tracking sphere; the model must be fitted on it.
    pub fn sphere(&self) -> &Sphere {
        &self.sphere
    }

    pub fn seed_region(&self) -> &SeedRegion {
        &self.seeds
    }

    /// (curvature, step) pairs in execution order.
    pub fn passes(&self) -> Vec<(f64, f64)> {
        self.config
            .curvature_thresholds
            .iter()
            .flat_map(|&c| self.config.step_sizes.iter().map(move |&s| (c, s)))
            .collect()
    }

    /// Run passes until `target_samples` streamlines are collected.
    ///
    /// The target is checked between passes and every pass tracks all of its
    /// seeds, so the bundle may end above the target. Sweeps repeat until the
    /// target is met, `max_sweeps` is reached or a sweep keeps nothing.
    pub fn run(
        &self,
        model: &FittedModel,
        classifier: &TissueClassifier,
        waymask: Option<&Volume>,
    ) -> Result<StreamlineBundle> {
        let grid = &self.proximity;
        if model.dims() != grid.dims() || !model.metadata().approx_eq(grid.metadata()) {
            return Err(TrackingError::invalid_input("fitted model is not on the parcellation grid"));
        }
        if classifier.dims() != grid.dims() || !classifier.metadata().approx_eq(grid.metadata()) {
            return Err(TrackingError::invalid_input("tissue classifier is not on the parcellation grid"));
        }
        let waymask = match waymask {
            Some(w) => {
                grid.ensure_same_grid(w, "parcellation/waymask")?;
                Some(dilate(&binarize(w, 0.0), self.config.roi_neighborhood_tol))
            }
            None => None,
        };

        let target = self.config.target_samples;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut bundle = StreamlineBundle::new();
        info!(
            model = model.model_name(),
            classifier = %classifier.kind(),
            direction_getter = %self.config.direction_getter,
            curvatures = ?self.config.curvature_thresholds,
            steps = ?self.config.step_sizes,
            target,
            "starting tracking sweep"
        );

        let mut sweep = 0;
        while bundle.len() < target && self.config.max_sweeps.map_or(true, |max| sweep < max) {
            let before = bundle.len();
            for (curvature, step) in self.passes() {
                if bundle.len() >= target {
                    break;
                }
                let (summary, kept) = self.run_pass(curvature, step, model, classifier, waymask.as_ref(), &mut rng);
                debug!(
                    sweep,
                    curvature,
                    step,
                    seeds = summary.seeds,
                    generated = summary.generated,
                    kept = summary.kept,
                    "pass finished"
                );
                bundle.extend_pass(summary, kept);
            }
            if bundle.len() == before {
                debug!(sweep, "sweep added no streamline");
                break;
            }
            sweep += 1;
        }

        if bundle.len() < target {
            warn!(streamlines = bundle.len(), target, "tracking fell short of the target");
        }
        info!(streamlines = bundle.len(), passes = bundle.passes().len(), "tracking finished");
        Ok(bundle)
    }

    fn run_pass(
        &self,
        curvature: f64,
        step: f64,
        model: &FittedModel,
        classifier: &TissueClassifier,
        waymask: Option<&Volume>,
        rng: &mut StdRng,
    ) -> (PassSummary, Vec<Streamline>) {
        let strategy = DirectionStrategy::new(self.config.direction_getter, &self.config, &self.sphere, curvature);
        let tracker = LocalTracker::new(model, classifier, &strategy, step, self.config.max_points);
        let spacing = *model.metadata().spacing();
        let seeds = self.seeds.generate(self.config.seeds_per_voxel, rng);

        let mut generated = 0;
        let mut kept = Vec::new();
        for seed in &seeds {
            for direction in strategy.initial_directions(model, seed) {
                generated += 1;
                let Some(line) = tracker.track(*seed, direction, rng) else {
                    continue;
                };
                let accepted = line.length_mm(&spacing) >= self.config.min_length
                    && passes_through(&line, &self.proximity)
                    && waymask.map_or(true, |w| passes_through(&line, w));
                if accepted {
                    kept.push(line);
                }
            }
        }

        let summary = PassSummary { curvature, step, seeds: seeds.len(), generated, kept: kept.len() };
        (summary, kept)
    }
}
