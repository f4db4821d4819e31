//! Tracking configuration.
//!
//! String tags from the command line or a JSON file are parsed into closed
//! enums here, so an unknown name fails before any volume is read.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::{Result, TrackingError};
use crate::sphere::Sphere;

/// Declares a string-tagged enum whose serde form goes through `FromStr`.
macro_rules! tagged_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $( $variant:ident => $tag:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $( $variant ),+
        }

        impl $name {
            pub fn tag(&self) -> &'static str {
                match self {
                    $( Self::$variant => $tag ),+
                }
            }
        }

        impl FromStr for $name {
            type Err = TrackingError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $( $tag $(| $alias)* => Ok(Self::$variant), )+
                    other => Err(TrackingError::invalid_configuration(format!(
                        concat!("unknown ", $what, " '{}' (expected one of: {})"),
                        other,
                        [$( $tag ),+].join(", ")
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = TrackingError;

            fn try_from(s: String) -> Result<Self> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.tag().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.tag())
            }
        }
    };
}

tagged_enum! {
    /// Reconstruction model family.
    ReconModel, "reconstruction model" {
        Tensor => "tensor",
        Csa => "csa",
        Csd => "csd",
    }
}

tagged_enum! {
    /// Rule turning tissue maps into a stopping criterion.
    ClassifierKind, "tissue classifier" {
        Act => "act",
        Cmc => "cmc",
        Bin => "bin",
        Wb => "wb",
    }
}

tagged_enum! {
    /// Direction-getting strategy.
    DirectionGetterKind, "direction-getting strategy" {
        Prob => "prob" | "probabilistic",
        Boot => "boot" | "bootstrapped",
        Closest => "closest" | "closest-peak",
        Det => "det" | "deterministic-maximum",
    }
}

/// Tracking algorithm. Only local tracking is implemented; particle
/// filtering is rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TrackType {
    #[default]
    Local,
}

impl FromStr for TrackType {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "particle" => Err(TrackingError::invalid_configuration(
                "track type 'particle' is not supported; use 'local'",
            )),
            other => Err(TrackingError::invalid_configuration(format!(
                "unknown track type '{other}' (expected: local)"
            ))),
        }
    }
}

impl TryFrom<String> for TrackType {
    type Error = TrackingError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TrackType> for String {
    fn from(_: TrackType) -> String {
        "local".to_string()
    }
}

/// Settings of one tracking run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub model: ReconModel,
    pub classifier: ClassifierKind,
    pub direction_getter: DirectionGetterKind,
    pub track_type: TrackType,
    /// Maximum turning angle per step, in degrees.
    pub curvature_thresholds: Vec<f64>,
    /// Step sizes in mm.
    pub step_sizes: Vec<f64>,
    /// Streamline count after which no further pass starts. The last pass
    /// runs to completion, so a bundle may overshoot it.
    pub target_samples: usize,
    /// Peaks followed from a seed, and candidate peaks per step.
    pub max_crossing: usize,
    /// Shortest kept streamline, in mm.
    pub min_length: f64,
    /// Distance in mm within which a streamline must pass some parcel.
    pub roi_neighborhood_tol: f64,
    /// Tracking sphere: `repulsion100`, `repulsion200`, `repulsion724` or
    /// `fibonacci<N>`.
    pub sphere: String,
    pub seed: u64,
    pub seeds_per_voxel: usize,
    pub max_points: usize,
    pub sh_order: usize,
    /// Full sweeps repeated while the target is unmet; `None` repeats until
    /// the target is met or a sweep keeps nothing.
    pub max_sweeps: Option<usize>,
    /// b-values at or below this mark b0 frames.
    pub b0_threshold: f64,
    /// CSD regularisation weight.
    pub csd_lambda: f64,
    /// CSD threshold on the fODF amplitude, relative to its mean.
    pub csd_tau: f64,
    /// Peaks below this fraction of the largest are ignored.
    pub relative_peak_threshold: f64,
    /// Peaks closer than this (degrees) to a stronger one are merged.
    pub min_separation_angle: f64,
    /// PMF values below this fraction of the maximum are zeroed.
    pub pmf_threshold: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            model: ReconModel::Csd,
            classifier: ClassifierKind::Act,
            direction_getter: DirectionGetterKind::Prob,
            track_type: TrackType::Local,
            curvature_thresholds: vec![40.0, 30.0],
            step_sizes: vec![0.5],
            target_samples: 10_000,
            max_crossing: 2,
            min_length: 20.0,
            roi_neighborhood_tol: 8.0,
            sphere: "repulsion724".to_string(),
            seed: 42,
            seeds_per_voxel: 1,
            max_points: 500,
            sh_order: 6,
            max_sweeps: None,
            b0_threshold: 50.0,
            csd_lambda: 1.0,
            csd_tau: 0.1,
            relative_peak_threshold: 0.5,
            min_separation_angle: 25.0,
            pmf_threshold: 0.1,
        }
    }
}

fn positive_list(name: &str, values: &[f64]) -> Result<()> {
    if values.is_empty() {
        return Err(TrackingError::invalid_configuration(format!("{name} must not be empty")));
    }
    if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(TrackingError::invalid_configuration(format!(
            "{name} must hold positive values, got {bad}"
        )));
    }
    Ok(())
}

impl TrackingConfig {
    pub fn with_model(mut self, model: ReconModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_classifier(mut self, classifier: ClassifierKind) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_direction_getter(mut self, direction_getter: DirectionGetterKind) -> Self {
        self.direction_getter = direction_getter;
        self
    }

    pub fn with_curvature_thresholds(mut self, values: Vec<f64>) -> Self {
        self.curvature_thresholds = values;
        self
    }

    pub fn with_step_sizes(mut self, values: Vec<f64>) -> Self {
        self.step_sizes = values;
        self
    }

    pub fn with_target_samples(mut self, target: usize) -> Self {
        self.target_samples = target;
        self
    }

    pub fn with_min_length(mut self, mm: f64) -> Self {
        self.min_length = mm;
        self
    }

    pub fn with_max_crossing(mut self, n: usize) -> Self {
        self.max_crossing = n;
        self
    }

    pub fn with_roi_neighborhood_tol(mut self, mm: f64) -> Self {
        self.roi_neighborhood_tol = mm;
        self
    }

    pub fn with_sphere(mut self, sphere: impl Into<String>) -> Self {
        self.sphere = sphere.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_seeds_per_voxel(mut self, n: usize) -> Self {
        self.seeds_per_voxel = n;
        self
    }

    pub fn with_max_sweeps(mut self, n: usize) -> Self {
        self.max_sweeps = Some(n);
        self
    }

    /// Check every numeric setting and the sphere name.
    pub fn validate(&self) -> Result<()> {
        positive_list("curvature_thresholds", &self.curvature_thresholds)?;
        positive_list("step_sizes", &self.step_sizes)?;
        if let Some(bad) = self.curvature_thresholds.iter().find(|c| **c > 180.0) {
            return Err(TrackingError::invalid_configuration(format!(
                "curvature threshold is an angle in degrees, got {bad}"
            )));
        }
        let counts = [
            ("target_samples", self.target_samples),
            ("max_crossing", self.max_crossing),
            ("seeds_per_voxel", self.seeds_per_voxel),
            ("max_sweeps", self.max_sweeps.unwrap_or(1)),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(TrackingError::invalid_configuration(format!("{name} must be greater than zero")));
        }
        if self.max_points < 2 {
            return Err(TrackingError::invalid_configuration("max_points must be at least 2"));
        }
        if self.sh_order < 2 || self.sh_order % 2 != 0 || self.sh_order > 12 {
            return Err(TrackingError::invalid_configuration(format!(
                "sh_order must be even and within 2..=12, got {}",
                self.sh_order
            )));
        }
        let fractions = [
            ("relative_peak_threshold", self.relative_peak_threshold),
            ("pmf_threshold", self.pmf_threshold),
            ("csd_tau", self.csd_tau),
        ];
        if let Some((name, v)) = fractions.iter().find(|(_, v)| !(0.0..1.0).contains(v)) {
            return Err(TrackingError::invalid_configuration(format!("{name} must lie in [0, 1), got {v}")));
        }
        for (name, v) in [
            ("min_length", self.min_length),
            ("roi_neighborhood_tol", self.roi_neighborhood_tol),
            ("csd_lambda", self.csd_lambda),
            ("min_separation_angle", self.min_separation_angle),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(TrackingError::invalid_configuration(format!("{name} must be non-negative, got {v}")));
            }
        }
        Sphere::named(&self.sphere)?;
        Ok(())
    }
}
