//! Diffusion model fitting, tissue-constrained ensemble tractography and
//! streamline density maps.

pub mod config;
pub mod error;
pub mod gradients;
pub mod sphere;
pub mod shm;
pub mod reconstruction;
pub mod classifier;
pub mod direction;
pub mod seeds;
pub mod streamline;
pub mod tracker;
pub mod ensemble;
pub mod density;
pub mod workflow;

pub use config::{ClassifierKind, DirectionGetterKind, ReconModel, TrackType, TrackingConfig};
pub use error::{Result, TrackingError};
pub use gradients::GradientTable;
pub use sphere::Sphere;
pub use reconstruction::{DiffusionModelFitter, FittedModel, ReconstructionModel};
pub use classifier::{TissueClass, TissueClassifier};
pub use direction::{DirectionGetter, DirectionStrategy};
pub use seeds::{Parcellation, SeedRegion};
pub use streamline::{PassSummary, Streamline, StreamlineBundle};
pub use tracker::LocalTracker;
pub use ensemble::EnsembleTracker;
pub use density::{DensityMapBuilder, DensityOutputs};
pub use workflow::{run_tracking, TissuePaths, TrackingInputs, TrackingOutputs};
