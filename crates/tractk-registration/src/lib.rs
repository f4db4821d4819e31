//! Tissue segmentation and staged alignment of an anatomical volume into
//! diffusion or template space.

pub mod error;
pub mod metric;
pub mod optimizer;
pub mod registration;
pub mod schedule;
pub mod segmentation;
pub mod aligner;

pub use error::{RegistrationError, Result};
pub use schedule::RegistrationSchedule;
pub use segmentation::{Segmentation, TissueSegmenter};
pub use aligner::{
    write_mean_b0, AlignedTissuePaths, Aligner, AlignerConfig, AlignmentOutputs, AlignmentPaths,
    AlignmentState, AlignmentTarget, TargetKind,
};
