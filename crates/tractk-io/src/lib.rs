//! File formats used by tractk: NIfTI volumes, FSL gradient tables,
//! TrackVis streamline files and JSON transform records.

pub mod nifti_io;
pub mod gradient_io;
pub mod trk;
pub mod transform_io;

pub use nifti_io::{read_diffusion, read_nifti, read_volume, write_diffusion, write_nifti, write_volume};
pub use gradient_io::read_fsl_gradients;
pub use trk::{read_trk, write_trk, TrkHeader};
pub use transform_io::{read_transform, write_transform};
