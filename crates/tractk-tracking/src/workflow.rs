//! End-to-end tracking run: files in, density map and streamlines out.

use burn::tensor::backend::Backend;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tractk_core::image::{TissueMaps, Volume};
use tractk_io::{read_diffusion, read_volume, TrkHeader};
use crate::classifier::TissueClassifier;
use crate::config::TrackingConfig;
use crate::density::{DensityMapBuilder, DensityOutputs};
use crate::ensemble::EnsembleTracker;
use crate::error::{Result, TrackingError};
use crate::gradients::GradientTable;
use crate::reconstruction::DiffusionModelFitter;
use crate::seeds::Parcellation;
use crate::streamline::PassSummary;

/// Tissue maps aligned to the diffusion grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TissuePaths {
    pub wm: PathBuf,
    pub gm: PathBuf,
    pub vent_csf: PathBuf,
    pub csf_mask: PathBuf,
    pub wm_gm_int: PathBuf,
}

/// Inputs of one run. Every volume must lie on the diffusion grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingInputs {
    pub dwi: PathBuf,
    pub bvals: PathBuf,
    pub bvecs: PathBuf,
    pub parcellation: PathBuf,
    pub tissue: TissuePaths,
    /// Defaults to voxels with positive mean b0.
    pub brain_mask: Option<PathBuf>,
    /// `None` tracks unconstrained. A named file must exist; an empty mask
    /// rejects every streamline.
    pub waymask: Option<PathBuf>,
    /// Restricts the parcellation before seeding.
    pub roi: Option<PathBuf>,
    pub network: Option<String>,
    pub node_size: String,
}

impl TrackingInputs {
    pub fn new(
        dwi: impl Into<PathBuf>,
        bvals: impl Into<PathBuf>,
        bvecs: impl Into<PathBuf>,
        parcellation: impl Into<PathBuf>,
        tissue: TissuePaths,
    ) -> Self {
        Self {
            dwi: dwi.into(),
            bvals: bvals.into(),
            bvecs: bvecs.into(),
            parcellation: parcellation.into(),
            tissue,
            brain_mask: None,
            waymask: None,
            roi: None,
            network: None,
            node_size: "parc".to_string(),
        }
    }

    pub fn with_brain_mask(mut self, mask: Option<PathBuf>) -> Self {
        self.brain_mask = mask;
        self
    }

    pub fn with_waymask(mut self, waymask: Option<PathBuf>) -> Self {
        self.waymask = waymask;
        self
    }

    pub fn with_roi(mut self, roi: Option<PathBuf>) -> Self {
        self.roi = roi;
        self
    }

    pub fn with_network(mut self, network: Option<String>) -> Self {
        self.network = network;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingOutputs {
    pub files: DensityOutputs,
    pub streamlines: usize,
    pub passes: Vec<PassSummary>,
}

fn read_on_grid(path: &Path, grid: &Volume, what: &str) -> Result<Volume> {
    let volume = read_volume(path)?;
    grid.ensure_same_grid(&volume, what)?;
    Ok(volume)
}

/// Fit, track and write the density map.
///
/// Configuration, parcellation, seeding and the waymask are checked before
/// the diffusion series is read, so bad inputs fail without any fitting.
pub fn run_tracking<B: Backend>(
    inputs: &TrackingInputs,
    config: TrackingConfig,
    device: &B::Device,
) -> Result<TrackingOutputs> {
    config.validate()?;
    let labels = read_volume(&inputs.parcellation)?;
    let mut parcellation = Parcellation::new(labels, inputs.parcellation.display().to_string())?;
    if let Some(roi) = &inputs.roi {
        parcellation = parcellation.within(&read_on_grid(roi, parcellation.volume(), "parcellation/roi")?)?;
    }
    let grid = parcellation.volume().clone();
    let interface = read_on_grid(&inputs.tissue.wm_gm_int, &grid, "parcellation/wm_gm_int")?;
    let waymask = inputs
        .waymask
        .as_deref()
        .map(|path| read_on_grid(path, &grid, "parcellation/waymask"))
        .transpose()?;
    let outputs = DensityOutputs::new(
        &inputs.dwi,
        &inputs.parcellation,
        &config,
        &inputs.node_size,
        inputs.network.as_deref(),
        inputs.roi.as_deref(),
    );
    let tracker = EnsembleTracker::new(config, &parcellation, &interface)?;

    info!(dwi = %inputs.dwi.display(), "fitting diffusion model");
    let dwi = read_diffusion::<B, _>(&inputs.dwi, device)?;
    let [nz, ny, nx] = dwi.spatial_shape();
    if [nx, ny, nz] != grid.dims() || !dwi.metadata().approx_eq(grid.metadata()) {
        return Err(TrackingError::invalid_input(format!(
            "parcellation {:?} is not on the diffusion grid {:?}",
            grid.dims(),
            [nx, ny, nz]
        )));
    }
    let gradients = GradientTable::from_fsl(&inputs.bvals, &inputs.bvecs, tracker.config().b0_threshold)?;
    gradients.check_frames(dwi.num_frames())?;
    let brain_mask = match &inputs.brain_mask {
        Some(path) => read_on_grid(path, &grid, "parcellation/brain mask")?,
        None => Volume::from_image(&dwi.mean_of_frames(&gradients.b0_indices())).map(|v| if v > 0.0 { 1.0 } else { 0.0 }),
    };
    let model = DiffusionModelFitter::from_config(tracker.config()).fit(&dwi, &gradients, &brain_mask, tracker.sphere())?;
    drop(dwi);

    let tissue = TissueMaps::new(
        read_on_grid(&inputs.tissue.wm, &grid, "parcellation/wm")?,
        read_on_grid(&inputs.tissue.gm, &grid, "parcellation/gm")?,
        read_on_grid(&inputs.tissue.vent_csf, &grid, "parcellation/vent_csf")?,
        read_on_grid(&inputs.tissue.csf_mask, &grid, "parcellation/csf_mask")?,
    )?;
    let classifier = TissueClassifier::new(tracker.config().classifier, &tissue, &brain_mask)?;
    let [trackable, terminal, excluded] = classifier.counts();
    debug!(trackable, terminal, excluded, "classified tissue");

    let bundle = tracker.run(&model, &classifier, waymask.as_ref())?;
    let density = DensityMapBuilder::new(&grid).build(&bundle, model.metadata());
    outputs.write(&density, &bundle, &TrkHeader::from_metadata(model.dims(), model.metadata()))?;

    Ok(TrackingOutputs {
        files: outputs,
        streamlines: bundle.len(),
        passes: bundle.passes().to_vec(),
    })
}
