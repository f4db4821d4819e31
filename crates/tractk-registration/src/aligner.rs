//! Staged anatomical-to-target alignment.
//!
//! A run walks `Unsegmented -> TissueSegmented -> T1AlignedToTarget ->
//! TissueAlignedToTarget -> WaymaskAligned`. The starting state is computed
//! once from the artifacts already present under `basedir`; a stage runs only
//! when `overwrite` is set or the state has not reached it yet, so re-running
//! a finished directory touches nothing.
//!
//! Transform files hold point maps. `t1w2{target}_xfm.json` maps target
//! points to anatomical points and pulls anatomical data onto the target
//! grid; `{target}2t1w_xfm.json` is its inverse.

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tractk_core::filter::{binarize, dilate, ResampleImageFilter};
use tractk_core::image::{Image, Volume};
use tractk_core::interpolation::{Interpolator, LinearInterpolator, NearestNeighborInterpolator};
use tractk_core::transform::{AffineTransform, BSplineTransform, ChainedTransform, Transform, TransformRecord};
use tractk_io::{read_diffusion, read_fsl_gradients, read_transform, read_volume, write_nifti, write_transform, write_volume};
use crate::error::{RegistrationError, Result};
use crate::metric::{MeanSquaredError, Metric, MetricKind, NormalizedCrossCorrelation};
use crate::optimizer::AdamOptimizer;
use crate::registration::Registration;
use crate::schedule::RegistrationSchedule;
use crate::segmentation::TissueSegmenter;

/// b-values at or below this are treated as b0 frames.
pub const B0_THRESHOLD: f64 = 50.0;

/// Space the anatomical volume is aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Diffusion space; tissue maps and the optional waymask follow the T1.
    Diffusion,
    /// Standard template space; the run stops after the T1 alignment.
    Template,
}

impl TargetKind {
    /// Short tag used in artifact names.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Diffusion => "dwi",
            Self::Template => "template",
        }
    }

    fn dir_name(&self) -> &'static str {
        match self {
            Self::Diffusion => "dmri_reg",
            Self::Template => "template_reg",
        }
    }
}

/// Reference volume of the target space, optionally with a brain mask.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentTarget {
    pub kind: TargetKind,
    pub reference: PathBuf,
    pub brain_mask: Option<PathBuf>,
}

impl AlignmentTarget {
    pub fn diffusion(reference: impl Into<PathBuf>, brain_mask: Option<PathBuf>) -> Self {
        Self { kind: TargetKind::Diffusion, reference: reference.into(), brain_mask }
    }

    pub fn template(reference: impl Into<PathBuf>, brain_mask: Option<PathBuf>) -> Self {
        Self { kind: TargetKind::Template, reference: reference.into(), brain_mask }
    }
}

/// Deterministic artifact locations for one `basedir` and target kind.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentPaths {
    pub kind: TargetKind,
    pub anat_dir: PathBuf,
    pub target_dir: PathBuf,
    pub t1w_seg: PathBuf,
    pub t1w_brain_mask: PathBuf,
    pub t1w_wm: PathBuf,
    pub t1w_gm: PathBuf,
    pub t1w_vent_csf: PathBuf,
    pub t1w_csf_mask: PathBuf,
    pub t1w_in_target: PathBuf,
    pub forward_xfm: PathBuf,
    pub inverse_xfm: PathBuf,
    pub wm_in_target: PathBuf,
    pub gm_in_target: PathBuf,
    pub vent_csf_in_target: PathBuf,
    pub csf_mask_in_target: PathBuf,
    pub wm_gm_int_in_target: PathBuf,
    pub waymask_in_target: PathBuf,
}

impl AlignmentPaths {
    pub fn new(basedir: &Path, kind: TargetKind) -> Self {
        let anat_dir = basedir.join("anat_reg");
        let target_dir = basedir.join(kind.dir_name());
        let t = kind.tag();
        let anat = |name: &str| anat_dir.join(name);
        let target = |name: String| target_dir.join(name);
        Self {
            kind,
            t1w_seg: anat("t1w_seg.nii.gz"),
            t1w_brain_mask: anat("t1w_brain_mask.nii.gz"),
            t1w_wm: anat("t1w_wm.nii.gz"),
            t1w_gm: anat("t1w_gm.nii.gz"),
            t1w_vent_csf: anat("t1w_vent_csf.nii.gz"),
            t1w_csf_mask: anat("t1w_csf_mask.nii.gz"),
            t1w_in_target: target(format!("t1w_in_{t}.nii.gz")),
            forward_xfm: target(format!("t1w2{t}_xfm.json")),
            inverse_xfm: target(format!("{t}2t1w_xfm.json")),
            wm_in_target: target(format!("wm_in_{t}.nii.gz")),
            gm_in_target: target(format!("gm_in_{t}.nii.gz")),
            vent_csf_in_target: target(format!("vent_csf_in_{t}.nii.gz")),
            csf_mask_in_target: target(format!("csf_mask_in_{t}.nii.gz")),
            wm_gm_int_in_target: target(format!("wm_gm_int_in_{t}.nii.gz")),
            waymask_in_target: target(format!("waymask_in_{t}.nii.gz")),
            anat_dir,
            target_dir,
        }
    }

    fn segmentation_outputs(&self) -> [&Path; 6] {
        [&self.t1w_seg, &self.t1w_brain_mask, &self.t1w_wm, &self.t1w_gm, &self.t1w_vent_csf, &self.t1w_csf_mask]
    }

    fn t1_alignment_outputs(&self) -> [&Path; 3] {
        [&self.t1w_in_target, &self.forward_xfm, &self.inverse_xfm]
    }

    fn tissue_alignment_outputs(&self) -> [&Path; 5] {
        [
            &self.wm_in_target,
            &self.gm_in_target,
            &self.vent_csf_in_target,
            &self.csf_mask_in_target,
            &self.wm_gm_int_in_target,
        ]
    }
}

/// Progress of one subject directory, derived from artifact presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlignmentState {
    Unsegmented,
    TissueSegmented,
    T1AlignedToTarget,
    TissueAlignedToTarget,
    WaymaskAligned,
}

impl AlignmentState {
    /// Furthest state whose artifacts, and those of every earlier state,
    /// all exist. A missing earlier artifact invalidates everything after it.
    pub fn detect(paths: &AlignmentPaths, waymask_requested: bool) -> Self {
        let all = |files: &[&Path]| files.iter().all(|p| p.is_file());
        if !all(&paths.segmentation_outputs()) {
            return Self::Unsegmented;
        }
        if !all(&paths.t1_alignment_outputs()) {
            return Self::TissueSegmented;
        }
        if paths.kind == TargetKind::Template || !all(&paths.tissue_alignment_outputs()) {
            return Self::T1AlignedToTarget;
        }
        if !waymask_requested || !paths.waymask_in_target.is_file() {
            return Self::TissueAlignedToTarget;
        }
        Self::WaymaskAligned
    }
}

impl fmt::Display for AlignmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Alignment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Recompute every stage regardless of existing artifacts.
    pub overwrite: bool,
    /// Affine only, without the B-spline refinement.
    pub simple: bool,
    pub schedule: RegistrationSchedule,
    pub ventricle_erosion_mm: f64,
    /// Dilation of the binary WM and GM maps before intersecting them.
    pub interface_dilation_mm: f64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            overwrite: false,
            simple: false,
            schedule: RegistrationSchedule::default(),
            ventricle_erosion_mm: 3.0,
            interface_dilation_mm: 2.0,
        }
    }
}

impl AlignerConfig {
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_simple(mut self, simple: bool) -> Self {
        self.simple = simple;
        self
    }

    pub fn with_schedule(mut self, schedule: RegistrationSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_interface_dilation_mm(mut self, mm: f64) -> Self {
        self.interface_dilation_mm = mm;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.schedule.validate()?;
        for (name, mm) in [
            ("ventricle_erosion_mm", self.ventricle_erosion_mm),
            ("interface_dilation_mm", self.interface_dilation_mm),
        ] {
            if !(mm.is_finite() && mm >= 0.0) {
                return Err(RegistrationError::invalid_configuration(format!(
                    "{name} must be a non-negative distance, got {mm}"
                )));
            }
        }
        Ok(())
    }
}

/// Tissue maps and interface mask on the target grid.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedTissuePaths {
    pub wm: PathBuf,
    pub gm: PathBuf,
    pub vent_csf: PathBuf,
    pub csf_mask: PathBuf,
    pub wm_gm_int: PathBuf,
}

/// Everything a finished run guarantees to exist.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentOutputs {
    pub basedir: PathBuf,
    pub t1w_in_target: PathBuf,
    pub forward_xfm: PathBuf,
    pub inverse_xfm: PathBuf,
    /// Present for diffusion targets.
    pub tissue: Option<AlignedTissuePaths>,
    /// Present only when a waymask was supplied.
    pub waymask: Option<PathBuf>,
}

/// Write the mean of the b0 frames of a diffusion series, the usual
/// reference for aligning a T1 to diffusion space.
///
/// Skipped when `out` exists and `overwrite` is false.
pub fn write_mean_b0<B: Backend>(
    dwi: &Path,
    bvals: &Path,
    bvecs: &Path,
    out: &Path,
    overwrite: bool,
    device: &B::Device,
) -> Result<()> {
    if out.is_file() && !overwrite {
        tracing::info!(path = %out.display(), "mean b0 reference exists, skipping");
        return Ok(());
    }
    let (values, _) = read_fsl_gradients(bvals, bvecs)?;
    let series = read_diffusion::<B, _>(dwi, device)?;
    if values.len() != series.num_frames() {
        return Err(RegistrationError::invalid_configuration(format!(
            "gradient table has {} entries but {} has {} frames",
            values.len(),
            dwi.display(),
            series.num_frames()
        )));
    }
    let b0: Vec<usize> = (0..values.len()).filter(|&i| values[i] <= B0_THRESHOLD).collect();
    if b0.is_empty() {
        return Err(RegistrationError::invalid_configuration(format!(
            "no b0 frame (b <= {B0_THRESHOLD}) in {}",
            bvals.display()
        )));
    }
    ensure_parent(out)?;
    write_nifti(out, &series.mean_of_frames(&b0))?;
    tracing::info!(frames = b0.len(), path = %out.display(), "wrote mean b0 reference");
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow::Error::new(e).context(format!("Failed to create {}", parent.display())))?;
    }
    Ok(())
}

/// Apply a mask in place: voxels outside it become 0.
fn apply_mask(volume: &mut Volume, mask: &Volume) -> Result<()> {
    volume.ensure_same_grid(mask, "volume/mask")?;
    for (v, m) in volume.values_mut().iter_mut().zip(mask.values()) {
        if *m <= 0.0 {
            *v = 0.0;
        }
    }
    Ok(())
}

/// Pull `input` onto the grid of `reference` through a stored point map.
fn warp<B: Backend, I: Interpolator<B>>(
    input: &Volume,
    record: &TransformRecord,
    reference: &Volume,
    interpolator: I,
    device: &B::Device,
) -> Result<Volume> {
    let transform = record.build::<B>(device)?;
    let input = input.to_image::<B>(device)?;
    let reference = reference.to_image::<B>(device)?;
    let warped = ResampleImageFilter::new_from_reference(&reference, transform, interpolator).apply(&input);
    Ok(Volume::from_image(&warped))
}

/// Optimise `transform` with the configured metric.
fn fit<B, T>(
    metric: MetricKind,
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
    transform: T,
    iterations: usize,
    learning_rate: f64,
) -> Result<T>
where
    B: AutodiffBackend,
    T: Transform<B, 3> + AutodiffModule<B>,
{
    fn run<B, T, M>(m: M, fixed: &Image<B, 3>, moving: &Image<B, 3>, t: T, iters: usize, lr: f64) -> Result<T>
    where
        B: AutodiffBackend,
        T: Transform<B, 3> + AutodiffModule<B>,
        M: Metric<B>,
    {
        tracing::info!(metric = m.name(), iterations = iters, learning_rate = lr, "optimising transform");
        Registration::new(AdamOptimizer::new(lr), m).execute(fixed, moving, t, iters, lr)
    }
    match metric {
        MetricKind::Mse => run(MeanSquaredError::new(), fixed, moving, transform, iterations, learning_rate),
        MetricKind::Ncc => run(NormalizedCrossCorrelation::new(), fixed, moving, transform, iterations, learning_rate),
    }
}

/// Per-subject alignment state machine.
pub struct Aligner<B: AutodiffBackend> {
    paths: AlignmentPaths,
    basedir: PathBuf,
    anat: PathBuf,
    anat_mask: Option<PathBuf>,
    target: AlignmentTarget,
    waymask: Option<PathBuf>,
    config: AlignerConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Aligner<B> {
    /// Validates the configuration; no artifact is touched.
    pub fn new(
        basedir: impl Into<PathBuf>,
        anat: impl Into<PathBuf>,
        target: AlignmentTarget,
        config: AlignerConfig,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let basedir = basedir.into();
        Ok(Self {
            paths: AlignmentPaths::new(&basedir, target.kind),
            basedir,
            anat: anat.into(),
            anat_mask: None,
            target,
            waymask: None,
            config,
            device,
        })
    }

    /// Brain mask of the anatomical volume; Otsu's threshold is used otherwise.
    pub fn with_anat_mask(mut self, mask: Option<PathBuf>) -> Self {
        self.anat_mask = mask;
        self
    }

    /// Waymask in anatomical space. Only diffusion targets warp it.
    pub fn with_waymask(mut self, waymask: Option<PathBuf>) -> Self {
        self.waymask = waymask;
        self
    }

    pub fn paths(&self) -> &AlignmentPaths {
        &self.paths
    }

    /// State a run would start from.
    pub fn state(&self) -> AlignmentState {
        if self.config.overwrite {
            AlignmentState::Unsegmented
        } else {
            AlignmentState::detect(&self.paths, self.waymask.is_some())
        }
    }

    /// Run every stage the starting state has not reached.
    pub fn run(&self) -> Result<AlignmentOutputs> {
        let state = self.state();
        tracing::info!(
            %state,
            target = self.target.kind.tag(),
            basedir = %self.basedir.display(),
            "starting alignment"
        );

        if state < AlignmentState::TissueSegmented {
            self.gen_tissue()?;
        } else {
            tracing::info!("tissue segmentation exists, skipping");
        }

        if state < AlignmentState::T1AlignedToTarget {
            self.align_to_target()?;
        } else {
            tracing::info!("T1 alignment exists, skipping");
        }

        let mut tissue = None;
        let mut waymask = None;
        if self.target.kind == TargetKind::Diffusion {
            if state < AlignmentState::TissueAlignedToTarget {
                self.tissue_to_target_align()?;
            } else {
                tracing::info!("aligned tissue maps exist, skipping");
            }
            tissue = Some(AlignedTissuePaths {
                wm: self.paths.wm_in_target.clone(),
                gm: self.paths.gm_in_target.clone(),
                vent_csf: self.paths.vent_csf_in_target.clone(),
                csf_mask: self.paths.csf_mask_in_target.clone(),
                wm_gm_int: self.paths.wm_gm_int_in_target.clone(),
            });

            if let Some(source) = &self.waymask {
                if state < AlignmentState::WaymaskAligned {
                    self.waymask_to_target_align(source)?;
                } else {
                    tracing::info!("aligned waymask exists, skipping");
                }
                waymask = Some(self.paths.waymask_in_target.clone());
            }
        }

        Ok(AlignmentOutputs {
            basedir: self.basedir.clone(),
            t1w_in_target: self.paths.t1w_in_target.clone(),
            forward_xfm: self.paths.forward_xfm.clone(),
            inverse_xfm: self.paths.inverse_xfm.clone(),
            tissue,
            waymask,
        })
    }

    /// Segment the anatomical volume and write the tissue maps.
    pub fn gen_tissue(&self) -> Result<()> {
        tracing::info!(anat = %self.anat.display(), "segmenting tissue");
        let anat = read_volume(&self.anat)?;
        let mask = self.anat_mask.as_deref().map(read_volume).transpose()?;
        let seg = TissueSegmenter::new(self.config.ventricle_erosion_mm).segment(&anat, mask.as_ref())?;

        ensure_parent(&self.paths.t1w_seg)?;
        write_volume(&self.paths.t1w_seg, &seg.labels)?;
        write_volume(&self.paths.t1w_brain_mask, &seg.brain_mask)?;
        write_volume(&self.paths.t1w_wm, &seg.tissue.wm)?;
        write_volume(&self.paths.t1w_gm, &seg.tissue.gm)?;
        write_volume(&self.paths.t1w_vent_csf, &seg.tissue.vent_csf)?;
        write_volume(&self.paths.t1w_csf_mask, &seg.tissue.csf_mask)?;
        Ok(())
    }

    /// Reference volume, restricted to the target brain mask when given.
    fn target_reference(&self) -> Result<(Volume, Option<Volume>)> {
        let reference = read_volume(&self.target.reference)?;
        let mask = match &self.target.brain_mask {
            Some(path) => {
                let mask = read_volume(path)?;
                reference.ensure_same_grid(&mask, "target reference/brain mask")?;
                Some(mask)
            }
            None => None,
        };
        Ok((reference, mask))
    }

    /// Fit the target-to-anatomical point map and write both transform
    /// files and the T1 resampled into the target space.
    pub fn align_to_target(&self) -> Result<()> {
        let device = &self.device;
        let (reference, target_mask) = self.target_reference()?;
        let mut fixed = reference.clone();
        if let Some(mask) = &target_mask {
            apply_mask(&mut fixed, mask)?;
        }
        let anat = read_volume(&self.anat)?;
        let mut moving = anat.clone();
        apply_mask(&mut moving, &read_volume(&self.paths.t1w_brain_mask)?)?;

        let fixed = fixed.into_image::<B>(device)?.normalized();
        let moving = moving.into_image::<B>(device)?.normalized();

        let fixed_center = fixed.metadata().center(fixed.shape());
        let moving_center = moving.metadata().center(moving.shape());
        let shift = moving_center - fixed_center;
        let affine = AffineTransform::<B, 3>::from_values(
            &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            &shift.to_array(),
            &fixed_center.to_array(),
            device,
        );

        let schedule = &self.config.schedule;
        tracing::info!(simple = self.config.simple, target = self.target.kind.tag(), "aligning T1 to target");
        let affine = fit(
            schedule.metric,
            &fixed,
            &moving,
            affine,
            schedule.affine_iterations,
            schedule.affine_learning_rate,
        )?;

        let forward = if self.config.simple {
            affine.to_record()
        } else {
            let bspline = BSplineTransform::<B>::covering(fixed.metadata(), fixed.shape(), schedule.bspline_grid_size, device);
            let chain = ChainedTransform::<B, _, _, 3>::new(bspline, affine);
            let chain = fit(
                schedule.metric,
                &fixed,
                &moving,
                chain,
                schedule.bspline_iterations,
                schedule.bspline_learning_rate,
            )?;
            chain.to_record()
        };

        ensure_parent(&self.paths.forward_xfm)?;
        write_transform(&self.paths.forward_xfm, &forward)?;
        write_transform(&self.paths.inverse_xfm, &forward.inverted())?;

        let t1w_in_target = warp::<B::InnerBackend, _>(&anat, &forward, &reference, LinearInterpolator::new(), device)?;
        write_volume(&self.paths.t1w_in_target, &t1w_in_target)?;
        Ok(())
    }

    /// Warp the tissue maps onto the target grid and build the WM/GM
    /// interface mask.
    pub fn tissue_to_target_align(&self) -> Result<()> {
        let device = &self.device;
        let forward = read_transform(&self.paths.forward_xfm)?;
        let (reference, target_mask) = self.target_reference()?;

        let linear = |path: &Path| -> Result<Volume> {
            warp::<B::InnerBackend, _>(&read_volume(path)?, &forward, &reference, LinearInterpolator::new(), device)
        };
        let wm = linear(&self.paths.t1w_wm)?;
        let gm = linear(&self.paths.t1w_gm)?;
        let vent_csf = linear(&self.paths.t1w_vent_csf)?;
        let csf_mask = binarize(
            &warp::<B::InnerBackend, _>(
                &read_volume(&self.paths.t1w_csf_mask)?,
                &forward,
                &reference,
                NearestNeighborInterpolator::new(),
                device,
            )?,
            0.5,
        );

        let radius = self.config.interface_dilation_mm;
        let wm_near = dilate(&binarize(&wm, 0.5), radius);
        let gm_near = dilate(&binarize(&gm, 0.5), radius);
        let mut interface = wm_near.clone();
        for (v, g) in interface.values_mut().iter_mut().zip(gm_near.values()) {
            *v = if *v > 0.0 && *g > 0.0 { 1.0 } else { 0.0 };
        }
        if let Some(mask) = &target_mask {
            apply_mask(&mut interface, mask)?;
        }
        let interface_voxels = interface.count_above(0.0);
        if interface_voxels == 0 {
            tracing::warn!("WM/GM interface in target space is empty");
        }

        ensure_parent(&self.paths.wm_in_target)?;
        write_volume(&self.paths.wm_in_target, &wm)?;
        write_volume(&self.paths.gm_in_target, &gm)?;
        write_volume(&self.paths.vent_csf_in_target, &vent_csf)?;
        write_volume(&self.paths.csf_mask_in_target, &csf_mask)?;
        write_volume(&self.paths.wm_gm_int_in_target, &interface)?;
        tracing::info!(interface_voxels, "aligned tissue maps to target");
        Ok(())
    }

    /// Warp a binary anatomical-space waymask onto the target grid.
    pub fn waymask_to_target_align(&self, waymask: &Path) -> Result<()> {
        let device = &self.device;
        let forward = read_transform(&self.paths.forward_xfm)?;
        let (reference, _) = self.target_reference()?;
        let warped = warp::<B::InnerBackend, _>(
            &read_volume(waymask)?,
            &forward,
            &reference,
            NearestNeighborInterpolator::new(),
            device,
        )?;
        let warped = binarize(&warped, 0.5);
        if warped.count_above(0.0) == 0 {
            tracing::warn!(waymask = %waymask.display(), "waymask is empty after alignment");
        }
        ensure_parent(&self.paths.waymask_in_target)?;
        write_volume(&self.paths.waymask_in_target, &warped)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_are_deterministic() {
        let paths = AlignmentPaths::new(Path::new("/work/sub-01"), TargetKind::Diffusion);
        assert_eq!(paths.t1w_wm, Path::new("/work/sub-01/anat_reg/t1w_wm.nii.gz"));
        assert_eq!(paths.forward_xfm, Path::new("/work/sub-01/dmri_reg/t1w2dwi_xfm.json"));
        assert_eq!(paths.inverse_xfm, Path::new("/work/sub-01/dmri_reg/dwi2t1w_xfm.json"));
        assert_eq!(paths.wm_gm_int_in_target, Path::new("/work/sub-01/dmri_reg/wm_gm_int_in_dwi.nii.gz"));

        let template = AlignmentPaths::new(Path::new("/work/sub-01"), TargetKind::Template);
        assert_eq!(template.t1w_in_target, Path::new("/work/sub-01/template_reg/t1w_in_template.nii.gz"));
    }

    #[test]
    fn test_state_detection_is_contiguous() {
        let dir = tempdir().unwrap();
        let paths = AlignmentPaths::new(dir.path(), TargetKind::Diffusion);
        assert_eq!(AlignmentState::detect(&paths, false), AlignmentState::Unsegmented);

        std::fs::create_dir_all(&paths.anat_dir).unwrap();
        std::fs::create_dir_all(&paths.target_dir).unwrap();
        let touch = |p: &Path| std::fs::write(p, b"").unwrap();
        for p in paths.segmentation_outputs() {
            touch(p);
        }
        assert_eq!(AlignmentState::detect(&paths, false), AlignmentState::TissueSegmented);

        // later artifacts without the T1 alignment do not count
        for p in paths.tissue_alignment_outputs() {
            touch(p);
        }
        assert_eq!(AlignmentState::detect(&paths, false), AlignmentState::TissueSegmented);

        for p in paths.t1_alignment_outputs() {
            touch(p);
        }
        assert_eq!(AlignmentState::detect(&paths, false), AlignmentState::TissueAlignedToTarget);
        assert_eq!(AlignmentState::detect(&paths, true), AlignmentState::TissueAlignedToTarget);
        touch(&paths.waymask_in_target);
        assert_eq!(AlignmentState::detect(&paths, true), AlignmentState::WaymaskAligned);

        let template = AlignmentPaths { kind: TargetKind::Template, ..paths };
        assert_eq!(AlignmentState::detect(&template, true), AlignmentState::T1AlignedToTarget);
    }

    #[test]
    fn test_config_validation() {
        let config = AlignerConfig { interface_dilation_mm: -1.0, ..AlignerConfig::default() };
        assert!(matches!(config.validate(), Err(RegistrationError::InvalidConfiguration(_))));
        assert!(AlignerConfig::default().with_simple(true).validate().is_ok());
    }
}
