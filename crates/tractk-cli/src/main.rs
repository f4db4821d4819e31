use anyhow::{Context, Result};
use burn::backend::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::info;
use tractk_registration::{write_mean_b0, Aligner, AlignerConfig, AlignmentPaths, AlignmentTarget, TargetKind};
use tractk_tracking::{
    run_tracking, ClassifierKind, DirectionGetterKind, ReconModel, TissuePaths, TrackingConfig, TrackingInputs,
};

type Backend = Autodiff<NdArray<f32>>;

#[derive(Parser)]
#[command(name = "tractk")]
#[command(about = "Structural connectome construction from diffusion MRI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a T1 and align it with its tissue maps to diffusion space
    RegisterDwi {
        /// Subject working directory
        #[arg(long)]
        basedir: PathBuf,
        #[arg(long)]
        anat: PathBuf,
        #[arg(long)]
        dwi: PathBuf,
        #[arg(long)]
        bvals: PathBuf,
        #[arg(long)]
        bvecs: PathBuf,
        /// Brain mask of the diffusion series
        #[arg(long)]
        brain_mask: Option<PathBuf>,
        /// Brain mask of the T1
        #[arg(long)]
        anat_mask: Option<PathBuf>,
        /// Waymask in T1 space
        #[arg(long)]
        waymask: Option<PathBuf>,
        #[command(flatten)]
        options: AlignOptions,
    },

    /// Segment a T1 and align it to a standard template
    RegisterFunc {
        #[arg(long)]
        basedir: PathBuf,
        #[arg(long)]
        anat: PathBuf,
        #[arg(long)]
        template: PathBuf,
        #[arg(long)]
        template_mask: Option<PathBuf>,
        #[arg(long)]
        anat_mask: Option<PathBuf>,
        #[command(flatten)]
        options: AlignOptions,
    },

    /// Fit a diffusion model, run ensemble tractography and write the
    /// density map
    Track {
        /// Subject directory holding the `register-dwi` outputs
        #[arg(long)]
        basedir: PathBuf,
        #[arg(long)]
        dwi: PathBuf,
        #[arg(long)]
        bvals: PathBuf,
        #[arg(long)]
        bvecs: PathBuf,
        /// Parcellation on the diffusion grid
        #[arg(long)]
        parcellation: PathBuf,
        #[arg(long)]
        brain_mask: Option<PathBuf>,
        /// Restrict seeding to parcels inside this mask
        #[arg(long)]
        roi: Option<PathBuf>,
        /// Keep only streamlines through this mask on the diffusion grid
        #[arg(long, conflicts_with = "aligned_waymask")]
        waymask: Option<PathBuf>,
        /// Use the waymask written by `register-dwi` under `basedir`
        #[arg(long)]
        aligned_waymask: bool,
        /// Network name used in output file names
        #[arg(long)]
        network: Option<String>,
        /// JSON tracking configuration; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// tensor, csa or csd
        #[arg(long)]
        model: Option<ReconModel>,
        /// act, cmc, bin or wb
        #[arg(long)]
        classifier: Option<ClassifierKind>,
        /// prob, boot, closest or det
        #[arg(long)]
        direction_getter: Option<DirectionGetterKind>,
        /// Maximum turning angles in degrees
        #[arg(long, value_delimiter = ',')]
        curvature: Option<Vec<f64>>,
        /// Step sizes in mm
        #[arg(long, value_delimiter = ',')]
        step: Option<Vec<f64>>,
        #[arg(long)]
        target_samples: Option<usize>,
        #[arg(long)]
        min_length: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(clap::Args)]
struct AlignOptions {
    /// JSON alignment configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Recompute every stage
    #[arg(long)]
    overwrite: bool,
    /// Affine only
    #[arg(long)]
    simple: bool,
}

impl AlignOptions {
    fn load(&self) -> Result<AlignerConfig> {
        let config: AlignerConfig = load_json(self.config.as_deref())?;
        let (overwrite, simple) = (self.overwrite || config.overwrite, self.simple || config.simple);
        Ok(config.with_overwrite(overwrite).with_simple(simple))
    }
}

fn load_json<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let device = NdArrayDevice::default();

    match cli.command {
        Commands::RegisterDwi { basedir, anat, dwi, bvals, bvecs, brain_mask, anat_mask, waymask, options } => {
            let config = options.load()?;
            let reference = basedir.join("dmri_reg").join("mean_b0.nii.gz");
            write_mean_b0::<Backend>(&dwi, &bvals, &bvecs, &reference, config.overwrite, &device)?;
            let outputs = Aligner::<Backend>::new(
                &basedir,
                anat,
                AlignmentTarget::diffusion(reference, brain_mask),
                config,
                device,
            )?
            .with_anat_mask(anat_mask)
            .with_waymask(waymask)
            .run()?;
            info!(t1w = %outputs.t1w_in_target.display(), "diffusion alignment complete");
        }
        Commands::RegisterFunc { basedir, anat, template, template_mask, anat_mask, options } => {
            let outputs = Aligner::<Backend>::new(
                &basedir,
                anat,
                AlignmentTarget::template(template, template_mask),
                options.load()?,
                device,
            )?
            .with_anat_mask(anat_mask)
            .run()?;
            info!(t1w = %outputs.t1w_in_target.display(), "template alignment complete");
        }
        Commands::Track {
            basedir,
            dwi,
            bvals,
            bvecs,
            parcellation,
            brain_mask,
            roi,
            waymask,
            aligned_waymask,
            network,
            config,
            model,
            classifier,
            direction_getter,
            curvature,
            step,
            target_samples,
            min_length,
            seed,
        } => {
            let mut config: TrackingConfig = load_json(config.as_deref())?;
            if let Some(model) = model {
                config = config.with_model(model);
            }
            if let Some(classifier) = classifier {
                config = config.with_classifier(classifier);
            }
            if let Some(getter) = direction_getter {
                config = config.with_direction_getter(getter);
            }
            if let Some(curvature) = curvature {
                config = config.with_curvature_thresholds(curvature);
            }
            if let Some(step) = step {
                config = config.with_step_sizes(step);
            }
            if let Some(target) = target_samples {
                config = config.with_target_samples(target);
            }
            if let Some(mm) = min_length {
                config = config.with_min_length(mm);
            }
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }

            let aligned = AlignmentPaths::new(&basedir, TargetKind::Diffusion);
            let waymask = if aligned_waymask { Some(aligned.waymask_in_target) } else { waymask };
            let tissue = TissuePaths {
                wm: aligned.wm_in_target,
                gm: aligned.gm_in_target,
                vent_csf: aligned.vent_csf_in_target,
                csf_mask: aligned.csf_mask_in_target,
                wm_gm_int: aligned.wm_gm_int_in_target,
            };
            let inputs = TrackingInputs::new(dwi, bvals, bvecs, parcellation, tissue)
                .with_brain_mask(brain_mask)
                .with_waymask(waymask)
                .with_roi(roi)
                .with_network(network);
            let outputs = run_tracking::<Backend>(&inputs, config, &device)?;
            info!(
                streamlines = outputs.streamlines,
                density_map = %outputs.files.density_map.display(),
                "tracking complete"
            );
        }
    }

    Ok(())
}
