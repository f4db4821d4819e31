//! Streamline density maps.

use anyhow::Context;
use burn::tensor::backend::Backend;
use std::path::{Path, PathBuf};
use tracing::info;
use tractk_core::image::{Image, ImageMetadata, Volume};
use tractk_core::spatial::Point;
use tractk_io::{write_trk, write_volume, TrkHeader};
use crate::config::TrackingConfig;
use crate::error::Result;
use crate::streamline::StreamlineBundle;

/// Counts streamline points per voxel of a reference grid.
///
/// Every point counts, so a streamline that lingers in a voxel for several
/// steps raises it by the number of points it left there.
#[derive(Debug, Clone)]
pub struct DensityMapBuilder {
    dims: [usize; 3],
    metadata: ImageMetadata<3>,
}

impl DensityMapBuilder {
    pub fn new(reference: &Volume) -> Self {
        Self { dims: reference.dims(), metadata: *reference.metadata() }
    }

    /// `streamline_grid` is the grid whose voxel indices the points use.
    pub fn build(&self, bundle: &StreamlineBundle, streamline_grid: &ImageMetadata<3>) -> Volume {
        let mut density = Volume::zeros(self.dims, self.metadata);
        let same_grid = streamline_grid.approx_eq(&self.metadata);
        for line in bundle.streamlines() {
            for p in line.points() {
                let index = if same_grid {
                    *p
                } else {
                    let physical = streamline_grid.index_to_physical(&Point::new(*p));
                    self.metadata.physical_to_index(&physical).to_array()
                };
                if let Some(offset) = density.voxel_at(&index) {
                    density.values_mut()[offset] += 1.0;
                }
            }
        }
        density
    }

    pub fn build_image<B: Backend>(
        &self,
        bundle: &StreamlineBundle,
        streamline_grid: &ImageMetadata<3>,
        device: &B::Device,
    ) -> Result<Image<B, 3>> {
        Ok(self.build(bundle, streamline_grid).into_image(device)?)
    }
}

/// Output locations of one tracking run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensityOutputs {
    pub dir: PathBuf,
    pub density_map: PathBuf,
    pub streamlines: PathBuf,
}

/// File name without `.nii.gz` or `.nii`.
pub(crate) fn stem(path: &Path) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    name.strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(&name)
        .to_string()
}

fn list(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}

impl DensityOutputs {
    /// Outputs go to `<diffusion dir>/<parcellation stem>/`; file names
    /// encode the run parameters.
    pub fn new(
        dwi: &Path,
        parcellation: &Path,
        config: &TrackingConfig,
        node_size: &str,
        network: Option<&str>,
        roi: Option<&Path>,
    ) -> Self {
        let dir = dwi.parent().unwrap_or(Path::new(".")).join(stem(parcellation));
        let network = network.map(|n| format!("{n}_")).unwrap_or_default();
        let roi = roi.map(|r| format!("_{}", stem(r))).unwrap_or_default();
        let tag = format!(
            "{network}{}_{}_{node_size}{roi}_curv-{}_step-{}_directget-{}_minlength-{}",
            config.model,
            config.target_samples,
            list(&config.curvature_thresholds),
            list(&config.step_sizes),
            config.direction_getter,
            config.min_length,
        );
        Self {
            density_map: dir.join(format!("density_map_{tag}.nii.gz")),
            streamlines: dir.join(format!("streamlines_{tag}.trk")),
            dir,
        }
    }

    /// Write the density map and the streamlines; `header` describes the
    /// grid of the streamline points.
    pub fn write(&self, density: &Volume, bundle: &StreamlineBundle, header: &TrkHeader) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory {}", self.dir.display()))?;
        write_volume(&self.density_map, density)?;
        write_trk(&self.streamlines, header, bundle.streamlines())?;
        info!(
            density_map = %self.density_map.display(),
            streamlines = bundle.len(),
            "wrote tractography outputs"
        );
        Ok(())
    }
}
