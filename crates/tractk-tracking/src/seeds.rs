//! Parcellations and seed generation.

use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;
use tractk_core::filter::morphology::{binarize, dilate};
use tractk_core::image::Volume;
use crate::error::{Result, TrackingError};

/// Integer-labelled volume split into one voxel set per nonzero label.
#[derive(Debug, Clone)]
pub struct Parcellation {
    name: String,
    volume: Volume,
    /// Ascending labels with their voxel offsets, ascending.
    parcels: Vec<(i64, Vec<usize>)>,
}

impl Parcellation {
    /// Split `volume` by label. Values are rounded to the nearest integer.
    pub fn new(volume: Volume, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut parcels: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (offset, v) in volume.values().iter().enumerate() {
            let label = v.round() as i64;
            if label != 0 {
                parcels.entry(label).or_default().push(offset);
            }
        }
        if parcels.is_empty() {
            return Err(TrackingError::EmptyParcellation(name));
        }
        Ok(Self { name, volume, parcels: parcels.into_iter().collect() })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn labels(&self) -> Vec<i64> {
        self.parcels.iter().map(|(l, _)| *l).collect()
    }

    pub fn num_parcels(&self) -> usize {
        self.parcels.len()
    }

    /// Voxel offsets of every parcel, ascending label order.
    pub fn parcels(&self) -> &[(i64, Vec<usize>)] {
        &self.parcels
    }

    /// Keep only parcel voxels inside `roi`.
    pub fn within(&self, roi: &Volume) -> Result<Self> {
        self.volume.ensure_same_grid(roi, "parcellation/roi")?;
        let r = roi.values();
        let masked = Volume::new(
            self.volume.values().iter().zip(r).map(|(l, m)| if *m > 0.0 { *l } else { 0.0 }).collect(),
            self.volume.dims(),
            *self.volume.metadata(),
        );
        Self::new(masked, format!("{} within roi", self.name))
    }

    /// Union of all parcels dilated by `tolerance_mm`.
    pub fn proximity_mask(&self, tolerance_mm: f64) -> Volume {
        dilate(&binarize(&self.volume.map(f32::abs), 0.5), tolerance_mm)
    }

    /// Seed voxels: parcel voxels where `interface` is nonzero.
    pub fn seed_region(&self, interface: &Volume) -> Result<SeedRegion> {
        self.volume.ensure_same_grid(interface, "parcellation/wm-gm interface")?;
        let mask = interface.values();
        let parcels: Vec<(i64, Vec<usize>)> = self
            .parcels
            .iter()
            .map(|(label, voxels)| (*label, voxels.iter().copied().filter(|&o| mask[o] > 0.0).collect::<Vec<_>>()))
            .filter(|(_, voxels)| !voxels.is_empty())
            .collect();
        if parcels.is_empty() {
            return Err(TrackingError::EmptySeeds(format!(
                "no voxel of {} lies on the white/grey matter interface",
                self.name
            )));
        }
        Ok(SeedRegion { dims: self.volume.dims(), parcels })
    }
}

/// Per-parcel seed voxels.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRegion {
    dims: [usize; 3],
    parcels: Vec<(i64, Vec<usize>)>,
}

impl SeedRegion {
    pub fn num_voxels(&self) -> usize {
        self.parcels.iter().map(|(_, v)| v.len()).sum()
    }

    pub fn labels(&self) -> Vec<i64> {
        self.parcels.iter().map(|(l, _)| *l).collect()
    }

    /// `per_voxel` points per seed voxel, each uniformly jittered within the
    /// voxel, visiting labels in ascending order.
    pub fn generate(&self, per_voxel: usize, rng: &mut StdRng) -> Vec<[f64; 3]> {
        let [nx, ny, _] = self.dims;
        let mut seeds = Vec::with_capacity(self.num_voxels() * per_voxel);
        for (_, voxels) in &self.parcels {
            for &offset in voxels {
                let centre = [(offset % nx) as f64, ((offset / nx) % ny) as f64, (offset / (nx * ny)) as f64];
                for _ in 0..per_voxel {
                    seeds.push(centre.map(|c| c + rng.random_range(-0.5..0.5)));
                }
            }
        }
        seeds
    }
}
