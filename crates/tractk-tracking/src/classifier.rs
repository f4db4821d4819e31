//! Tissue classification for stopping criteria.

use tractk_core::image::{ImageMetadata, TissueMaps, Volume};
use crate::config::ClassifierKind;
use crate::error::Result;

/// What the tracker does at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TissueClass {
    /// Keep walking.
    Trackable,
    /// Stop and keep the streamline.
    Terminal,
    /// Stop and discard the streamline.
    Excluded,
    /// Beyond the grid: stop and keep.
    Outside,
}

/// Per-voxel tissue classes on the diffusion grid.
#[derive(Debug, Clone)]
pub struct TissueClassifier {
    kind: ClassifierKind,
    dims: [usize; 3],
    metadata: ImageMetadata<3>,
    classes: Vec<TissueClass>,
}

impl TissueClassifier {
    /// Classify every voxel. `brain_mask` must share the tissue grid.
    pub fn new(kind: ClassifierKind, tissue: &TissueMaps, brain_mask: &Volume) -> Result<Self> {
        tissue.grid().ensure_same_grid(brain_mask, "tissue/brain mask")?;
        let (wm, gm, csf) = (tissue.wm.values(), tissue.gm.values(), tissue.vent_csf.values());
        let mask = brain_mask.values();

        let classes = (0..wm.len())
            .map(|i| match kind {
                ClassifierKind::Act => {
                    if gm[i] >= 0.5 {
                        TissueClass::Terminal
                    } else if csf[i] >= 0.5 {
                        TissueClass::Excluded
                    } else if wm[i] > 0.0 {
                        TissueClass::Trackable
                    } else {
                        TissueClass::Terminal
                    }
                }
                ClassifierKind::Cmc => {
                    if wm[i] <= 0.0 && gm[i] <= 0.0 && csf[i] <= 0.0 {
                        TissueClass::Terminal
                    } else if wm[i] >= gm[i] && wm[i] >= csf[i] {
                        TissueClass::Trackable
                    } else if gm[i] >= csf[i] {
                        TissueClass::Terminal
                    } else {
                        TissueClass::Excluded
                    }
                }
                ClassifierKind::Bin => {
                    if wm[i] > 0.5 {
                        TissueClass::Trackable
                    } else {
                        TissueClass::Terminal
                    }
                }
                ClassifierKind::Wb => {
                    if mask[i] > 0.0 {
                        TissueClass::Trackable
                    } else {
                        TissueClass::Terminal
                    }
                }
            })
            .collect();

        Ok(Self {
            kind,
            dims: tissue.grid().dims(),
            metadata: *tissue.grid().metadata(),
            classes,
        })
    }

    pub fn kind(&self) -> ClassifierKind {
        self.kind
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn metadata(&self) -> &ImageMetadata<3> {
        &self.metadata
    }

    /// Class of the voxel nearest to a continuous index.
    pub fn classify(&self, index: &[f64; 3]) -> TissueClass {
        let mut v = [0usize; 3];
        for axis in 0..3 {
            let r = index[axis].round();
            if !(r >= 0.0 && r < self.dims[axis] as f64) {
                return TissueClass::Outside;
            }
            v[axis] = r as usize;
        }
        self.classes[(v[2] * self.dims[1] + v[1]) * self.dims[0] + v[0]]
    }

    /// Number of voxels of each class, in declaration order without `Outside`.
    pub fn counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for c in &self.classes {
            match c {
                TissueClass::Trackable => counts[0] += 1,
                TissueClass::Terminal => counts[1] += 1,
                TissueClass::Excluded => counts[2] += 1,
                TissueClass::Outside => {}
            }
        }
        counts
    }
}
