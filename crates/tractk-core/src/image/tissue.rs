//! Tissue-class maps sharing one voxel grid.

use crate::error::Result;
use crate::image::Volume;

/// White matter, gray matter and ventricle/CSF probability maps plus the
/// binary CSF mask.
#[derive(Debug, Clone)]
pub struct TissueMaps {
    pub wm: Volume,
    pub gm: Volume,
    pub vent_csf: Volume,
    pub csf_mask: Volume,
}

impl TissueMaps {
    /// Fails with a grid mismatch unless every map shares the WM grid.
    pub fn new(wm: Volume, gm: Volume, vent_csf: Volume, csf_mask: Volume) -> Result<Self> {
        wm.ensure_same_grid(&gm, "wm/gm")?;
        wm.ensure_same_grid(&vent_csf, "wm/vent_csf")?;
        wm.ensure_same_grid(&csf_mask, "wm/csf_mask")?;
        Ok(Self { wm, gm, vent_csf, csf_mask })
    }

    /// Grid shared by all maps.
    pub fn grid(&self) -> &Volume {
        &self.wm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageMetadata;
    use crate::spatial::Spacing;

    #[test]
    fn test_mismatched_grid_is_rejected() {
        let meta = ImageMetadata::default();
        let a = Volume::zeros([4, 4, 4], meta);
        let b = Volume::zeros([4, 4, 4], meta.with_spacing(Spacing::uniform(2.0)));
        let err = TissueMaps::new(a.clone(), a.clone(), b, a.clone()).unwrap_err();
        assert!(err.to_string().contains("wm/vent_csf"));

        assert!(TissueMaps::new(a.clone(), a.clone(), a.clone(), a).is_ok());
    }
}
