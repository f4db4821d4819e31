//! Binary morphology on host volumes.
//!
//! Structuring elements are ellipsoids whose radius is given in millimetres,
//! so anisotropic voxels get a physically round neighbourhood.

use crate::image::Volume;

/// 1.0 where `value > threshold`, else 0.0.
pub fn binarize(volume: &Volume, threshold: f32) -> Volume {
    volume.map(|v| if v > threshold { 1.0 } else { 0.0 })
}

/// Voxel offsets within `radius_mm` of the centre.
fn ball_offsets(volume: &Volume, radius_mm: f64) -> Vec<[i64; 3]> {
    let spacing = volume.metadata().spacing();
    let r: [i64; 3] = std::array::from_fn(|a| (radius_mm / spacing[a]).floor().max(0.0) as i64);
    let mut offsets = Vec::new();
    for dz in -r[2]..=r[2] {
        for dy in -r[1]..=r[1] {
            for dx in -r[0]..=r[0] {
                let d2 = (dx as f64 * spacing[0]).powi(2)
                    + (dy as f64 * spacing[1]).powi(2)
                    + (dz as f64 * spacing[2]).powi(2);
                if d2 <= radius_mm * radius_mm + 1e-9 {
                    offsets.push([dx, dy, dz]);
                }
            }
        }
    }
    offsets
}

fn neighbour(volume: &Volume, x: usize, y: usize, z: usize, o: &[i64; 3]) -> Option<usize> {
    let [nx, ny, nz] = volume.dims();
    let (ni, nj, nk) = (x as i64 + o[0], y as i64 + o[1], z as i64 + o[2]);
    if ni < 0 || nj < 0 || nk < 0 || ni >= nx as i64 || nj >= ny as i64 || nk >= nz as i64 {
        None
    } else {
        Some(volume.offset(ni as usize, nj as usize, nk as usize))
    }
}

/// Binary dilation of the nonzero voxels of `mask`.
pub fn dilate(mask: &Volume, radius_mm: f64) -> Volume {
    let offsets = ball_offsets(mask, radius_mm);
    let mut out = Volume::zeros(mask.dims(), *mask.metadata());
    for (i, v) in mask.values().iter().enumerate() {
        if *v == 0.0 {
            continue;
        }
        let [x, y, z] = mask.coords(i);
        for o in &offsets {
            if let Some(j) = neighbour(mask, x, y, z, o) {
                out.values_mut()[j] = 1.0;
            }
        }
    }
    out
}

/// Binary erosion; voxels beyond the border count as background.
pub fn erode(mask: &Volume, radius_mm: f64) -> Volume {
    let offsets = ball_offsets(mask, radius_mm);
    let mut out = Volume::zeros(mask.dims(), *mask.metadata());
    for (i, v) in mask.values().iter().enumerate() {
        if *v == 0.0 {
            continue;
        }
        let [x, y, z] = mask.coords(i);
        let inside = offsets
            .iter()
            .all(|o| neighbour(mask, x, y, z, o).is_some_and(|j| mask.values()[j] != 0.0));
        if inside {
            out.values_mut()[i] = 1.0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageMetadata;
    use crate::spatial::{Direction, Point, Spacing};

    fn single_voxel(spacing: [f64; 3]) -> Volume {
        let meta = ImageMetadata::new(Point::origin(), Spacing::new(spacing), Direction::identity());
        let mut v = Volume::zeros([7, 7, 7], meta);
        v.set(3, 3, 3, 1.0);
        v
    }

    #[test]
    fn test_dilate_face_neighbours() {
        let d = dilate(&single_voxel([1.0; 3]), 1.0);
        assert_eq!(d.count_above(0.0), 7);
        assert_eq!(d.get(4, 3, 3), 1.0);
        assert_eq!(d.get(4, 4, 3), 0.0);
    }

    #[test]
    fn test_dilate_respects_anisotropic_spacing() {
        // 2mm along z: a 1.5mm ball does not reach the z neighbours.
        let d = dilate(&single_voxel([1.0, 1.0, 2.0]), 1.5);
        assert_eq!(d.get(3, 3, 4), 0.0);
        assert_eq!(d.get(4, 4, 3), 1.0);
    }

    #[test]
    fn test_erode_undoes_dilate_of_point() {
        let v = single_voxel([1.0; 3]);
        let e = erode(&dilate(&v, 1.0), 1.0);
        assert_eq!(e, v);
        assert_eq!(erode(&v, 1.0).count_above(0.0), 0);
    }

    #[test]
    fn test_binarize() {
        let v = single_voxel([1.0; 3]).map(|x| x * 0.7);
        assert_eq!(binarize(&v, 0.5).count_above(0.0), 1);
        assert_eq!(binarize(&v, 0.8).count_above(0.0), 0);
    }
}
