use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::{SMatrix, Vector3};
use ndarray::{Array3, ArrayD, Axis, Ix3, Ix4};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;
use tractk_core::image::{DiffusionImage, Image, ImageMetadata, Volume};
use tractk_core::spatial::{Direction, Point, Spacing};

/// Voxel-to-world affine of a header: sform, else qform, else pixdim.
fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 4] {
    let rows: [[f32; 4]; 3] = if header.sform_code > 0 {
        [header.srow_x, header.srow_y, header.srow_z]
    } else if header.qform_code > 0 {
        let (b, c, d) = (header.quatern_b, header.quatern_c, header.quatern_d);
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] == 0.0 { 1.0 } else { header.pixdim[0] };
        let (dx, dy, dz) = (header.pixdim[1], header.pixdim[2], header.pixdim[3] * qfac);
        [
            [
                (a * a + b * b - c * c - d * d) * dx,
                (2.0 * b * c - 2.0 * a * d) * dy,
                (2.0 * b * d + 2.0 * a * c) * dz,
                header.quatern_x,
            ],
            [
                (2.0 * b * c + 2.0 * a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                (2.0 * c * d - 2.0 * a * b) * dz,
                header.quatern_y,
            ],
            [
                (2.0 * b * d - 2.0 * a * c) * dx,
                (2.0 * c * d + 2.0 * a * b) * dy,
                (a * a + d * d - c * c - b * b) * dz,
                header.quatern_z,
            ],
        ]
    } else {
        [
            [header.pixdim[1], 0.0, 0.0, 0.0],
            [0.0, header.pixdim[2], 0.0, 0.0],
            [0.0, 0.0, header.pixdim[3], 0.0],
        ]
    };
    let mut affine = [[0.0; 4]; 4];
    for (r, row) in rows.iter().enumerate() {
        for c in 0..4 {
            affine[r][c] = row[c] as f64;
        }
    }
    affine[3][3] = 1.0;
    affine
}

/// Split an affine into origin, spacing (column norms) and direction
/// (normalised columns).
fn metadata_from_affine(affine: &[[f64; 4]; 4]) -> ImageMetadata<3> {
    let origin = Point::new([affine[0][3], affine[1][3], affine[2][3]]);
    let columns: [Vector3<f64>; 3] =
        std::array::from_fn(|c| Vector3::new(affine[0][c], affine[1][c], affine[2][c]));
    let spacing = Spacing::new(columns.map(|col| col.norm()).map(|n| if n > 1e-9 { n } else { 1.0 }));
    let axes = [Vector3::x(), Vector3::y(), Vector3::z()];
    let dirs: [Vector3<f64>; 3] = std::array::from_fn(|c| {
        let norm = columns[c].norm();
        if norm > 1e-9 { columns[c] / norm } else { axes[c] }
    });
    let direction = Direction(SMatrix::<f64, 3, 3>::from_columns(&dirs));
    ImageMetadata::new(origin, spacing, direction)
}

/// Header carrying the grid geometry as an sform.
fn header_for(metadata: &ImageMetadata<3>) -> NiftiHeader {
    let affine = metadata.affine();
    let spacing = metadata.spacing();
    let row = |r: usize| affine[r].map(|v| v as f32);
    NiftiHeader {
        sform_code: 1,
        qform_code: 0,
        srow_x: row(0),
        srow_y: row(1),
        srow_z: row(2),
        pixdim: [1.0, spacing[0] as f32, spacing[1] as f32, spacing[2] as f32, 1.0, 1.0, 1.0, 1.0],
        xyzt_units: 2,
        ..NiftiHeader::default()
    }
}

fn read_array(path: &Path) -> Result<(ArrayD<f32>, ImageMetadata<3>)> {
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let metadata = metadata_from_affine(&header_affine(obj.header()));
    let array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    Ok((array, metadata))
}

/// Read a NIfTI volume into host memory. A trailing singleton 4th axis is
/// accepted.
pub fn read_volume<P: AsRef<Path>>(path: P) -> Result<Volume> {
    let path = path.as_ref();
    let (mut array, metadata) = read_array(path)?;
    if array.ndim() == 4 && array.shape()[3] == 1 {
        array = array.index_axis_move(Axis(3), 0);
    }
    if array.ndim() != 3 {
        bail!("Expected 3D NIfTI file {}, found {} dimensions", path.display(), array.ndim());
    }
    let array = array.into_dimensionality::<Ix3>()?;
    let (nx, ny, nz) = array.dim();
    // NIfTI arrays index (x, y, z); volumes store z outermost.
    let values: Vec<f32> = array.permuted_axes([2, 1, 0]).iter().copied().collect();
    Ok(Volume::new(values, [nx, ny, nz], metadata))
}

pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    Ok(read_volume(path)?.into_image(device)?)
}

/// Read a 4D diffusion series as `[frames, Z, Y, X]`.
pub fn read_diffusion<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<DiffusionImage<B>> {
    let path = path.as_ref();
    let (array, metadata) = read_array(path)?;
    if array.ndim() != 4 {
        bail!("Expected 4D diffusion NIfTI file {}, found {} dimensions", path.display(), array.ndim());
    }
    let array = array.into_dimensionality::<Ix4>()?;
    let (nx, ny, nz, nt) = array.dim();
    let values: Vec<f32> = array.permuted_axes([3, 2, 1, 0]).iter().copied().collect();
    let data = Tensor::<B, 4>::from_data(TensorData::new(values, Shape::new([nt, nz, ny, nx])), device);
    Ok(DiffusionImage::new(data, metadata))
}

/// Write a host volume with its affine stored as the sform.
pub fn write_volume<P: AsRef<Path>>(path: P, volume: &Volume) -> Result<()> {
    let path = path.as_ref();
    let [nx, ny, nz] = volume.dims();
    let array = Array3::from_shape_vec((nz, ny, nx), volume.values().to_vec())
        .context("Failed to create ndarray")?
        .permuted_axes([2, 1, 0]);
    let header = header_for(volume.metadata());
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    tracing::debug!(path = %path.display(), dims = ?volume.dims(), "wrote volume");
    Ok(())
}

pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>) -> Result<()> {
    write_volume(path, &Volume::from_image(image))
}

/// Write a 4D series; used to stage synthetic diffusion data.
pub fn write_diffusion<B: Backend, P: AsRef<Path>>(path: P, image: &DiffusionImage<B>) -> Result<()> {
    let path = path.as_ref();
    let [nz, ny, nx] = image.spatial_shape();
    let nt = image.num_frames();
    let values = image
        .data()
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to get tensor data: {:?}", e))?;
    let array = ndarray::Array4::from_shape_vec((nt, nz, ny, nx), values)?.permuted_axes([3, 2, 1, 0]);
    let header = header_for(image.metadata());
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_read_plain_nifti_layout() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.nii");
        // value = x + 10 y + 100 z on a (3, 4, 5) grid
        let array = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let volume = read_volume(&file_path)?;
        assert_eq!(volume.dims(), [3, 4, 5]);
        assert_eq!(volume.get(2, 3, 4), 432.0);

        let image = read_nifti::<TestBackend, _>(&file_path, &Default::default())?;
        assert_eq!(image.shape(), [5, 4, 3]);
        Ok(())
    }

    #[test]
    fn test_write_preserves_affine() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("affine.nii.gz");
        let meta = ImageMetadata::new(
            Point::new([-90.0, 126.0, -72.0]),
            Spacing::new([2.0, 2.0, 2.5]),
            Direction(SMatrix::<f64, 3, 3>::new(-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0)),
        );
        let mut volume = Volume::zeros([4, 3, 2], meta);
        volume.set(1, 2, 1, 7.0);
        write_volume(&path, &volume)?;

        let back = read_volume(&path)?;
        assert_eq!(back.dims(), [4, 3, 2]);
        assert_eq!(back.get(1, 2, 1), 7.0);
        assert!(back.metadata().approx_eq(&meta));
        Ok(())
    }

    #[test]
    fn test_diffusion_roundtrip_frame_order() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("dwi.nii.gz");
        let device = Default::default();
        let values: Vec<f32> = (0..3 * 2 * 2 * 2).map(|v| v as f32).collect();
        let data = Tensor::<TestBackend, 4>::from_data(TensorData::new(values, Shape::new([3, 2, 2, 2])), &device);
        let dwi = DiffusionImage::new(data, ImageMetadata::default());
        write_diffusion(&path, &dwi)?;

        let back = read_diffusion::<TestBackend, _>(&path, &device)?;
        assert_eq!(back.num_frames(), 3);
        assert_eq!(back.frame(2).to_vec(), dwi.frame(2).to_vec());
        Ok(())
    }
}
