//! TrackVis (`.trk`, version 2) streamline files.
//!
//! Streamlines are held in continuous voxel indices `(x, y, z)` of the grid
//! described by the header. On disk TrackVis stores "voxmm" coordinates
//! whose origin is the corner of voxel 0, i.e. `(index + 0.5) * voxel_size`.

use anyhow::{bail, Context, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::Path;
use tractk_core::image::ImageMetadata;

const HEADER_SIZE: usize = 1000;
const VOX_TO_RAS: u64 = 440;
const VOXEL_ORDER: usize = 948;
const N_COUNT: usize = 988;
const HDR_SIZE: usize = 996;

/// Grid description stored in a TrackVis header.
#[derive(Debug, Clone, PartialEq)]
pub struct TrkHeader {
    pub dims: [usize; 3],
    pub voxel_size: [f32; 3],
    pub vox_to_ras: [[f32; 4]; 4],
}

impl TrkHeader {
    pub fn from_metadata(dims: [usize; 3], metadata: &ImageMetadata<3>) -> Self {
        let spacing = metadata.spacing();
        let affine = metadata.affine();
        Self {
            dims,
            voxel_size: [spacing[0] as f32, spacing[1] as f32, spacing[2] as f32],
            vox_to_ras: affine.map(|row| row.map(|v| v as f32)),
        }
    }

    fn write<E: ByteOrder, W: Write>(&self, out: &mut W, n_count: usize) -> Result<()> {
        out.write_all(b"TRACK\0")?;
        for &d in &self.dims {
            out.write_i16::<E>(i16::try_from(d).context("Grid dimension does not fit a TrackVis header")?)?;
        }
        for &s in &self.voxel_size {
            out.write_f32::<E>(s)?;
        }
        // origin, scalars and properties stay zero
        out.write_all(&[0u8; VOX_TO_RAS as usize - 24])?;
        for row in &self.vox_to_ras {
            for &v in row {
                out.write_f32::<E>(v)?;
            }
        }
        out.write_all(&[0u8; VOXEL_ORDER - VOX_TO_RAS as usize - 64])?;
        out.write_all(b"RAS\0")?;
        out.write_all(&[0u8; N_COUNT - VOXEL_ORDER - 4])?;
        out.write_i32::<E>(i32::try_from(n_count).context("Too many streamlines for a TrackVis file")?)?;
        out.write_i32::<E>(2)?;
        out.write_i32::<E>(HEADER_SIZE as i32)?;
        Ok(())
    }

    fn parse<E: ByteOrder>(bytes: &[u8; HEADER_SIZE]) -> Result<(Self, i32)> {
        let mut input = Cursor::new(bytes.as_slice());
        input.set_position(6);
        let mut dims = [0usize; 3];
        for d in &mut dims {
            *d = input.read_i16::<E>()?.max(0) as usize;
        }
        let mut voxel_size = [0f32; 3];
        for s in &mut voxel_size {
            *s = input.read_f32::<E>()?;
        }
        input.set_position(36);
        let n_scalars = input.read_i16::<E>()?;
        input.set_position(238);
        let n_properties = input.read_i16::<E>()?;
        if n_scalars != 0 || n_properties != 0 {
            bail!("TrackVis files with per-point scalars or properties are not supported");
        }
        input.set_position(VOX_TO_RAS);
        let mut vox_to_ras = [[0f32; 4]; 4];
        for row in &mut vox_to_ras {
            for v in row.iter_mut() {
                *v = input.read_f32::<E>()?;
            }
        }
        let n_count = E::read_i32(&bytes[N_COUNT..]);
        Ok((Self { dims, voxel_size, vox_to_ras }, n_count))
    }
}

fn write_streamlines<E: ByteOrder, W: Write, S: AsRef<[[f64; 3]]>>(
    out: &mut W,
    header: &TrkHeader,
    streamlines: &[S],
) -> Result<()> {
    header.write::<E, _>(out, streamlines.len())?;
    for streamline in streamlines {
        let points = streamline.as_ref();
        out.write_i32::<E>(i32::try_from(points.len()).context("Too many points in one streamline")?)?;
        for point in points {
            for axis in 0..3 {
                let voxmm = (point[axis] + 0.5) * header.voxel_size[axis] as f64;
                out.write_f32::<E>(voxmm as f32)?;
            }
        }
    }
    Ok(())
}

/// Write streamlines given in voxel indices, little-endian.
pub fn write_trk<P: AsRef<Path>, S: AsRef<[[f64; 3]]>>(
    path: P,
    header: &TrkHeader,
    streamlines: &[S],
) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create TrackVis file {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write_streamlines::<LittleEndian, _, _>(&mut out, header, streamlines)
        .and_then(|_| out.flush().map_err(Into::into))
        .with_context(|| format!("Failed to write TrackVis file {}", path.display()))?;
    tracing::debug!(path = %path.display(), count = streamlines.len(), "wrote streamlines");
    Ok(())
}

fn read_streamlines<E: ByteOrder, R: Read>(
    input: &mut R,
    head: &[u8; HEADER_SIZE],
) -> Result<(TrkHeader, Vec<Vec<[f64; 3]>>)> {
    let (header, n_count) = TrkHeader::parse::<E>(head)?;
    let mut streamlines = Vec::new();
    loop {
        let n_points = match input.read_i32::<E>() {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if n_points < 0 {
            bail!("Negative point count in streamline {}", streamlines.len());
        }
        let mut points = Vec::with_capacity(n_points as usize);
        for _ in 0..n_points {
            let mut point = [0.0; 3];
            for (axis, value) in point.iter_mut().enumerate() {
                let voxmm = input.read_f32::<E>().context("Truncated streamline")? as f64;
                *value = voxmm / header.voxel_size[axis] as f64 - 0.5;
            }
            points.push(point);
        }
        streamlines.push(points);
    }
    if n_count > 0 && streamlines.len() != n_count as usize {
        bail!("Header declares {} streamlines, found {}", n_count, streamlines.len());
    }
    Ok((header, streamlines))
}

/// Read a TrackVis file of either byte order back into voxel indices.
pub fn read_trk<P: AsRef<Path>>(path: P) -> Result<(TrkHeader, Vec<Vec<[f64; 3]>>)> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open TrackVis file {}", path.display()))?;
    let mut input = BufReader::new(file);
    let mut head = [0u8; HEADER_SIZE];
    input
        .read_exact(&mut head)
        .with_context(|| format!("TrackVis file {} is shorter than its header", path.display()))?;
    if &head[0..5] != b"TRACK" {
        bail!("Not a TrackVis file: bad magic in {}", path.display());
    }

    let hdr_size = &head[HDR_SIZE..];
    let read = if LittleEndian::read_i32(hdr_size) == HEADER_SIZE as i32 {
        read_streamlines::<LittleEndian, _>(&mut input, &head)
    } else if BigEndian::read_i32(hdr_size) == HEADER_SIZE as i32 {
        read_streamlines::<BigEndian, _>(&mut input, &head)
    } else {
        bail!("Unsupported TrackVis header size {} in {}", LittleEndian::read_i32(hdr_size), path.display());
    };
    read.with_context(|| format!("Failed to read TrackVis file {}", path.display()))
}
