//! NIfTI volume I/O
//!
//! Loads NIfTI-1 files (plain or gzipped, auto-detected) into [`Volume`]
//! and writes volumes back out as float32. Only axis-aligned orientations
//! are supported: spacing comes from pixdim, origin and per-axis direction
//! signs from the sform affine. Intensity scaling (scl_slope/scl_inter) is
//! applied on load so the returned data is in physical units.

use std::io::Cursor;
use std::path::Path;

use flate2::read::GzDecoder;
use log::warn;
use ndarray::Array;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::SegmentationError;
use crate::volume::Volume;

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

fn nifti_err(context: &str, detail: impl std::fmt::Display) -> SegmentationError {
    SegmentationError::Nifti(format!("{}: {}", context, detail))
}

/// Extract origin and per-axis direction signs from the header
///
/// Uses the sform when present; otherwise assumes identity orientation at
/// the origin. Off-diagonal sform terms are ignored with a warning since
/// the pipeline only supports axis-aligned volumes.
fn geometry_from_header(header: &NiftiHeader) -> ((f64, f64, f64), (f64, f64, f64)) {
    if header.sform_code == 0 {
        return ((0.0, 0.0, 0.0), (1.0, 1.0, 1.0));
    }

    let rows = [header.srow_x, header.srow_y, header.srow_z];
    for (axis, row) in rows.iter().enumerate() {
        for (col, &v) in row.iter().take(3).enumerate() {
            if col != axis && v.abs() > 1e-6 {
                warn!("oblique sform term [{}][{}] = {} ignored", axis, col, v);
            }
        }
    }

    let origin = (
        rows[0][3] as f64,
        rows[1][3] as f64,
        rows[2][3] as f64,
    );
    let sign = |v: f32| if v < 0.0 { -1.0 } else { 1.0 };
    let direction = (sign(rows[0][0]), sign(rows[1][1]), sign(rows[2][2]));

    (origin, direction)
}

/// Load a NIfTI volume from bytes
///
/// Supports .nii and .nii.gz content. 4D inputs keep their first timepoint.
///
/// # Errors
/// `SegmentationError::Nifti` for malformed input or unsupported
/// dimensionality.
pub fn load_volume(bytes: &[u8]) -> Result<Volume, SegmentationError> {
    let obj: InMemNiftiObject = if is_gzip(bytes) {
        let decoder = GzDecoder::new(Cursor::new(bytes));
        InMemNiftiObject::from_reader(decoder)
            .map_err(|e| nifti_err("failed to read gzipped NIfTI", e))?
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| nifti_err("failed to read NIfTI", e))?
    };

    let header = obj.header();
    let spacing = (
        header.pixdim[1] as f64,
        header.pixdim[2] as f64,
        header.pixdim[3] as f64,
    );
    let slope = if header.scl_slope == 0.0 {
        1.0
    } else {
        header.scl_slope as f64
    };
    let inter = header.scl_inter as f64;
    let (origin, direction) = geometry_from_header(header);

    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| nifti_err("failed to convert volume", e))?;
    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(SegmentationError::Nifti(format!(
            "expected a 3D volume, got {}D",
            shape.len()
        )));
    }

    let dims = (shape[0], shape[1], shape[2]);
    let mut data = Vec::with_capacity(dims.0 * dims.1 * dims.2);

    // Fortran order, x fastest; 4D inputs contribute their first timepoint
    for k in 0..dims.2 {
        for j in 0..dims.1 {
            for i in 0..dims.0 {
                let raw = if shape.len() == 3 {
                    array[[i, j, k]]
                } else {
                    array[[i, j, k, 0]]
                };
                data.push(raw * slope + inter);
            }
        }
    }

    let volume = Volume {
        data,
        dims,
        spacing,
        origin,
        direction,
    };
    volume.check_geometry()?;
    Ok(volume)
}

/// Read a NIfTI volume from a filesystem path
pub fn read_volume_file(path: &Path) -> Result<Volume, SegmentationError> {
    let bytes = std::fs::read(path)
        .map_err(|e| nifti_err(&format!("failed to read '{}'", path.display()), e))?;
    load_volume(&bytes)
}

/// Serialize a volume as uncompressed NIfTI-1 bytes (float32)
pub fn save_volume(volume: &Volume) -> Result<Vec<u8>, SegmentationError> {
    let (nx, ny, nz) = volume.dims;
    let (sx, sy, sz) = volume.spacing;
    let (ox, oy, oz) = volume.origin;
    let (dx, dy, dz) = volume.direction;

    let mut header = [0u8; 348];

    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    let dim: [i16; 8] = [3, nx as i16, ny as i16, nz as i16, 1, 1, 1, 1];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype 16 = FLOAT32, bitpix 32
    header[70..72].copy_from_slice(&16i16.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    let pixdim: [f32; 8] = [1.0, sx as f32, sy as f32, sz as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    // vox_offset 352 = header + 4 extension bytes
    header[108..112].copy_from_slice(&352.0f32.to_le_bytes());
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());

    // sform_code 1, diagonal affine from spacing, signs and origin
    header[254..256].copy_from_slice(&1i16.to_le_bytes());
    let srow_x: [f32; 4] = [(sx * dx) as f32, 0.0, 0.0, ox as f32];
    let srow_y: [f32; 4] = [0.0, (sy * dy) as f32, 0.0, oy as f32];
    let srow_z: [f32; 4] = [0.0, 0.0, (sz * dz) as f32, oz as f32];
    for (base, row) in [(280, srow_x), (296, srow_y), (312, srow_z)] {
        for (i, &v) in row.iter().enumerate() {
            let offset = base + i * 4;
            header[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
        }
    }

    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(352 + volume.data.len() * 4);
    buffer.extend_from_slice(&header);
    buffer.extend_from_slice(&[0u8; 4]);
    for &val in &volume.data {
        buffer.extend_from_slice(&(val as f32).to_le_bytes());
    }

    Ok(buffer)
}

/// Serialize a volume as gzipped NIfTI-1 bytes
pub fn save_volume_gz(volume: &Volume) -> Result<Vec<u8>, SegmentationError> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let uncompressed = save_volume(volume)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&uncompressed)
        .map_err(|e| nifti_err("gzip compression failed", e))?;
    encoder.finish().map_err(|e| nifti_err("gzip finish failed", e))
}

/// Write a volume to a file
///
/// Paths ending in .nii.gz are gzip compressed, anything else is plain .nii.
pub fn write_volume_file(path: &Path, volume: &Volume) -> Result<(), SegmentationError> {
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
        save_volume_gz(volume)?
    } else {
        save_volume(volume)?
    };

    std::fs::write(path, &bytes)
        .map_err(|e| nifti_err(&format!("failed to write '{}'", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_volume() -> Volume {
        let mut vol = Volume::new((4, 5, 6), (0.5, 1.0, 2.0));
        vol.origin = (-3.0, 7.0, 0.5);
        vol.direction = (-1.0, 1.0, 1.0);
        for (i, v) in vol.data.iter_mut().enumerate() {
            *v = i as f64 * 0.25;
        }
        vol
    }

    #[test]
    fn test_gzip_detection() {
        assert!(is_gzip(&[0x1f, 0x8b, 0x00]));
        assert!(!is_gzip(&[0x00, 0x00, 0x00]));
        assert!(!is_gzip(&[0x1f]));
    }

    #[test]
    fn test_save_volume_header() {
        let bytes = save_volume(&ramp_volume()).unwrap();

        assert_eq!(bytes.len(), 352 + 4 * 5 * 6 * 4);
        assert_eq!(&bytes[344..348], b"n+1\0");

        let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(sizeof_hdr, 348);
        let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);
        assert_eq!(datatype, 16);
        let nx = i16::from_le_bytes([bytes[42], bytes[43]]);
        assert_eq!(nx, 4);

        // srow_x[0] carries spacing times direction sign
        let sxx = f32::from_le_bytes([bytes[280], bytes[281], bytes[282], bytes[283]]);
        assert_eq!(sxx, -0.5);
    }

    #[test]
    fn test_bytes_round_trip() {
        let vol = ramp_volume();
        let bytes = save_volume(&vol).unwrap();
        let loaded = load_volume(&bytes).unwrap();

        assert_eq!(loaded.dims, vol.dims);
        assert_eq!(loaded.direction, vol.direction);
        for axis in [
            (loaded.spacing.0, vol.spacing.0),
            (loaded.spacing.1, vol.spacing.1),
            (loaded.spacing.2, vol.spacing.2),
            (loaded.origin.0, vol.origin.0),
            (loaded.origin.1, vol.origin.1),
            (loaded.origin.2, vol.origin.2),
        ] {
            assert!((axis.0 - axis.1).abs() < 1e-5);
        }

        // float32 storage precision
        for (a, b) in loaded.data.iter().zip(vol.data.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_gz_round_trip() {
        let vol = ramp_volume();
        let bytes = save_volume_gz(&vol).unwrap();
        assert!(is_gzip(&bytes));

        let loaded = load_volume(&bytes).unwrap();
        assert_eq!(loaded.dims, vol.dims);
    }

    #[test]
    fn test_file_round_trip() {
        let vol = ramp_volume();
        let path = std::env::temp_dir().join("carpal_nifti_io_rt.nii.gz");

        write_volume_file(&path, &vol).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(is_gzip(&bytes));

        let loaded = read_volume_file(&path).unwrap();
        assert_eq!(loaded.dims, vol.dims);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_invalid_bytes_error() {
        let err = load_volume(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, SegmentationError::Nifti(_)));

        let err = load_volume(&[0x1f, 0x8b, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, SegmentationError::Nifti(_)));
    }

    #[test]
    fn test_missing_file_error() {
        let err = read_volume_file(Path::new("/tmp/carpal_missing_98347.nii")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
