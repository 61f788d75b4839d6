//! 3D scalar volume with geometry metadata
//!
//! Volumes are flat `Vec<f64>` buffers in Fortran (column-major) ordering to
//! match the NIfTI convention: `index = x + y*nx + z*nx*ny`. Geometry
//! metadata (spacing, origin, per-axis direction signs) travels with the
//! buffer so that voxel and physical coordinates stay consistent across
//! derived volumes. Derived volumes always copy geometry from their source
//! rather than recomputing it.

use crate::error::SegmentationError;

/// A 3D scalar grid with geometry metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    /// Voxel intensities, Fortran order (x fastest)
    pub data: Vec<f64>,
    /// Dimensions (nx, ny, nz)
    pub dims: (usize, usize, usize),
    /// Voxel spacing in mm
    pub spacing: (f64, f64, f64),
    /// Physical position of voxel (0,0,0) in mm
    pub origin: (f64, f64, f64),
    /// Per-axis direction signs (+1 or -1); only axis-aligned
    /// orientations are supported
    pub direction: (f64, f64, f64),
}

impl Volume {
    /// Create a zero-filled volume with identity orientation at the origin
    pub fn new(dims: (usize, usize, usize), spacing: (f64, f64, f64)) -> Self {
        let (nx, ny, nz) = dims;
        Volume {
            data: vec![0.0; nx * ny * nz],
            dims,
            spacing,
            origin: (0.0, 0.0, 0.0),
            direction: (1.0, 1.0, 1.0),
        }
    }

    /// Create a zero-filled volume with the same dimensions and geometry
    /// as `self`
    pub fn zeros_like(&self) -> Self {
        Volume {
            data: vec![0.0; self.data.len()],
            dims: self.dims,
            spacing: self.spacing,
            origin: self.origin,
            direction: self.direction,
        }
    }

    /// Wrap a data buffer in the geometry of `self`
    ///
    /// Panics if `data` does not match the volume size; callers are expected
    /// to pass buffers produced from the same dimensions.
    pub fn with_data(&self, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), self.data.len(), "data length mismatch");
        Volume {
            data,
            dims: self.dims,
            spacing: self.spacing,
            origin: self.origin,
            direction: self.direction,
        }
    }

    /// Flat index for voxel (i, j, k)
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        let (nx, ny, _) = self.dims;
        i + j * nx + k * nx * ny
    }

    /// Intensity at voxel (i, j, k)
    #[inline]
    pub fn at(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[self.index(i, j, k)]
    }

    /// Physical volume of one voxel in mm^3
    pub fn voxel_volume(&self) -> f64 {
        self.spacing.0 * self.spacing.1 * self.spacing.2
    }

    /// Check that the volume geometry is usable
    ///
    /// # Errors
    /// `SegmentationError::Geometry` when any spacing component is zero or
    /// negative, or any dimension is zero.
    pub fn check_geometry(&self) -> Result<(), SegmentationError> {
        let (sx, sy, sz) = self.spacing;
        if sx <= 0.0 || sy <= 0.0 || sz <= 0.0 {
            return Err(SegmentationError::Geometry(format!(
                "degenerate spacing ({}, {}, {})",
                sx, sy, sz
            )));
        }
        let (nx, ny, nz) = self.dims;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(SegmentationError::Geometry(format!(
                "empty volume ({}, {}, {})",
                nx, ny, nz
            )));
        }
        Ok(())
    }
}

/// Convert a physical-space point to continuous voxel coordinates
///
/// When `flip_xy` is set the X and Y components of the point are negated
/// before conversion. This compensates for inputs stored in the opposite
/// in-plane orientation convention (RAS vs. LPS) to the canonical one.
///
/// # Arguments
/// * `point` - Physical-space coordinates in mm
/// * `volume` - Volume providing the geometry
/// * `flip_xy` - Negate X and Y before converting
///
/// # Returns
/// Continuous voxel coordinates (not bounds-checked)
///
/// # Errors
/// `SegmentationError::Geometry` for degenerate volume geometry.
pub fn physical_to_voxel(
    point: [f64; 3],
    volume: &Volume,
    flip_xy: bool,
) -> Result<[f64; 3], SegmentationError> {
    volume.check_geometry()?;

    let p = if flip_xy {
        [-point[0], -point[1], point[2]]
    } else {
        point
    };

    let (sx, sy, sz) = volume.spacing;
    let (ox, oy, oz) = volume.origin;
    let (dx, dy, dz) = volume.direction;

    Ok([
        (p[0] - ox) / (sx * dx),
        (p[1] - oy) / (sy * dy),
        (p[2] - oz) / (sz * dz),
    ])
}

/// Convert continuous voxel coordinates to a physical-space point
///
/// Inverse of [`physical_to_voxel`]; the same `flip_xy` flag must be used
/// for both directions of a round trip.
pub fn voxel_to_physical(
    voxel: [f64; 3],
    volume: &Volume,
    flip_xy: bool,
) -> Result<[f64; 3], SegmentationError> {
    volume.check_geometry()?;

    let (sx, sy, sz) = volume.spacing;
    let (ox, oy, oz) = volume.origin;
    let (dx, dy, dz) = volume.direction;

    let p = [
        voxel[0] * sx * dx + ox,
        voxel[1] * sy * dy + oy,
        voxel[2] * sz * dz + oz,
    ];

    if flip_xy {
        Ok([-p[0], -p[1], p[2]])
    } else {
        Ok(p)
    }
}

/// Round a continuous voxel coordinate to an index inside the volume
///
/// # Errors
/// `SegmentationError::Geometry` when the rounded coordinate falls outside
/// `[0, size)` on any axis.
pub fn round_to_voxel_index(
    voxel: [f64; 3],
    volume: &Volume,
) -> Result<[usize; 3], SegmentationError> {
    let (nx, ny, nz) = volume.dims;
    let sizes = [nx, ny, nz];
    let mut out = [0usize; 3];

    for axis in 0..3 {
        let r = voxel[axis].round();
        if r < 0.0 || r >= sizes[axis] as f64 {
            return Err(SegmentationError::Geometry(format!(
                "voxel coordinate {:?} outside volume of size {:?}",
                voxel, sizes
            )));
        }
        out[axis] = r as usize;
    }

    Ok(out)
}
