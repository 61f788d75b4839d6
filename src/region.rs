//! Region extraction around a seed point
//!
//! Cropping the level-set computation to a search window around the seed is
//! what keeps per-bone runtimes reasonable; the cropped result is later
//! reinserted ("uncropped") into full-volume coordinates. The crop clamps
//! the requested window so it never reads outside the image, and the
//! possibly smaller *applied* window is what every later geometric
//! operation on the bone must use.

use crate::volume::Volume;

/// Crop a volume to `[seed - window, seed + window)` per axis
///
/// The window is clamped per axis to the seed's offset from the volume
/// borders, so the crop is always in bounds. The seed sits at voxel
/// `applied_window` of the cropped volume (its center).
///
/// Geometry is copied from the source volume; only the origin is shifted to
/// the physical position of the crop's lower corner so that voxel/physical
/// mapping stays consistent.
///
/// # Arguments
/// * `volume` - Full input volume
/// * `seed` - Seed position in voxel indices
/// * `window` - Requested voxel half-extents per axis
///
/// # Returns
/// The cropped volume and the applied (possibly clamped) window.
pub fn crop(volume: &Volume, seed: [usize; 3], window: [usize; 3]) -> (Volume, [usize; 3]) {
    let (nx, ny, nz) = volume.dims;
    let sizes = [nx, ny, nz];

    let mut applied = window;
    for axis in 0..3 {
        if applied[axis] > seed[axis] {
            applied[axis] = seed[axis];
        }
        if applied[axis] > sizes[axis] - seed[axis] {
            applied[axis] = sizes[axis] - seed[axis];
        }
    }

    let lower = [
        seed[0] - applied[0],
        seed[1] - applied[1],
        seed[2] - applied[2],
    ];
    let cdims = (2 * applied[0], 2 * applied[1], 2 * applied[2]);

    let mut data = Vec::with_capacity(cdims.0 * cdims.1 * cdims.2);
    for k in 0..cdims.2 {
        for j in 0..cdims.1 {
            for i in 0..cdims.0 {
                data.push(volume.at(lower[0] + i, lower[1] + j, lower[2] + k));
            }
        }
    }

    let (sx, sy, sz) = volume.spacing;
    let (dx, dy, dz) = volume.direction;
    let (ox, oy, oz) = volume.origin;

    let cropped = Volume {
        data,
        dims: cdims,
        spacing: volume.spacing,
        origin: (
            ox + lower[0] as f64 * sx * dx,
            oy + lower[1] as f64 * sy * dy,
            oz + lower[2] as f64 * sz * dz,
        ),
        direction: volume.direction,
    };

    (cropped, applied)
}

/// Reinsert a cropped binary mask into full-volume coordinates
///
/// Allocates a zero mask of full-volume size and writes the cropped mask
/// into `[seed - applied_window, seed + applied_window)` per axis, clipped
/// to the full volume bounds.
///
/// # Arguments
/// * `mask` - Cropped binary mask, Fortran order
/// * `crop_dims` - Dimensions of the cropped mask
/// * `seed` - Original seed position in full-volume voxel indices
/// * `applied_window` - The window returned by [`crop`]
/// * `full_dims` - Full volume dimensions
///
/// # Returns
/// Full-size binary mask.
pub fn uncrop(
    mask: &[u8],
    crop_dims: (usize, usize, usize),
    seed: [usize; 3],
    applied_window: [usize; 3],
    full_dims: (usize, usize, usize),
) -> Vec<u8> {
    let (nx, ny, nz) = full_dims;
    let (cx, cy, cz) = crop_dims;
    let mut out = vec![0u8; nx * ny * nz];

    let lower = [
        seed[0] - applied_window[0],
        seed[1] - applied_window[1],
        seed[2] - applied_window[2],
    ];

    for k in 0..cz {
        let fk = lower[2] + k;
        if fk >= nz {
            break;
        }
        for j in 0..cy {
            let fj = lower[1] + j;
            if fj >= ny {
                break;
            }
            for i in 0..cx {
                let fi = lower[0] + i;
                if fi >= nx {
                    break;
                }
                out[fi + fj * nx + fk * nx * ny] = mask[i + j * cx + k * cx * cy];
            }
        }
    }

    out
}
