//! Binary morphology on 3D masks
//!
//! Ball-structured dilation used for rasterizing the seed ball at level-set
//! initialization and for the optional dilation of the final segmentation.

/// Voxel offsets of a ball structuring element of the given radius
///
/// Includes the center offset. Radius is in voxels.
pub fn ball_offsets(radius: usize) -> Vec<(isize, isize, isize)> {
    let r = radius as isize;
    let r2 = (radius * radius) as isize;
    let mut offsets = Vec::new();
    for dz in -r..=r {
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy + dz * dz <= r2 {
                    offsets.push((dx, dy, dz));
                }
            }
        }
    }
    offsets
}

/// Dilate a binary mask with a ball structuring element
///
/// # Arguments
/// * `mask` - Input binary mask, Fortran order
/// * `nx`, `ny`, `nz` - Mask dimensions
/// * `radius` - Ball radius in voxels
///
/// # Returns
/// Dilated binary mask of the same size.
pub fn binary_dilate(
    mask: &[u8],
    nx: usize,
    ny: usize,
    nz: usize,
    radius: usize,
) -> Vec<u8> {
    let offsets = ball_offsets(radius);
    let mut out = vec![0u8; mask.len()];

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                if mask[i + j * nx + k * nx * ny] == 0 {
                    continue;
                }
                for &(dx, dy, dz) in &offsets {
                    let x = i as isize + dx;
                    let y = j as isize + dy;
                    let z = k as isize + dz;
                    if x >= 0
                        && x < nx as isize
                        && y >= 0
                        && y < ny as isize
                        && z >= 0
                        && z < nz as isize
                    {
                        out[x as usize + y as usize * nx + z as usize * nx * ny] = 1;
                    }
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ball_offsets_radius_one() {
        // Center + 6 face neighbors
        assert_eq!(ball_offsets(1).len(), 7);
    }

    #[test]
    fn test_dilate_single_voxel() {
        let mut mask = vec![0u8; 5 * 5 * 5];
        mask[2 + 2 * 5 + 2 * 25] = 1;

        let out = binary_dilate(&mask, 5, 5, 5, 1);
        let count: usize = out.iter().map(|&m| m as usize).sum();
        assert_eq!(count, 7);
        assert_eq!(out[3 + 2 * 5 + 2 * 25], 1);
        assert_eq!(out[3 + 3 * 5 + 2 * 25], 0);
    }

    #[test]
    fn test_dilate_clips_at_borders() {
        let mut mask = vec![0u8; 3 * 3 * 3];
        mask[0] = 1;

        let out = binary_dilate(&mask, 3, 3, 3, 1);
        let count: usize = out.iter().map(|&m| m as usize).sum();
        assert_eq!(count, 4);
    }
}
