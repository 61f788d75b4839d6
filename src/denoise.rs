//! Edge-preserving anisotropic diffusion
//!
//! Gradient-magnitude-gated diffusion in the Perona-Malik family, used to
//! suppress noise in the cropped volume before edge-map construction while
//! keeping bone boundaries sharp. Runs a fixed number of passes with no
//! convergence check; the iteration count is the caller's detail/noise
//! trade-off knob.

use crate::volume::Volume;

/// Apply `iterations` passes of edge-preserving diffusion
///
/// Each pass updates every voxel by the conductance-weighted sum of its six
/// face-neighbor differences, with the Perona-Malik exponential conductance
/// `c(d) = exp(-(d / k)^2)`. Differences are taken in physical units so the
/// result is consistent across anisotropic spacings. Deterministic given
/// fixed inputs.
///
/// # Arguments
/// * `volume` - Input intensities
/// * `iterations` - Number of diffusion passes (0 returns a copy)
/// * `time_step` - Integration step; must be small enough for stability
///   (the pipeline default is 0.02)
/// * `conductance` - Edge threshold k; gradients well above k diffuse little
///
/// # Returns
/// The denoised volume with unchanged geometry.
pub fn denoise(volume: &Volume, iterations: usize, time_step: f64, conductance: f64) -> Volume {
    let (nx, ny, nz) = volume.dims;
    let (sx, sy, sz) = volume.spacing;
    let inv = [1.0 / sx, 1.0 / sy, 1.0 / sz];
    let k2 = conductance * conductance;

    let mut curr = volume.data.clone();
    let mut next = vec![0.0; curr.len()];

    for _ in 0..iterations {
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let idx = i + j * nx + k * nx * ny;
                    let center = curr[idx];

                    let mut flux = 0.0;

                    // Six face neighbors, clamped at the borders (zero-flux)
                    let neighbors = [
                        (i.wrapping_sub(1), j, k, 0, i > 0),
                        (i + 1, j, k, 0, i + 1 < nx),
                        (i, j.wrapping_sub(1), k, 1, j > 0),
                        (i, j + 1, k, 1, j + 1 < ny),
                        (i, j, k.wrapping_sub(1), 2, k > 0),
                        (i, j, k + 1, 2, k + 1 < nz),
                    ];

                    for &(x, y, z, axis, in_bounds) in &neighbors {
                        if !in_bounds {
                            continue;
                        }
                        let d = (curr[x + y * nx + z * nx * ny] - center) * inv[axis];
                        let c = (-(d * d) / k2).exp();
                        flux += c * d * inv[axis];
                    }

                    next[idx] = center + time_step * flux;
                }
            }
        }
        std::mem::swap(&mut curr, &mut next);
    }

    volume.with_data(curr)
}
