//! Common test utilities for carpal-core integration tests

use carpal_core::Volume;

/// Build a synthetic wrist phantom: dark spheres (bone) on a bright
/// background, unit spacing, zero origin
///
/// With this geometry physical coordinates equal voxel coordinates, so
/// sphere centers double as seed points.
pub fn sphere_phantom(
    dims: (usize, usize, usize),
    spheres: &[([f64; 3], f64)],
) -> Volume {
    let mut vol = Volume::new(dims, (1.0, 1.0, 1.0));
    for k in 0..dims.2 {
        for j in 0..dims.1 {
            for i in 0..dims.0 {
                let inside = spheres.iter().any(|&(c, r)| {
                    let d2 = (i as f64 - c[0]).powi(2)
                        + (j as f64 - c[1]).powi(2)
                        + (k as f64 - c[2]).powi(2);
                    d2 <= r * r
                });
                let idx = vol.index(i, j, k);
                vol.data[idx] = if inside { 50.0 } else { 200.0 };
            }
        }
    }
    vol
}

/// Count voxels in a label volume carrying exactly this label value
pub fn label_count(labels: &Volume, label: u8) -> usize {
    labels
        .data
        .iter()
        .filter(|&&v| v == label as f64)
        .count()
}

/// Dice overlap between a label value in the output and a reference sphere
pub fn dice_with_sphere(labels: &Volume, label: u8, center: [f64; 3], radius: f64) -> f64 {
    let (nx, ny, nz) = labels.dims;
    let mut intersection = 0usize;
    let mut in_label = 0usize;
    let mut in_sphere = 0usize;

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let d2 = (i as f64 - center[0]).powi(2)
                    + (j as f64 - center[1]).powi(2)
                    + (k as f64 - center[2]).powi(2);
                let sphere = d2 <= radius * radius;
                let labelled = labels.at(i, j, k) == label as f64;
                if sphere {
                    in_sphere += 1;
                }
                if labelled {
                    in_label += 1;
                }
                if sphere && labelled {
                    intersection += 1;
                }
            }
        }
    }

    if in_label + in_sphere == 0 {
        return 0.0;
    }
    2.0 * intersection as f64 / (in_label + in_sphere) as f64
}
