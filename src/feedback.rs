//! Plausibility feedback controller
//!
//! After the level set converges, the mask is measured against the anatomic
//! prior: bounding-box extents (for diagnostics) and physical volume (the
//! acceptance gate). An implausible volume triggers a retry with a jittered
//! iteration count - fewer iterations when the segmentation leaked and grew
//! too large, more when it stalled too small - reusing the same edge map and
//! initial embedding. The retry loop is bounded by hard iteration limits
//! and an overall retry budget.

use log::{debug, info};
use rand::Rng;

use crate::error::SegmentationError;
use crate::prior::AcceptanceRanges;

/// Iteration floor below which a shrinking retry gives up
pub const MIN_ITERATIONS: usize = 10;

/// Iteration ceiling above which a growing retry gives up
pub const MAX_ITERATIONS: usize = 3000;

/// Maximum number of plausibility evaluations per bone; exhaustion is
/// reported rather than looping indefinitely
pub const MAX_EVALUATIONS: usize = 20;

/// Uniform jitter range for the too-large branch (fraction removed)
const SHRINK_JITTER: (f64, f64) = (0.10, 0.60);

/// Uniform jitter range for the too-small branch (fraction added)
const GROW_JITTER: (f64, f64) = (0.20, 0.70);

/// Physical measurements of a segmentation mask
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskMeasurement {
    /// Voxel count times voxel volume, rounded to the nearest mm^3
    pub volume_mm3: f64,
    /// Bounding-box extents in mm (x, y, z), rounded to 0.1 mm
    pub extent_mm: [f64; 3],
}

/// Measure a binary mask's volume and bounding-box extents
///
/// An empty mask measures as zero on every axis, which the controller
/// classifies as too small.
pub fn measure_mask(
    mask: &[u8],
    dims: (usize, usize, usize),
    spacing: (f64, f64, f64),
) -> MaskMeasurement {
    let (nx, ny, nz) = dims;
    let mut count = 0usize;
    let mut min = [usize::MAX; 3];
    let mut max = [0usize; 3];

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                if mask[i + j * nx + k * nx * ny] == 0 {
                    continue;
                }
                count += 1;
                let pos = [i, j, k];
                for axis in 0..3 {
                    min[axis] = min[axis].min(pos[axis]);
                    max[axis] = max[axis].max(pos[axis]);
                }
            }
        }
    }

    if count == 0 {
        return MaskMeasurement {
            volume_mm3: 0.0,
            extent_mm: [0.0; 3],
        };
    }

    let sp = [spacing.0, spacing.1, spacing.2];
    let mut extent = [0.0; 3];
    for axis in 0..3 {
        let e = (max[axis] - min[axis]) as f64 * sp[axis];
        extent[axis] = (e * 10.0).round() / 10.0;
    }

    MaskMeasurement {
        volume_mm3: (count as f64 * spacing.0 * spacing.1 * spacing.2).round(),
        extent_mm: extent,
    }
}

/// Controller decision after one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Mask volume is within the acceptance range
    Accepted,
    /// Mask is implausible; re-run evolution with this iteration count
    Retry { iterations: usize },
    /// Adjustment range or retry budget exhausted; keep the current mask
    Exhausted { reason: SegmentationError },
}

/// Plausibility feedback controller for one bone
///
/// Holds the acceptance ranges, the relaxation shortcut and the retry
/// budget. Generic over the random source so tests can seed a `StdRng`
/// for deterministic jitter.
#[derive(Debug)]
pub struct PlausibilityController<R: Rng> {
    ranges: AcceptanceRanges,
    relaxation: f64,
    rng: R,
    evaluations: usize,
}

impl<R: Rng> PlausibilityController<R> {
    /// Create a controller with an explicit random source
    pub fn with_rng(ranges: AcceptanceRanges, relaxation: f64, rng: R) -> Self {
        PlausibilityController {
            ranges,
            relaxation,
            rng,
            evaluations: 0,
        }
    }

    /// Number of evaluations performed so far
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Evaluate a mask measurement and decide how to proceed
    ///
    /// Only the volume range gates acceptance; the extent checks are
    /// evaluated and logged for diagnostics but do not block. Relaxation
    /// of 1.0 disables the check entirely.
    ///
    /// # Arguments
    /// * `measurement` - Current mask measurements
    /// * `current_iterations` - Iteration count used for the current mask
    pub fn evaluate(
        &mut self,
        measurement: &MaskMeasurement,
        current_iterations: usize,
    ) -> Verdict {
        if self.relaxation >= 1.0 {
            return Verdict::Accepted;
        }

        self.evaluations += 1;

        let (lower_vol, upper_vol) = self.ranges.volume;
        let vol = measurement.volume_mm3;

        self.log_extent_diagnostics(measurement);

        if vol > lower_vol && vol < upper_vol {
            info!(
                "plausibility passed: volume {} mm^3 in ({:.0}, {:.0})",
                vol, lower_vol, upper_vol
            );
            return Verdict::Accepted;
        }

        info!(
            "plausibility failed: volume {} mm^3, expected ({:.0}, {:.0})",
            vol, lower_vol, upper_vol
        );

        if self.evaluations >= MAX_EVALUATIONS {
            return Verdict::Exhausted {
                reason: SegmentationError::InvalidInput(format!(
                    "plausibility retry budget of {} exhausted",
                    MAX_EVALUATIONS
                )),
            };
        }

        if vol >= upper_vol {
            // Leaked into the background: retry with fewer iterations
            let u = self.rng.gen_range(SHRINK_JITTER.0..SHRINK_JITTER.1);
            let proposed = (current_iterations as f64 * (1.0 - u)).round() as usize;
            debug!(
                "too large: reducing iterations {} -> {}",
                current_iterations, proposed
            );
            if proposed < MIN_ITERATIONS {
                return Verdict::Exhausted {
                    reason: SegmentationError::IterationFloor {
                        proposed,
                        floor: MIN_ITERATIONS,
                    },
                };
            }
            Verdict::Retry {
                iterations: proposed,
            }
        } else {
            // Undersegmented: retry with more iterations
            let u = self.rng.gen_range(GROW_JITTER.0..GROW_JITTER.1);
            let proposed = (current_iterations as f64 * (1.0 + u)).round() as usize;
            debug!(
                "too small: increasing iterations {} -> {}",
                current_iterations, proposed
            );
            if proposed > MAX_ITERATIONS {
                return Verdict::Exhausted {
                    reason: SegmentationError::IterationCeiling {
                        proposed,
                        ceiling: MAX_ITERATIONS,
                    },
                };
            }
            Verdict::Retry {
                iterations: proposed,
            }
        }
    }

    fn log_extent_diagnostics(&self, m: &MaskMeasurement) {
        let checks = [
            ("x", m.extent_mm[0], self.ranges.x),
            ("y", m.extent_mm[1], self.ranges.y),
            ("z", m.extent_mm[2], self.ranges.z),
        ];
        for (axis, extent, (lower, upper)) in checks {
            if extent > lower && extent < upper {
                debug!("{}-extent {:.1} mm within ({:.1}, {:.1})", axis, extent, lower, upper);
            } else {
                debug!(
                    "{}-extent {:.1} mm outside ({:.1}, {:.1})",
                    axis, extent, lower, upper
                );
            }
        }
    }
}
