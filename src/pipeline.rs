//! Per-bone segmentation orchestrator
//!
//! Runs the full stage chain for each requested bone: seed resolution,
//! prior-sized cropping, edge-preserving denoising, edge map construction,
//! level-set evolution, plausibility feedback, optional dilation and
//! reinsertion into the shared label volume. Bones are processed
//! sequentially; a failure on one bone is recorded in its report and the
//! next bone still runs. Cooperative cancellation is polled between stages
//! and returns the partial label volume accumulated so far.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use rand::rngs::ThreadRng;

use crate::denoise::denoise;
use crate::edge::{build_edge_map, estimate_sigmoid_threshold};
use crate::error::SegmentationError;
use crate::feedback::{measure_mask, PlausibilityController, Verdict};
use crate::levelset::{evolve, initialize, to_binary_mask};
use crate::morphology::binary_dilate;
use crate::prior::{acceptance_ranges, search_window, Bone, Gender};
use crate::region::{crop, uncrop};
use crate::volume::{physical_to_voxel, round_to_voxel_index, Volume};

/// Tuning parameters for a segmentation run
#[derive(Debug, Clone)]
pub struct SegmentationConfig {
    /// Diffusion passes before edge map construction
    pub diffusion_iterations: usize,
    /// Diffusion integration step
    pub diffusion_time_step: f64,
    /// Diffusion conductance k
    pub diffusion_conductance: f64,
    /// Sigmoid threshold; 0 selects the statistical estimate per crop
    pub sigmoid_threshold: f64,
    /// Curvature (smoothing) force weight
    pub curvature_scale: f64,
    /// Propagation (expansion) force weight
    pub propagation_scale: f64,
    /// Level-set iteration budget for the first attempt per bone
    pub max_iterations: usize,
    /// Level-set RMS convergence threshold
    pub max_rms_change: f64,
    /// Prior relaxation fraction r in [0, 1]; 1 disables plausibility
    pub relaxation: f64,
    /// Dilate each accepted mask by one voxel before merging
    pub dilate_result: bool,
    /// Negate seed X and Y before voxel conversion (opposite in-plane
    /// orientation convention)
    pub flip_seed_xy: bool,
    /// Bones brighter than background instead of darker
    pub flip_sigmoid: bool,
    /// Prior table variant
    pub gender: Gender,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        SegmentationConfig {
            diffusion_iterations: 5,
            diffusion_time_step: 0.02,
            diffusion_conductance: 2.0,
            sigmoid_threshold: 0.0,
            curvature_scale: 1.0,
            propagation_scale: 4.0,
            max_iterations: 500,
            max_rms_change: 0.003,
            relaxation: 0.10,
            dilate_result: true,
            flip_seed_xy: false,
            flip_sigmoid: false,
            gender: Gender::Unknown,
        }
    }
}

/// Shared cancellation flag
///
/// Clone the token and hand one copy to the run; setting it from any thread
/// makes the run stop at the next stage boundary and return what it has.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), SegmentationError> {
        if self.is_cancelled() {
            Err(SegmentationError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything a run needs besides the input volume and seed list
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub config: SegmentationConfig,
    pub cancel: CancelToken,
}

impl RunContext {
    pub fn new(config: SegmentationConfig) -> Self {
        RunContext {
            config,
            cancel: CancelToken::new(),
        }
    }
}

/// How one bone's segmentation ended
#[derive(Debug, Clone, PartialEq)]
pub enum BoneOutcome {
    /// Mask accepted by the plausibility check (or the check was disabled)
    Segmented {
        volume_mm3: f64,
        iterations: usize,
        evaluations: usize,
    },
    /// Feedback budget or adjustment range exhausted; the last mask was
    /// kept and merged anyway so the caller can inspect it
    Implausible {
        volume_mm3: f64,
        reason: SegmentationError,
    },
    /// A stage failed before a mask was produced; nothing was merged
    Failed { error: SegmentationError },
}

/// Status report for one bone of a run
#[derive(Debug, Clone, PartialEq)]
pub struct BoneReport {
    pub bone: Bone,
    pub outcome: BoneOutcome,
}

/// Result of a segmentation run
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    /// Label volume; background 0, accepted bones at their label values.
    /// Overlapping bones sum, so a voxel claimed by two bones carries the
    /// sum of their labels.
    pub labels: Volume,
    /// One report per processed bone, in input order
    pub reports: Vec<BoneReport>,
    /// True when the run was cancelled before processing every bone
    pub cancelled: bool,
}

/// Segment the requested bones and merge them into one label volume
///
/// # Arguments
/// * `input` - Full MRI volume
/// * `bones` - Bones to segment
/// * `seeds` - One physical-space seed point per bone, same order
/// * `ctx` - Configuration and cancellation token
///
/// # Errors
/// `SegmentationError::InvalidInput` when the seed and bone counts differ
/// or the input geometry is degenerate. Per-bone failures do not error the
/// run; they are recorded in the bone's report.
pub fn segment_bones(
    input: &Volume,
    bones: &[Bone],
    seeds: &[[f64; 3]],
    ctx: &RunContext,
) -> Result<SegmentationResult, SegmentationError> {
    segment_bones_with_progress(input, bones, seeds, ctx, |_, _| {})
}

/// [`segment_bones`] with a per-bone progress callback
///
/// The callback receives the label volume accumulated so far and the bone
/// just finished, after its mask (if any) has been merged.
pub fn segment_bones_with_progress<F>(
    input: &Volume,
    bones: &[Bone],
    seeds: &[[f64; 3]],
    ctx: &RunContext,
    mut progress: F,
) -> Result<SegmentationResult, SegmentationError>
where
    F: FnMut(&Volume, Bone),
{
    if bones.len() != seeds.len() {
        return Err(SegmentationError::InvalidInput(format!(
            "{} bones but {} seeds",
            bones.len(),
            seeds.len()
        )));
    }
    input.check_geometry()?;

    let mut labels = input.zeros_like();
    let mut reports = Vec::with_capacity(bones.len());
    let mut cancelled = false;

    for (&bone, &seed) in bones.iter().zip(seeds.iter()) {
        if ctx.cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        info!("segmenting {}", bone.name());
        match segment_one(input, bone, seed, ctx) {
            Ok((mask, outcome)) => {
                merge_mask(&mut labels, &mask, bone.label());
                reports.push(BoneReport { bone, outcome });
            }
            Err(SegmentationError::Cancelled) => {
                cancelled = true;
                break;
            }
            Err(error) => {
                warn!("{} failed: {}", bone.name(), error);
                reports.push(BoneReport {
                    bone,
                    outcome: BoneOutcome::Failed { error },
                });
            }
        }
        progress(&labels, bone);
    }

    Ok(SegmentationResult {
        labels,
        reports,
        cancelled,
    })
}

/// Run the stage chain for a single bone
///
/// Returns the full-size binary mask to merge and the outcome to report.
/// `Err(Cancelled)` aborts the whole run; any other error fails only this
/// bone.
fn segment_one(
    input: &Volume,
    bone: Bone,
    seed: [f64; 3],
    ctx: &RunContext,
) -> Result<(Vec<u8>, BoneOutcome), SegmentationError> {
    let cfg = &ctx.config;

    let continuous = physical_to_voxel(seed, input, cfg.flip_seed_xy)?;
    let seed_voxel = round_to_voxel_index(continuous, input)?;

    let window = search_window(bone, cfg.gender, cfg.relaxation);
    debug!(
        "{}: seed voxel {:?}, search window {:?}",
        bone.name(),
        seed_voxel,
        window
    );
    let (cropped, applied) = crop(input, seed_voxel, window);
    cropped.check_geometry()?;

    ctx.cancel.check()?;
    let smoothed = denoise(
        &cropped,
        cfg.diffusion_iterations,
        cfg.diffusion_time_step,
        cfg.diffusion_conductance,
    );

    let threshold = if cfg.sigmoid_threshold > 0.0 {
        cfg.sigmoid_threshold
    } else {
        let t = estimate_sigmoid_threshold(&smoothed);
        info!("{}: estimated sigmoid threshold {:.2}", bone.name(), t);
        t
    };

    ctx.cancel.check()?;
    let edge_map = build_edge_map(&smoothed, threshold, cfg.flip_sigmoid);
    let phi0 = initialize(applied, edge_map.dims, edge_map.spacing);

    let ranges = acceptance_ranges(bone, cfg.gender, cfg.relaxation);
    let mut controller: PlausibilityController<ThreadRng> =
        PlausibilityController::with_rng(ranges, cfg.relaxation, rand::thread_rng());

    let mut budget = cfg.max_iterations;
    let (mask, outcome) = loop {
        ctx.cancel.check()?;
        let result = evolve(
            &phi0,
            &edge_map,
            cfg.curvature_scale,
            cfg.propagation_scale,
            budget,
            cfg.max_rms_change,
        );
        let mask = to_binary_mask(&result.phi);
        let measurement = measure_mask(&mask, edge_map.dims, edge_map.spacing);

        match controller.evaluate(&measurement, budget) {
            Verdict::Accepted => {
                break (
                    mask,
                    BoneOutcome::Segmented {
                        volume_mm3: measurement.volume_mm3,
                        iterations: result.iterations,
                        evaluations: controller.evaluations(),
                    },
                );
            }
            Verdict::Retry { iterations } => {
                info!(
                    "{}: retrying with {} iterations (attempt {})",
                    bone.name(),
                    iterations,
                    controller.evaluations()
                );
                budget = iterations;
            }
            Verdict::Exhausted { reason } => {
                warn!("{}: plausibility exhausted: {}", bone.name(), reason);
                break (
                    mask,
                    BoneOutcome::Implausible {
                        volume_mm3: measurement.volume_mm3,
                        reason,
                    },
                );
            }
        }
    };

    let (cx, cy, cz) = edge_map.dims;
    let mask = if cfg.dilate_result {
        binary_dilate(&mask, cx, cy, cz, 1)
    } else {
        mask
    };

    let full = uncrop(&mask, edge_map.dims, seed_voxel, applied, input.dims);
    Ok((full, outcome))
}

/// Additively merge a binary mask into the label volume at `label`
fn merge_mask(labels: &mut Volume, mask: &[u8], label: u8) {
    for (l, &m) in labels.data.iter_mut().zip(mask.iter()) {
        if m != 0 {
            *l += label as f64;
        }
    }
}
