//! Carpal-Core: knowledge-guided carpal bone segmentation
//!
//! This crate segments the eight carpal bones from a 3D wrist MRI volume
//! using seeded level-set evolution with an anatomic plausibility check.
//!
//! # Modules
//! - `error`: Pipeline error types
//! - `volume`: 3D scalar volumes and voxel/physical coordinate mapping
//! - `prior`: Carpal bone size statistics, acceptance ranges, search windows
//! - `region`: Seed-centered cropping and reinsertion
//! - `denoise`: Edge-preserving anisotropic diffusion
//! - `edge`: Sigmoid contrast transform and edge potential maps
//! - `levelset`: Signed-distance embedding and level-set evolution
//! - `feedback`: Plausibility measurement and retry controller
//! - `morphology`: Binary ball dilation
//! - `pipeline`: Per-bone orchestration, cancellation, status reports
//! - `nifti_io`: NIfTI-1 volume I/O

// Core modules
pub mod error;
pub mod volume;

// Prior knowledge
pub mod prior;

// Algorithm modules
pub mod denoise;
pub mod edge;
pub mod feedback;
pub mod levelset;
pub mod morphology;
pub mod region;

// Orchestration
pub mod pipeline;

// I/O modules
pub mod nifti_io;

pub use error::SegmentationError;
pub use pipeline::{
    segment_bones, segment_bones_with_progress, BoneOutcome, BoneReport, CancelToken,
    RunContext, SegmentationConfig, SegmentationResult,
};
pub use prior::{Bone, Gender, ALL_BONES};
pub use volume::Volume;
