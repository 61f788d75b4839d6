//! Error types for the segmentation pipeline
//!
//! Per-bone failures are recoverable: the orchestrator records them in the
//! bone's status report and moves on to the next seed. `Cancelled` is not an
//! error in the usual sense; it short-circuits the remaining stages and the
//! partial label volume is returned to the caller.

use thiserror::Error;

/// Errors produced by the segmentation pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentationError {
    /// Volume geometry is degenerate (e.g. zero spacing) or a coordinate
    /// fell outside the volume
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Gender string was not one of Male, Female, Unknown
    #[error("unknown gender category: {0:?} (expected Male, Female or Unknown)")]
    UnknownGender(String),

    /// Feedback controller drove the iteration count below the usable floor
    #[error("iteration count {proposed} fell below the floor of {floor}")]
    IterationFloor { proposed: usize, floor: usize },

    /// Feedback controller drove the iteration count above the usable ceiling
    #[error("iteration count {proposed} exceeded the ceiling of {ceiling}")]
    IterationCeiling { proposed: usize, ceiling: usize },

    /// Cooperative cancellation was requested by the host
    #[error("cancellation requested")]
    Cancelled,

    /// Input lists are inconsistent (e.g. seed count != bone count)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// NIfTI read/write failure
    #[error("NIfTI I/O error: {0}")]
    Nifti(String),
}
