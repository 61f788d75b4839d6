//! Anatomic prior table for the eight carpal bones
//!
//! Statistical reference values (mean and standard deviation of bone volume
//! and the three principal linear extents) taken from Crisco et al., "Carpal
//! Bone Size and Scaling in Men Versus Women", J Hand Surgery 2005, tabulated
//! per bone and per gender category.
//!
//! The priors serve two purposes: deriving the plausibility acceptance
//! ranges that gate the feedback controller, and sizing the per-bone search
//! window used to crop the input volume around a seed.

use std::str::FromStr;

use crate::error::SegmentationError;

/// The eight carpal bones, in conventional listing order
///
/// The listing order fixes the output label index: `label()` is 1 for
/// Trapezium through 8 for Pisiform, 0 being background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bone {
    Trapezium,
    Trapezoid,
    Scaphoid,
    Capitate,
    Lunate,
    Hamate,
    Triquetrum,
    Pisiform,
}

/// All bones in label order
pub const ALL_BONES: [Bone; 8] = [
    Bone::Trapezium,
    Bone::Trapezoid,
    Bone::Scaphoid,
    Bone::Capitate,
    Bone::Lunate,
    Bone::Hamate,
    Bone::Triquetrum,
    Bone::Pisiform,
];

impl Bone {
    /// Label index written to the output volume (1..=8)
    pub fn label(self) -> u8 {
        match self {
            Bone::Trapezium => 1,
            Bone::Trapezoid => 2,
            Bone::Scaphoid => 3,
            Bone::Capitate => 4,
            Bone::Lunate => 5,
            Bone::Hamate => 6,
            Bone::Triquetrum => 7,
            Bone::Pisiform => 8,
        }
    }

    /// Bone name as used in prior tables and logs
    pub fn name(self) -> &'static str {
        match self {
            Bone::Trapezium => "Trapezium",
            Bone::Trapezoid => "Trapezoid",
            Bone::Scaphoid => "Scaphoid",
            Bone::Capitate => "Capitate",
            Bone::Lunate => "Lunate",
            Bone::Hamate => "Hamate",
            Bone::Triquetrum => "Triquetrum",
            Bone::Pisiform => "Pisiform",
        }
    }
}

impl FromStr for Bone {
    type Err = SegmentationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trapezium" => Ok(Bone::Trapezium),
            "trapezoid" => Ok(Bone::Trapezoid),
            "scaphoid" => Ok(Bone::Scaphoid),
            "capitate" => Ok(Bone::Capitate),
            "lunate" => Ok(Bone::Lunate),
            "hamate" => Ok(Bone::Hamate),
            "triquetrum" => Ok(Bone::Triquetrum),
            "pisiform" => Ok(Bone::Pisiform),
            other => Err(SegmentationError::InvalidInput(format!(
                "unknown bone name {:?}",
                other
            ))),
        }
    }
}

/// Patient gender category selecting the prior table variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl FromStr for Gender {
    type Err = SegmentationError;

    /// Parse a gender category, failing fast on anything unrecognized
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "unknown" => Ok(Gender::Unknown),
            other => Err(SegmentationError::UnknownGender(other.to_string())),
        }
    }
}

/// (mean, standard deviation) pair
pub type MeanStd = (f64, f64);

/// Statistical reference for one bone in one gender group
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorEntry {
    /// Bone volume in mm^3
    pub volume: MeanStd,
    /// Extent along x in mm
    pub x: MeanStd,
    /// Extent along y in mm
    pub y: MeanStd,
    /// Extent along z in mm
    pub z: MeanStd,
}

/// Acceptance ranges derived from a prior entry and a relaxation fraction
///
/// Each range is `((mean - std)*(1 - r), (mean + std)*(1 + r))`. With
/// r = 1 the lower bounds collapse to zero and the upper bounds double,
/// which the feedback controller treats as "accept everything".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceRanges {
    pub volume: (f64, f64),
    pub x: (f64, f64),
    pub y: (f64, f64),
    pub z: (f64, f64),
}

/// Look up the prior entry for a bone and gender group
///
/// Pure table lookup; the values are the Crisco 2005 measurements.
pub fn prior_for(bone: Bone, gender: Gender) -> PriorEntry {
    match gender {
        Gender::Unknown => match bone {
            Bone::Scaphoid => entry((2390.0, 673.0), (27.0, 3.1), (16.5, 1.8), (13.1, 1.2)),
            Bone::Lunate => entry((1810.0, 578.0), (19.4, 2.3), (18.5, 2.2), (13.2, 1.7)),
            Bone::Triquetrum => entry((1341.0, 331.0), (19.7, 2.0), (18.5, 2.2), (13.2, 1.7)),
            Bone::Pisiform => entry((712.0, 219.0), (14.7, 1.7), (11.5, 1.4), (9.5, 1.1)),
            Bone::Trapezium => entry((1970.0, 576.0), (23.6, 2.5), (16.6, 1.8), (14.6, 2.2)),
            Bone::Trapezoid => entry((1258.0, 321.0), (19.3, 1.8), (14.4, 1.5), (11.7, 1.0)),
            Bone::Capitate => entry((3123.0, 743.0), (26.3, 2.3), (19.5, 1.9), (15.0, 1.6)),
            Bone::Hamate => entry((2492.0, 555.0), (26.1, 2.2), (21.6, 2.0), (16.0, 1.4)),
        },
        Gender::Male => match bone {
            Bone::Scaphoid => entry((2903.0, 461.0), (29.3, 2.7), (17.8, 1.2), (14.1, 0.9)),
            Bone::Lunate => entry((2252.0, 499.0), (20.9, 2.2), (20.1, 1.8), (14.4, 1.3)),
            Bone::Triquetrum => entry((1579.0, 261.0), (20.9, 1.8), (14.9, 0.7), (12.6, 0.9)),
            Bone::Pisiform => entry((854.0, 203.0), (15.7, 1.4), (12.3, 1.3), (10.0, 1.2)),
            Bone::Trapezium => entry((2394.0, 443.0), (25.4, 1.8), (17.5, 1.8), (16.1, 1.8)),
            Bone::Trapezoid => entry((1497.0, 237.0), (20.6, 1.4), (15.5, 0.8), (12.3, 0.7)),
            Bone::Capitate => entry((3700.0, 563.0), (28.0, 1.8), (20.8, 1.7), (16.0, 1.6)),
            Bone::Hamate => entry((2940.0, 378.0), (27.5, 1.9), (23.0, 1.8), (16.9, 1.2)),
        },
        Gender::Female => match bone {
            Bone::Scaphoid => entry((1877.0, 407.0), (24.8, 1.6), (15.3, 1.5), (12.2, 0.6)),
            Bone::Lunate => entry((1368.0, 165.0), (18.0, 1.1), (16.9, 0.8), (11.9, 0.8)),
            Bone::Triquetrum => entry((1103.0, 193.0), (18.5, 1.3), (13.3, 0.6), (10.8, 0.7)),
            Bone::Pisiform => entry((569.0, 121.0), (13.7, 1.4), (10.7, 1.0), (8.9, 0.7)),
            Bone::Trapezium => entry((1547.0, 328.0), (21.8, 1.8), (15.8, 1.5), (13.1, 1.2)),
            Bone::Trapezoid => entry((1020.0, 191.0), (18.0, 0.9), (13.3, 1.2), (11.1, 0.8)),
            Bone::Capitate => entry((2547.0, 344.0), (24.6, 1.1), (18.2, 1.0), (13.9, 0.8)),
            Bone::Hamate => entry((2045.0, 264.0), (24.7, 1.4), (20.1, 0.8), (15.0, 0.9)),
        },
    }
}

fn entry(volume: MeanStd, x: MeanStd, y: MeanStd, z: MeanStd) -> PriorEntry {
    PriorEntry { volume, x, y, z }
}

fn range((mean, std): MeanStd, relaxation: f64) -> (f64, f64) {
    (
        (mean - std) * (1.0 - relaxation),
        (mean + std) * (1.0 + relaxation),
    )
}

/// Derive the plausibility acceptance ranges for a bone
///
/// # Arguments
/// * `bone`, `gender` - Prior table key
/// * `relaxation` - Fractional loosening r in [0, 1]
pub fn acceptance_ranges(bone: Bone, gender: Gender, relaxation: f64) -> AcceptanceRanges {
    let p = prior_for(bone, gender);
    AcceptanceRanges {
        volume: range(p.volume, relaxation),
        x: range(p.x, relaxation),
        y: range(p.y, relaxation),
        z: range(p.z, relaxation),
    }
}

/// Derive the voxel half-extents of the spatial search window for a bone
///
/// The upper bound of each extent range is ceiling-rounded and inflated by
/// `2 + 2r`, since the seed will generally not sit at the bone's center.
/// Each component is clamped to at least one voxel. The crop step may still
/// shrink the window to fit the image bounds; the applied window returned by
/// the crop is authoritative from then on.
pub fn search_window(bone: Bone, gender: Gender, relaxation: f64) -> [usize; 3] {
    let ranges = acceptance_ranges(bone, gender, relaxation);
    let inflate = 2.0 + 2.0 * relaxation;

    let win = |upper: f64| ((upper.ceil() * inflate).round() as usize).max(1);

    [win(ranges.x.1), win(ranges.y.1), win(ranges.z.1)]
}
