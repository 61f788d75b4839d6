//! Carpal bone segmentation on a real wrist MRI NIfTI volume
//!
//! Usage: cargo run --release --example segment_wrist -- <input.nii[.gz]> <seeds.txt> <output.nii.gz> [gender]
//!
//! The seeds file holds one line per bone: `<bone name> <x> <y> <z>` with
//! physical-space coordinates in mm, e.g. `Capitate 12.5 -31.0 4.2`.

use std::path::Path;
use std::time::Instant;

use carpal_core::nifti_io::{read_volume_file, write_volume_file};
use carpal_core::pipeline::{segment_bones_with_progress, BoneOutcome, RunContext};
use carpal_core::{Bone, Gender, SegmentationConfig, SegmentationError};

fn parse_seeds(path: &Path) -> Result<(Vec<Bone>, Vec<[f64; 3]>), SegmentationError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        SegmentationError::InvalidInput(format!("failed to read '{}': {}", path.display(), e))
    })?;

    let mut bones = Vec::new();
    let mut seeds = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(SegmentationError::InvalidInput(format!(
                "seeds line {}: expected '<bone> <x> <y> <z>', got {:?}",
                lineno + 1,
                line
            )));
        }
        let bone: Bone = fields[0].parse()?;
        let mut coords = [0.0; 3];
        for (c, f) in coords.iter_mut().zip(&fields[1..]) {
            *c = f.parse().map_err(|e| {
                SegmentationError::InvalidInput(format!(
                    "seeds line {}: bad coordinate {:?}: {}",
                    lineno + 1,
                    f,
                    e
                ))
            })?;
        }
        bones.push(bone);
        seeds.push(coords);
    }

    if bones.is_empty() {
        return Err(SegmentationError::InvalidInput(
            "seeds file contains no seeds".to_string(),
        ));
    }
    Ok((bones, seeds))
}

fn main() -> Result<(), SegmentationError> {
    simple_logger::init_with_level(log::Level::Info).ok();
    let total_start = Instant::now();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "Usage: {} <input.nii[.gz]> <seeds.txt> <output.nii.gz> [gender]",
            args[0]
        );
        std::process::exit(2);
    }

    let gender: Gender = if args.len() > 4 {
        args[4].parse()?
    } else {
        Gender::Unknown
    };

    // ========================================================================
    // Load input volume and seeds
    // ========================================================================
    println!("[INFO] Loading NIfTI volume...");
    let start = Instant::now();
    let input = read_volume_file(Path::new(&args[1]))?;
    let (nx, ny, nz) = input.dims;
    let (sx, sy, sz) = input.spacing;
    println!("[INFO] Loaded in {:.2?}", start.elapsed());
    println!(
        "[INFO] Volume: {}x{}x{}, Voxel: {:.2}x{:.2}x{:.2} mm",
        nx, ny, nz, sx, sy, sz
    );

    let (bones, seeds) = parse_seeds(Path::new(&args[2]))?;
    println!("[INFO] {} seeds loaded", seeds.len());

    // ========================================================================
    // Segment
    // ========================================================================
    println!("\n[STEP 1] Segmenting {} bones...", bones.len());
    let start = Instant::now();

    let config = SegmentationConfig {
        gender,
        ..SegmentationConfig::default()
    };
    let ctx = RunContext::new(config);

    let result = segment_bones_with_progress(&input, &bones, &seeds, &ctx, |_, bone| {
        println!("[INFO]   {} done ({:.2?} elapsed)", bone.name(), start.elapsed());
    })?;
    println!("[INFO] Segmentation completed in {:.2?}", start.elapsed());

    // ========================================================================
    // Report and save
    // ========================================================================
    println!("\n[STEP 2] Per-bone results:");
    for report in &result.reports {
        match &report.outcome {
            BoneOutcome::Segmented {
                volume_mm3,
                iterations,
                evaluations,
            } => println!(
                "[INFO]   {:<11} {} mm^3 ({} iterations, {} evaluations)",
                report.bone.name(),
                volume_mm3,
                iterations,
                evaluations
            ),
            BoneOutcome::Implausible { volume_mm3, reason } => println!(
                "[WARN]   {:<11} implausible at {} mm^3: {}",
                report.bone.name(),
                volume_mm3,
                reason
            ),
            BoneOutcome::Failed { error } => {
                println!("[WARN]   {:<11} failed: {}", report.bone.name(), error)
            }
        }
    }

    let output = Path::new(&args[3]);
    write_volume_file(output, &result.labels)?;
    println!("\n[INFO] Saved label volume to {}", output.display());
    println!("[INFO] Total time: {:.2?}", total_start.elapsed());

    Ok(())
}
