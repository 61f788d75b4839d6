//! End-to-end segmentation tests on synthetic wrist phantoms

mod common;

use carpal_core::pipeline::{
    segment_bones, segment_bones_with_progress, BoneOutcome, RunContext, SegmentationConfig,
};
use carpal_core::{nifti_io, Bone, ALL_BONES};
use common::{dice_with_sphere, label_count, sphere_phantom};

/// Settings that keep synthetic runs fast: no denoising (the phantoms are
/// noise free), fixed sigmoid threshold between the two intensity levels
fn phantom_config() -> SegmentationConfig {
    SegmentationConfig {
        diffusion_iterations: 0,
        sigmoid_threshold: 120.0,
        max_iterations: 150,
        dilate_result: false,
        relaxation: 1.0,
        ..SegmentationConfig::default()
    }
}

#[test]
fn test_pisiform_sphere_passes_plausibility() {
    // A radius-7 sphere segments to roughly 900 mm^3, inside the Pisiform
    // acceptance range at 20% relaxation (394 to 1117 mm^3)
    let center = [22.0, 22.0, 22.0];
    let vol = sphere_phantom((44, 44, 44), &[(center, 7.0)]);

    let config = SegmentationConfig {
        relaxation: 0.20,
        ..phantom_config()
    };
    let ctx = RunContext::new(config);

    let result = segment_bones(&vol, &[Bone::Pisiform], &[center], &ctx).unwrap();

    assert!(!result.cancelled);
    match &result.reports[0].outcome {
        BoneOutcome::Segmented {
            volume_mm3,
            evaluations,
            ..
        } => {
            assert!(
                *volume_mm3 > 394.4 && *volume_mm3 < 1117.2,
                "accepted volume {} outside the Pisiform range",
                volume_mm3
            );
            assert!(*evaluations >= 1);
        }
        other => panic!("expected acceptance, got {:?}", other),
    }

    // The segmentation tracks the phantom sphere closely
    let dice = dice_with_sphere(&result.labels, Bone::Pisiform.label(), center, 7.0);
    assert!(dice > 0.7, "poor overlap with phantom: dice = {}", dice);
}

#[test]
fn test_two_bones_disjoint_with_dilation() {
    let a = [16.0, 16.0, 16.0];
    let b = [48.0, 16.0, 16.0];
    let vol = sphere_phantom((64, 32, 32), &[(a, 5.0), (b, 5.0)]);

    let config = SegmentationConfig {
        dilate_result: true,
        ..phantom_config()
    };
    let ctx = RunContext::new(config);

    let result = segment_bones(&vol, &[Bone::Scaphoid, Bone::Triquetrum], &[a, b], &ctx).unwrap();

    // Even dilated, the two bones are far enough apart that no voxel
    // carries a summed label
    for &v in &result.labels.data {
        assert!(
            v == 0.0 || v == 3.0 || v == 7.0,
            "unexpected label value {}",
            v
        );
    }
    assert!(label_count(&result.labels, 3) > 0);
    assert!(label_count(&result.labels, 7) > 0);
}

#[test]
fn test_overlapping_bones_sum_labels() {
    // All eight bones seeded on the same sphere: every segmented voxel
    // carries the sum of all labels (1 + 2 + ... + 8 = 36)
    let center = [15.0, 15.0, 15.0];
    let vol = sphere_phantom((30, 30, 30), &[(center, 5.0)]);

    let config = SegmentationConfig {
        max_iterations: 60,
        ..phantom_config()
    };
    let ctx = RunContext::new(config);

    let seeds = [center; 8];
    let result = segment_bones(&vol, &ALL_BONES, &seeds, &ctx).unwrap();

    assert_eq!(result.reports.len(), 8);
    for report in &result.reports {
        assert!(
            matches!(report.outcome, BoneOutcome::Segmented { .. }),
            "{:?} did not segment",
            report.bone
        );
    }
    assert_eq!(result.labels.at(15, 15, 15), 36.0);
}

#[test]
fn test_undersized_bone_reports_implausible_but_merges() {
    // A radius-3 sphere is far below the Capitate acceptance range; the
    // feedback loop exhausts and the last mask is still merged
    let center = [10.0, 10.0, 10.0];
    let vol = sphere_phantom((20, 20, 20), &[(center, 3.0)]);

    let config = SegmentationConfig {
        relaxation: 0.10,
        max_iterations: 40,
        ..phantom_config()
    };
    let ctx = RunContext::new(config);

    let result = segment_bones(&vol, &[Bone::Capitate], &[center], &ctx).unwrap();

    match &result.reports[0].outcome {
        BoneOutcome::Implausible { volume_mm3, .. } => {
            assert!(*volume_mm3 < 2142.0);
        }
        other => panic!("expected implausible outcome, got {:?}", other),
    }
    assert!(label_count(&result.labels, Bone::Capitate.label()) > 0);
}

#[test]
fn test_cancel_between_bones_keeps_partial_result() {
    let center = [15.0, 15.0, 15.0];
    let vol = sphere_phantom((30, 30, 30), &[(center, 5.0)]);

    let config = SegmentationConfig {
        max_iterations: 60,
        ..phantom_config()
    };
    let ctx = RunContext::new(config);
    let cancel = ctx.cancel.clone();

    let result = segment_bones_with_progress(
        &vol,
        &[Bone::Lunate, Bone::Hamate, Bone::Capitate],
        &[center, center, center],
        &ctx,
        |_, _| cancel.cancel(),
    )
    .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.reports.len(), 1);
    assert_eq!(result.reports[0].bone, Bone::Lunate);
    assert!(label_count(&result.labels, Bone::Lunate.label()) > 0);
}

#[test]
fn test_label_volume_survives_nifti_round_trip() {
    let center = [15.0, 15.0, 15.0];
    let vol = sphere_phantom((30, 30, 30), &[(center, 5.0)]);

    let config = SegmentationConfig {
        max_iterations: 60,
        ..phantom_config()
    };
    let ctx = RunContext::new(config);
    let result = segment_bones(&vol, &[Bone::Trapezium], &[center], &ctx).unwrap();

    let path = std::env::temp_dir().join("carpal_labels_rt.nii.gz");
    nifti_io::write_volume_file(&path, &result.labels).unwrap();
    let loaded = nifti_io::read_volume_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.dims, result.labels.dims);
    // Labels are small integers, exact through float32 storage
    assert_eq!(loaded.data, result.labels.data);
}
