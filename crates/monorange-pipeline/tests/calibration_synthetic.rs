use std::time::{Duration, Instant};

use monorange_core::synthetic::{centroid, jitter, poses_orbit, project_views};
use monorange_core::{
    BoardSpec, BrownConrady5, CameraIntrinsics, CorrespondenceView, Iso3, PinholeCamera, Pt2, Real,
};
use monorange_pipeline::{
    CalibrationArtifact, CalibrationConfig, CalibrationError, CalibrationSolver, CaptureConfig,
    CaptureMethod, CaptureOutcome, CaptureStation, CornerFinder, ImageSize, Initialization,
    NoRefinement, RejectReason,
};

const FX: Real = 1030.12;
const FY: Real = 1026.17;
const CX: Real = 327.04;
const CY: Real = 240.0;

fn board() -> BoardSpec {
    BoardSpec {
        cols: 9,
        rows: 6,
        square_size: 0.025,
    }
}

/// Board poses around the optical axis, nudged sideways so the board center
/// wanders across the image between consecutive frames.
fn poses(n: usize) -> Vec<Iso3> {
    let points = board().object_points();
    let mut poses = poses_orbit(n, centroid(&points), 0.35, 0.5);
    for (i, pose) in poses.iter_mut().enumerate() {
        pose.translation.vector.x += 0.04 * ((i % 3) as Real - 1.0);
        pose.translation.vector.y += 0.03 * (((i / 3) % 3) as Real - 1.0);
    }
    poses
}

fn camera() -> PinholeCamera {
    PinholeCamera::new(CameraIntrinsics::new(FX, FY, CX, CY)).with_distortion(BrownConrady5 {
        k1: -0.05,
        k2: 0.01,
        ..BrownConrady5::default()
    })
}

fn views(n: usize, noise: Real) -> Vec<CorrespondenceView> {
    let mut views = project_views(&camera(), &poses(n), &board().object_points()).unwrap();
    for (vi, view) in views.iter_mut().enumerate() {
        for (pi, p) in view.points_2d.iter_mut().enumerate() {
            *p += jitter(noise, 42, vi, pi);
        }
    }
    views
}

fn rel(a: Real, b: Real) -> Real {
    (a - b).abs() / b.abs()
}

#[test]
fn ten_samples_recover_focal_lengths() {
    let mut solver = CalibrationSolver::new(CalibrationConfig::default());
    for view in views(10, 0.2) {
        solver.accumulate(view).unwrap();
    }
    assert_eq!(solver.len(), 10);

    let result = solver.solve(ImageSize::new(640, 480)).unwrap();
    let k = result.intrinsics;
    assert!(rel(k.fx, FX) < 0.05, "fx = {}", k.fx);
    assert!(rel(k.fy, FY) < 0.05, "fy = {}", k.fy);
    assert!((k.cx - CX).abs() < 15.0, "cx = {}", k.cx);
    assert!((k.cy - CY).abs() < 15.0, "cy = {}", k.cy);
    assert_eq!(k.skew, 0.0);
    assert!(result.rms_error < 0.5, "rms = {}", result.rms_error);
    assert_eq!(result.sample_count, 10);
    assert_eq!(result.initialization, Initialization::ClosedForm);
    assert!(result.distortion.is_some());
}

#[test]
fn pinhole_only_solve_leaves_distortion_empty() {
    let config = CalibrationConfig {
        estimate_distortion: false,
        ..CalibrationConfig::default()
    };
    let mut solver = CalibrationSolver::new(config);
    let noiseless = project_views(
        &PinholeCamera::new(CameraIntrinsics::new(FX, FY, CX, CY)),
        &poses(10),
        &board().object_points(),
    )
    .unwrap();
    for view in noiseless {
        solver.accumulate(view).unwrap();
    }
    let result = solver.solve(ImageSize::new(640, 480)).unwrap();
    assert!(result.distortion.is_none());
    assert!(rel(result.intrinsics.fx, FX) < 1e-3, "fx = {}", result.intrinsics.fx);
    assert!(result.rms_error < 1e-3, "rms = {}", result.rms_error);

    let artifact = CalibrationArtifact::from(&result);
    assert_eq!(artifact.distortion, [0.0; 5]);
    assert_eq!(artifact.sample_count, 10);
    assert_eq!(artifact.camera_matrix[2], [0.0, 0.0, 1.0]);
}

#[test]
fn nine_samples_are_not_enough() {
    let mut solver = CalibrationSolver::default();
    for view in views(9, 0.2) {
        solver.accumulate(view).unwrap();
    }
    match solver.solve(ImageSize::new(640, 480)) {
        Err(CalibrationError::InsufficientSamples {
            required,
            available,
        }) => {
            assert_eq!(required, 10);
            assert_eq!(available, 9);
        }
        other => panic!("expected InsufficientSamples, got {other:?}"),
    }
}

#[test]
fn zero_image_size_is_rejected() {
    let mut solver = CalibrationSolver::default();
    for view in views(10, 0.0) {
        solver.accumulate(view).unwrap();
    }
    assert!(matches!(
        solver.solve(ImageSize::new(0, 480)),
        Err(CalibrationError::InvalidImageSize { .. })
    ));
}

/// Replayed "images" are the detected corners themselves.
struct ReplayedCorners;

impl CornerFinder<Option<Vec<Pt2>>> for ReplayedCorners {
    fn find_corners(&mut self, image: &Option<Vec<Pt2>>, _board: &BoardSpec) -> Option<Vec<Pt2>> {
        image.clone()
    }
}

#[test]
fn captured_samples_feed_the_solver() {
    let mut station = CaptureStation::new(
        board(),
        ReplayedCorners,
        NoRefinement,
        CaptureConfig::default(),
    );
    let mut solver = CalibrationSolver::default();

    let t0 = Instant::now();
    let frames = views(10, 0.2);

    // A repeated frame right after the first capture is not kept.
    let first = Some(frames[0].points_2d.clone());
    for (offset_ms, expected) in [(0, None), (200, Some(RejectReason::NotMoved))] {
        let now = t0 + Duration::from_millis(offset_ms);
        let outcome = station
            .process(&first, 640, 480, now, CaptureMethod::Auto)
            .unwrap();
        match (outcome, expected) {
            (CaptureOutcome::Accepted(sample), None) => solver.accumulate(sample.view).unwrap(),
            (CaptureOutcome::Rejected(reason), Some(want)) => assert_eq!(reason, want),
            (outcome, _) => panic!("unexpected outcome at {offset_ms} ms: {outcome:?}"),
        }
    }

    let none: Option<Vec<Pt2>> = None;
    let outcome = station
        .process(&none, 640, 480, t0 + Duration::from_millis(400), CaptureMethod::Auto)
        .unwrap();
    assert_eq!(outcome, CaptureOutcome::Rejected(RejectReason::BoardNotFound));

    for (i, view) in frames.iter().enumerate().skip(1) {
        let now = t0 + Duration::from_millis(1500 * i as u64);
        let image = Some(view.points_2d.clone());
        match station.process(&image, 640, 480, now, CaptureMethod::Auto).unwrap() {
            CaptureOutcome::Accepted(sample) => {
                assert_eq!(sample.index, i);
                solver.accumulate(sample.view).unwrap();
            }
            CaptureOutcome::Rejected(reason) => panic!("frame {i} rejected: {reason:?}"),
        }
    }

    assert_eq!(station.gatekeeper().saved_count(), 10);
    let result = solver.solve(ImageSize::new(640, 480)).unwrap();
    assert!(rel(result.intrinsics.fx, FX) < 0.05, "fx = {}", result.intrinsics.fx);
}
