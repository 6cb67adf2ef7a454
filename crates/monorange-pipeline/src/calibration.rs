use log::{debug, info, warn};
use monorange_core::{BrownConrady5, CameraIntrinsics, CorrespondenceView, Iso3, PinholeCamera, Real};
use monorange_linear::{
    dlt_homography, estimate_intrinsics_from_homographies, estimate_planar_pose_from_h,
    HomographyError, PoseError,
};
use monorange_optim::{
    refine_planar_intrinsics, LmBackend, PlanarIntrinsicsProblem, ProblemError, RobustKernel,
    SolveOptions, SolveReport,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Samples required before a solve is attempted.
pub const DEFAULT_MIN_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> Real {
        self.width as Real * self.height as Real
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub min_samples: usize,
    /// Fit Brown–Conrady k1, k2, p1, p2, k3 alongside the intrinsics.
    pub estimate_distortion: bool,
    pub robust_kernel: RobustKernel,
    pub solve: SolveOptions,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_samples: DEFAULT_MIN_SAMPLES,
            estimate_distortion: true,
            robust_kernel: RobustKernel::None,
            solve: SolveOptions::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("need at least {required} accepted samples, have {available}")]
    InsufficientSamples { required: usize, available: usize },
    #[error("sample rejected: {0}")]
    InvalidSample(String),
    #[error("image size must be non-zero, got {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
    #[error("homography for sample {sample} failed")]
    Homography {
        sample: usize,
        #[source]
        source: HomographyError,
    },
    #[error("pose initialisation for sample {sample} failed")]
    Pose {
        sample: usize,
        #[source]
        source: PoseError,
    },
    #[error(transparent)]
    Problem(#[from] ProblemError),
}

/// How the intrinsics fed to the refinement were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initialization {
    ClosedForm,
    ImageCenterFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Option<BrownConrady5>,
    /// RMS reprojection error in pixels. Reported, never thresholded here.
    pub rms_error: Real,
    pub sample_count: usize,
    pub image_size: ImageSize,
    pub initialization: Initialization,
    pub report: SolveReport,
}

/// Accumulates accepted checkerboard samples and solves for intrinsics.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSolver {
    config: CalibrationConfig,
    samples: Vec<CorrespondenceView>,
}

impl CalibrationSolver {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            samples: Vec::new(),
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Append a sample to the buffer.
    ///
    /// Samples with fewer than 4 points, mismatched 3D/2D counts, non-finite
    /// coordinates or non-planar board points are refused and leave the buffer unchanged.
    pub fn accumulate(&mut self, sample: CorrespondenceView) -> Result<(), CalibrationError> {
        if sample.points_3d.len() != sample.points_2d.len() {
            return Err(CalibrationError::InvalidSample(format!(
                "3D / 2D point counts differ: {} vs {}",
                sample.points_3d.len(),
                sample.points_2d.len()
            )));
        }
        if sample.len() < 4 {
            return Err(CalibrationError::InvalidSample(format!(
                "{} points, need at least 4",
                sample.len()
            )));
        }
        if sample
            .points_3d
            .iter()
            .any(|p| !p.x.is_finite() || !p.y.is_finite() || !p.z.is_finite())
        {
            return Err(CalibrationError::InvalidSample(
                "board points must be finite".into(),
            ));
        }
        if sample.points_3d.iter().any(|p| p.z.abs() > 1e-9) {
            return Err(CalibrationError::InvalidSample(
                "board points must lie on z = 0".into(),
            ));
        }
        if sample
            .points_2d
            .iter()
            .any(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(CalibrationError::InvalidSample(
                "image points must be finite".into(),
            ));
        }
        self.samples.push(sample);
        debug!("accumulated sample #{}", self.samples.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Solve for intrinsics, consuming the accumulated samples.
    pub fn solve(self, image_size: ImageSize) -> Result<CalibrationResult, CalibrationError> {
        let required = self.config.min_samples.max(1);
        if self.samples.len() < required {
            return Err(CalibrationError::InsufficientSamples {
                required,
                available: self.samples.len(),
            });
        }
        if image_size.width == 0 || image_size.height == 0 {
            return Err(CalibrationError::InvalidImageSize {
                width: image_size.width,
                height: image_size.height,
            });
        }

        let homographies = self
            .samples
            .iter()
            .enumerate()
            .map(|(sample, view)| {
                dlt_homography(&view.planar_points(), &view.points_2d)
                    .map_err(|source| CalibrationError::Homography { sample, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (intrinsics0, initialization) = initial_intrinsics(&homographies, image_size);
        let kmtx = intrinsics0.k_matrix();
        let poses0 = homographies
            .iter()
            .enumerate()
            .map(|(sample, h)| {
                estimate_planar_pose_from_h(&kmtx, h)
                    .map_err(|source| CalibrationError::Pose { sample, source })
            })
            .collect::<Result<Vec<Iso3>, _>>()?;

        let sample_count = self.samples.len();
        let CalibrationSolver { config, samples } = self;
        let backend = LmBackend;

        // Intrinsics and poses first; distortion only once the pinhole part
        // has settled.
        let pinhole = PlanarIntrinsicsProblem::new(samples)?
            .with_distortion(false)
            .with_kernel(config.robust_kernel);
        let stage1 = refine_planar_intrinsics(
            &backend,
            &pinhole,
            &PinholeCamera::new(intrinsics0),
            &poses0,
            &config.solve,
        )?;
        debug!(
            "pinhole stage: {:?}, rms {:.4} px",
            stage1.camera.intrinsics, stage1.rms_error
        );

        let refined = if config.estimate_distortion {
            let full = pinhole.with_distortion(true);
            let camera0 = stage1.camera.with_distortion(BrownConrady5::default());
            refine_planar_intrinsics(&backend, &full, &camera0, &stage1.poses, &config.solve)?
        } else {
            stage1
        };

        info!(
            "calibrated from {} samples: fx={:.3} fy={:.3} cx={:.3} cy={:.3}, rms {:.4} px",
            sample_count,
            refined.camera.intrinsics.fx,
            refined.camera.intrinsics.fy,
            refined.camera.intrinsics.cx,
            refined.camera.intrinsics.cy,
            refined.rms_error
        );

        Ok(CalibrationResult {
            intrinsics: refined.camera.intrinsics,
            distortion: refined.camera.distortion,
            rms_error: refined.rms_error,
            sample_count,
            image_size,
            initialization,
            report: refined.report,
        })
    }
}

fn initial_intrinsics(
    homographies: &[monorange_core::Mat3],
    image_size: ImageSize,
) -> (CameraIntrinsics, Initialization) {
    let w = image_size.width as Real;
    let h = image_size.height as Real;
    match estimate_intrinsics_from_homographies(homographies) {
        Ok(k) if plausible(&k, w, h) => {
            (CameraIntrinsics::new(k.fx, k.fy, k.cx, k.cy), Initialization::ClosedForm)
        }
        other => {
            warn!("closed-form intrinsics unusable ({other:?}), starting from image center");
            let f = w.max(h);
            (
                CameraIntrinsics::new(f, f, 0.5 * w, 0.5 * h),
                Initialization::ImageCenterFallback,
            )
        }
    }
}

/// Positive focal lengths and a principal point inside the image.
fn plausible(k: &CameraIntrinsics, w: Real, h: Real) -> bool {
    k.fx.is_finite()
        && k.fy.is_finite()
        && k.fx > 0.0
        && k.fy > 0.0
        && (0.0..=w).contains(&k.cx)
        && (0.0..=h).contains(&k.cy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monorange_core::{Pt2, Pt3};

    fn square_view() -> CorrespondenceView {
        let pts3 = vec![
            Pt3::new(0.0, 0.0, 0.0),
            Pt3::new(1.0, 0.0, 0.0),
            Pt3::new(1.0, 1.0, 0.0),
            Pt3::new(0.0, 1.0, 0.0),
        ];
        let pts2 = vec![
            Pt2::new(10.0, 10.0),
            Pt2::new(20.0, 10.0),
            Pt2::new(20.0, 20.0),
            Pt2::new(10.0, 20.0),
        ];
        CorrespondenceView::new(pts3, pts2).unwrap()
    }

    #[test]
    fn too_few_samples_is_insufficient() {
        let mut solver = CalibrationSolver::default();
        for _ in 0..9 {
            solver.accumulate(square_view()).unwrap();
        }
        let err = solver.solve(ImageSize::new(640, 480)).unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::InsufficientSamples {
                required: 10,
                available: 9
            }
        ));
    }

    #[test]
    fn empty_solver_is_insufficient() {
        let err = CalibrationSolver::default()
            .solve(ImageSize::new(640, 480))
            .unwrap_err();
        assert!(matches!(err, CalibrationError::InsufficientSamples { available: 0, .. }));
    }

    #[test]
    fn malformed_samples_are_refused() {
        let mut solver = CalibrationSolver::default();

        let mut short = square_view();
        short.points_2d.pop();
        assert!(matches!(
            solver.accumulate(short),
            Err(CalibrationError::InvalidSample(_))
        ));

        let mut lifted = square_view();
        lifted.points_3d[0].z = 0.5;
        assert!(solver.accumulate(lifted).is_err());

        let mut nan = square_view();
        nan.points_2d[1].x = Real::NAN;
        assert!(solver.accumulate(nan).is_err());

        let mut nan_board = square_view();
        nan_board.points_3d[2].x = Real::NAN;
        assert!(solver.accumulate(nan_board).is_err());

        let mut nan_depth = square_view();
        nan_depth.points_3d[1].z = Real::NAN;
        assert!(matches!(
            solver.accumulate(nan_depth),
            Err(CalibrationError::InvalidSample(_))
        ));

        assert!(solver.is_empty());
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg: CalibrationConfig = serde_json::from_str(r#"{"estimate_distortion": false}"#).unwrap();
        assert_eq!(cfg.min_samples, 10);
        assert!(!cfg.estimate_distortion);
        assert_eq!(cfg.robust_kernel, RobustKernel::None);
    }
}
