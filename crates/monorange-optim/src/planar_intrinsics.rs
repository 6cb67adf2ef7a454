//! Reprojection-error refinement of planar intrinsics and per-view poses.
//!
//! Parameter layout:
//!
//! ```text
//! [fx, fy, cx, cy, (k1, k2, p1, p2, k3)?, (rx, ry, rz, tx, ty, tz) * n_views]
//! ```
//!
//! Rotations are axis-angle vectors. Skew is fixed at zero, as OpenCV does
//! by default.

use crate::{NllsProblem, NllsSolverBackend, RobustKernel, SolveOptions, SolveReport};
use log::{debug, warn};
use monorange_core::{
    BrownConrady5, CameraIntrinsics, CorrespondenceView, Iso3, PinholeCamera, Real,
};
use nalgebra::{DMatrix, DVector, Translation3, UnitQuaternion, Vector3};
use thiserror::Error;

/// Residual assigned to a point that falls behind the camera.
const BEHIND_CAMERA_PENALTY: Real = 1e3;

#[derive(Debug, Error, PartialEq)]
pub enum ProblemError {
    #[error("need at least one view for calibration")]
    NoViews,
    #[error("view {view} has {points} points, need at least 4")]
    TooFewPoints { view: usize, points: usize },
    #[error("initial guess has {got} poses for {expected} views")]
    PoseCountMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsProblem {
    views: Vec<CorrespondenceView>,
    estimate_distortion: bool,
    kernel: RobustKernel,
}

impl PlanarIntrinsicsProblem {
    pub fn new(views: Vec<CorrespondenceView>) -> Result<Self, ProblemError> {
        if views.is_empty() {
            return Err(ProblemError::NoViews);
        }
        if let Some((view, v)) = views.iter().enumerate().find(|(_, v)| v.len() < 4) {
            return Err(ProblemError::TooFewPoints {
                view,
                points: v.len(),
            });
        }
        Ok(Self {
            views,
            estimate_distortion: true,
            kernel: RobustKernel::None,
        })
    }

    pub fn with_distortion(mut self, estimate: bool) -> Self {
        self.estimate_distortion = estimate;
        self
    }

    pub fn with_kernel(mut self, kernel: RobustKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn views(&self) -> &[CorrespondenceView] {
        &self.views
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    pub fn num_points(&self) -> usize {
        self.views.iter().map(CorrespondenceView::len).sum()
    }

    fn intrinsics_dim(&self) -> usize {
        if self.estimate_distortion {
            9
        } else {
            4
        }
    }

    /// Pack a camera and per-view poses into a parameter vector.
    pub fn pack(&self, camera: &PinholeCamera, poses: &[Iso3]) -> Result<DVector<Real>, ProblemError> {
        if poses.len() != self.num_views() {
            return Err(ProblemError::PoseCountMismatch {
                expected: self.num_views(),
                got: poses.len(),
            });
        }
        let mut x = DVector::zeros(self.num_params());
        let k = &camera.intrinsics;
        x[0] = k.fx;
        x[1] = k.fy;
        x[2] = k.cx;
        x[3] = k.cy;
        if self.estimate_distortion {
            let d = camera.distortion.unwrap_or_default().to_array();
            x.rows_mut(4, 5).copy_from_slice(&d);
        }

        let base = self.intrinsics_dim();
        for (i, pose) in poses.iter().enumerate() {
            let idx = base + 6 * i;
            let w = pose.rotation.scaled_axis();
            let t = pose.translation.vector;
            x.rows_mut(idx, 6)
                .copy_from_slice(&[w.x, w.y, w.z, t.x, t.y, t.z]);
        }
        Ok(x)
    }

    /// Decode a parameter vector into a camera and per-view poses.
    pub fn decode(&self, x: &DVector<Real>) -> (PinholeCamera, Vec<Iso3>) {
        debug_assert_eq!(x.len(), self.num_params());
        let intrinsics = CameraIntrinsics::new(x[0], x[1], x[2], x[3]);
        let distortion = self
            .estimate_distortion
            .then(|| BrownConrady5::from_array([x[4], x[5], x[6], x[7], x[8]]));
        let camera = PinholeCamera {
            intrinsics,
            distortion,
        };

        let base = self.intrinsics_dim();
        let poses = (0..self.num_views())
            .map(|i| {
                let idx = base + 6 * i;
                let rot = UnitQuaternion::from_scaled_axis(Vector3::new(x[idx], x[idx + 1], x[idx + 2]));
                let trans = Translation3::new(x[idx + 3], x[idx + 4], x[idx + 5]);
                Iso3::from_parts(trans, rot)
            })
            .collect();

        (camera, poses)
    }

    /// Root-mean-square reprojection error in pixels over all points.
    ///
    /// Matches OpenCV's definition: `sqrt(sum |e_i|^2 / n_points)`.
    pub fn rms_error(&self, camera: &PinholeCamera, poses: &[Iso3]) -> Real {
        let sq: Real = self
            .views
            .iter()
            .zip(poses)
            .flat_map(|(view, pose)| {
                view.points_3d
                    .iter()
                    .zip(&view.points_2d)
                    .map(move |(pw, meas)| match camera.project(&pose.transform_point(pw)) {
                        Some(uv) => (meas.x - uv.x).powi(2) + (meas.y - uv.y).powi(2),
                        None => 2.0 * BEHIND_CAMERA_PENALTY * BEHIND_CAMERA_PENALTY,
                    })
            })
            .sum();
        (sq / self.num_points().max(1) as Real).sqrt()
    }
}

impl NllsProblem for PlanarIntrinsicsProblem {
    fn num_params(&self) -> usize {
        self.intrinsics_dim() + 6 * self.num_views()
    }

    fn num_residuals(&self) -> usize {
        2 * self.num_points()
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        let (camera, poses) = self.decode(x);

        let mut r = DVector::zeros(self.num_residuals());
        let mut offset = 0;
        for (view, pose) in self.views.iter().zip(&poses) {
            for (pw, meas) in view.points_3d.iter().zip(&view.points_2d) {
                let (rx, ry) = match camera.project(&pose.transform_point(pw)) {
                    Some(uv) => (meas.x - uv.x, meas.y - uv.y),
                    None => (BEHIND_CAMERA_PENALTY, BEHIND_CAMERA_PENALTY),
                };
                r[offset] = rx;
                r[offset + 1] = ry;
                offset += 2;
            }
        }
        r
    }

    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real> {
        // Forward differences with a step relative to each parameter's scale.
        let base_r = self.residuals_unweighted(x);
        let mut j = DMatrix::zeros(base_r.len(), x.len());
        let mut x_pert = x.clone();
        for k in 0..x.len() {
            let step = 1e-7 * x[k].abs().max(1.0);
            x_pert[k] = x[k] + step;
            let r_plus = self.residuals_unweighted(&x_pert);
            j.set_column(k, &((r_plus - &base_r) / step));
            x_pert[k] = x[k];
        }
        j
    }

    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        let mut scales = DVector::from_element(r_unweighted.len(), 1.0);
        if self.kernel == RobustKernel::None {
            return scales;
        }
        for p in 0..r_unweighted.len() / 2 {
            let norm = r_unweighted[2 * p].hypot(r_unweighted[2 * p + 1]);
            let s = self.kernel.weight(norm).sqrt();
            scales[2 * p] = s;
            scales[2 * p + 1] = s;
        }
        scales
    }
}

/// Result of [`refine_planar_intrinsics`].
#[derive(Debug, Clone)]
pub struct PlanarRefinement {
    pub camera: PinholeCamera,
    pub poses: Vec<Iso3>,
    /// Unweighted RMS reprojection error (pixels).
    pub rms_error: Real,
    pub report: SolveReport,
}

/// Refine camera intrinsics, distortion and per-view poses from an initial guess.
pub fn refine_planar_intrinsics<B: NllsSolverBackend>(
    backend: &B,
    problem: &PlanarIntrinsicsProblem,
    camera0: &PinholeCamera,
    poses0: &[Iso3],
    opts: &SolveOptions,
) -> Result<PlanarRefinement, ProblemError> {
    let x0 = problem.pack(camera0, poses0)?;
    debug!(
        "refining {} parameters over {} views, initial rms {:.4} px",
        x0.len(),
        problem.num_views(),
        problem.rms_error(camera0, poses0)
    );

    let (x_opt, report) = backend.solve(problem, x0, opts);
    if !report.converged {
        warn!("planar intrinsics refinement stopped early: {}", report.termination);
    }
    let (camera, poses) = problem.decode(&x_opt);
    let rms_error = problem.rms_error(&camera, &poses);

    Ok(PlanarRefinement {
        camera,
        poses,
        rms_error,
        report,
    })
}
