//! Non-linear least-squares refinement for planar camera calibration.
//!
//! The [`NllsProblem`] trait describes a dense residual/Jacobian problem,
//! [`LmBackend`] solves it with Levenberg–Marquardt, and
//! [`PlanarIntrinsicsProblem`] is the reprojection-error problem over
//! intrinsics, distortion and per-view board poses.

pub mod backend_lm;
pub mod planar_intrinsics;
pub mod robust;
pub mod traits;

pub use backend_lm::LmBackend;
pub use planar_intrinsics::*;
pub use robust::RobustKernel;
pub use traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
