//! Linear initialisation for planar camera calibration.
//!
//! - [`dlt_homography`]: board plane → image homography per view,
//! - [`estimate_intrinsics_from_homographies`]: Zhang's closed form for `K`,
//! - [`estimate_planar_pose_from_h`]: board pose from `K` and a homography.

mod homography;
mod planar_pose;
mod zhang_intrinsics;

pub use homography::*;
pub use planar_pose::*;
pub use zhang_intrinsics::*;
