use monorange_core::{Iso3, Mat3, Real};
use nalgebra::{Rotation3, Translation3, UnitQuaternion, Vector3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PoseError {
    #[error("calibration matrix is singular")]
    SingularIntrinsics,
    #[error("homography does not describe a visible plane")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Estimate the pose of a planar board (Z=0) relative to the camera, given
/// intrinsics `K` and the plane → image homography `H`.
///
/// Returns `T_C_B`, mapping board coordinates into camera coordinates. The
/// sign of `H` is chosen so that the board lies in front of the camera.
pub fn estimate_planar_pose_from_h(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, PoseError> {
    let k_inv = kmtx.try_inverse().ok_or(PoseError::SingularIntrinsics)?;

    let k_inv_h1 = k_inv * hmtx.column(0);
    let k_inv_h2 = k_inv * hmtx.column(1);
    let k_inv_h3 = k_inv * hmtx.column(2);

    // λ normalises the first two columns (average for robustness).
    let norm_sum = k_inv_h1.norm() + k_inv_h2.norm();
    if norm_sum <= Real::EPSILON {
        return Err(PoseError::Degenerate);
    }
    let mut lambda = 2.0 / norm_sum;
    // t_z must be positive.
    if k_inv_h3.z < 0.0 {
        lambda = -lambda;
    }

    let r1 = lambda * k_inv_h1;
    let r2 = lambda * k_inv_h2;
    let r3 = r1.cross(&r2);
    let r_mat = Mat3::from_columns(&[r1, r2, r3]);

    // Nearest rotation (polar decomposition via SVD).
    let svd = r_mat.svd(true, true);
    let u = svd.u.ok_or(PoseError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(PoseError::SvdFailed)?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t: Vector3<Real> = lambda * k_inv_h3;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(t), rot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use monorange_core::CameraIntrinsics;

    #[test]
    fn planar_pose_from_h_recovers_pose() {
        let kmtx = CameraIntrinsics::new(800.0, 780.0, 640.0, 360.0).k_matrix();

        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let t = Vector3::new(0.1, -0.05, 1.0);

        // H = K [r1 r2 t], deliberately negated to exercise the sign fix.
        let r_mat = rot.matrix();
        let mut hmtx = Mat3::zeros();
        hmtx.set_column(0, &(kmtx * r_mat.column(0)));
        hmtx.set_column(1, &(kmtx * r_mat.column(1)));
        hmtx.set_column(2, &(kmtx * t));
        let hmtx = -hmtx;

        let iso_est = estimate_planar_pose_from_h(&kmtx, &hmtx).unwrap();

        assert!((iso_est.translation.vector - t).norm() < 1e-6);

        let r_est = iso_est.rotation.to_rotation_matrix();
        let r_diff = r_est.matrix().transpose() * r_mat;
        let angle = ((r_diff.trace() - 1.0) * 0.5).clamp(-1.0, 1.0).acos();
        assert!(angle < 1e-6, "rotation error too large: {}", angle);
    }

    #[test]
    fn singular_k_is_reported() {
        let h = Mat3::identity();
        assert_eq!(
            estimate_planar_pose_from_h(&Mat3::zeros(), &h),
            Err(PoseError::SingularIntrinsics)
        );
    }
}
