use log::debug;
use monorange_core::{CameraIntrinsics, Mat3, Real};
use nalgebra::{DMatrix, SVector};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IntrinsicsError {
    #[error("need at least 3 homographies, got {0}")]
    NotEnoughViews(usize),
    #[error("degenerate view configuration")]
    Degenerate,
    #[error("homographies are inconsistent with a real camera")]
    InvalidSolution,
    #[error("svd failed")]
    SvdFailed,
}

/// The 6-vector `v_ij(H)` of Zhang's constraint `h_i^T B h_j`.
fn v_ij(hmtx: &Mat3, i: usize, j: usize) -> SVector<Real, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);

    SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate camera intrinsics `K` from plane homographies using Zhang's
/// closed-form solution (no distortion).
///
/// Requires at least 3 homographies from distinct board orientations.
pub fn estimate_intrinsics_from_homographies(
    hmtxs: &[Mat3],
) -> Result<CameraIntrinsics, IntrinsicsError> {
    if hmtxs.len() < 3 {
        return Err(IntrinsicsError::NotEnoughViews(hmtxs.len()));
    }

    let m = hmtxs.len();
    let mut vmtx = DMatrix::<Real>::zeros(2 * m, 6);

    for (k, hmtx) in hmtxs.iter().enumerate() {
        // Homographies are defined up to scale; unit norm keeps rows comparable.
        let norm = hmtx.norm();
        if norm <= Real::EPSILON {
            return Err(IntrinsicsError::Degenerate);
        }
        let h = *hmtx / norm;
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        let v12 = v_ij(&h, 0, 1);

        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t.ok_or(IntrinsicsError::SvdFailed)?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .fold((0, Real::INFINITY), |best, (i, &s)| if s < best.1 { (i, s) } else { best });
    let b = v_t.row(min_idx);

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    // v0 = (B12 B13 - B11 B23) / (B11 B22 - B12^2)
    // λ  = B33 - (B13^2 + v0 (B12 B13 - B11 B23)) / B11
    // α  = sqrt(λ / B11),  β = sqrt(λ B11 / (B11 B22 - B12^2))
    // γ  = -B12 α^2 β / λ, u0 = γ v0 / β - B13 α^2 / λ
    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-12 {
        return Err(IntrinsicsError::Degenerate);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() || lambda * b11 / denom <= 0.0 {
        return Err(IntrinsicsError::InvalidSolution);
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let intrinsics = CameraIntrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    };
    if ![alpha, beta, gamma, u0, v0].iter().all(|v| v.is_finite()) {
        return Err(IntrinsicsError::InvalidSolution);
    }
    debug!("closed-form intrinsics from {m} views: {intrinsics:?}");
    Ok(intrinsics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    fn synthetic_homography(kmtx: &Mat3, rot: Rotation3<Real>, t: Vector3<Real>) -> Mat3 {
        // For the Z=0 plane, H = K [r1 r2 t]
        let r = rot.matrix();
        let mut hmtx = Mat3::zeros();
        hmtx.set_column(0, &(kmtx * r.column(0)));
        hmtx.set_column(1, &(kmtx * r.column(1)));
        hmtx.set_column(2, &(kmtx * t));
        hmtx
    }

    #[test]
    fn intrinsics_from_homographies_recovers_kmtx() {
        let intr_gt = CameraIntrinsics::new(1030.12, 1026.17, 327.04, 240.0);
        let kmtx = intr_gt.k_matrix();

        let hmts = vec![
            synthetic_homography(
                &kmtx,
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(0.1, -0.05, 1.0),
            ),
            synthetic_homography(
                &kmtx,
                Rotation3::from_euler_angles(-0.05, 0.15, -0.1),
                Vector3::new(-0.05, 0.1, 1.2),
            ),
            synthetic_homography(
                &kmtx,
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(0.0, 0.0, 0.9),
            ),
        ];

        let intr_est = estimate_intrinsics_from_homographies(&hmts).unwrap();

        assert!((intr_est.fx - intr_gt.fx).abs() < 5.0, "fx mismatch");
        assert!((intr_est.fy - intr_gt.fy).abs() < 5.0, "fy mismatch");
        assert!((intr_est.cx - intr_gt.cx).abs() < 10.0, "cx mismatch");
        assert!((intr_est.cy - intr_gt.cy).abs() < 10.0, "cy mismatch");
        assert!(intr_est.skew.abs() < 1.0, "skew not ~0: {}", intr_est.skew);
    }

    #[test]
    fn two_views_are_not_enough() {
        let h = Mat3::identity();
        assert_eq!(
            estimate_intrinsics_from_homographies(&[h, h]),
            Err(IntrinsicsError::NotEnoughViews(2))
        );
    }
}
