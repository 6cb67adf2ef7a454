//! Synthetic planar target helpers.
//!
//! The functions here generate board poses around a fixed viewing distance
//! and project a planar target into a camera to produce
//! [`crate::CorrespondenceView`] instances with known ground truth.

use crate::{CorrespondenceView, Iso3, PinholeCamera, Pt2, Pt3, Real, Vec2};
use anyhow::Result;
use nalgebra::{Translation3, UnitQuaternion, Vector3};

/// Centroid of a point set (origin for an empty set).
pub fn centroid(points: &[Pt3]) -> Pt3 {
    if points.is_empty() {
        return Pt3::origin();
    }
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Pt3::from(sum / points.len() as Real)
}

/// Generate `n_views` board poses that keep the board center on the optical
/// axis at `distance`, each tilted by `tilt_rad` about an axis in the board
/// plane whose direction turns evenly around the circle.
///
/// Distinct tilt axes make the views well conditioned for intrinsics
/// estimation.
pub fn poses_orbit(n_views: usize, board_center: Pt3, tilt_rad: Real, distance: Real) -> Vec<Iso3> {
    (0..n_views)
        .map(|view_idx| {
            let phi = std::f64::consts::TAU * view_idx as Real / n_views.max(1) as Real;
            let axis = Vector3::new(phi.cos(), phi.sin(), 0.0);
            // Alternate the viewing distance slightly so scale is observable.
            let z = distance * (1.0 + 0.1 * ((view_idx % 3) as Real - 1.0));
            let rotation = UnitQuaternion::from_scaled_axis(axis * tilt_rad);
            let translation = Vector3::new(0.0, 0.0, z) - rotation * board_center.coords;
            Iso3::from_parts(Translation3::from(translation), rotation)
        })
        .collect()
}

/// Project a planar target into the camera.
///
/// `cam_from_target` maps target-frame points into the camera frame. Fails if
/// any point lands behind the camera.
pub fn project_view(
    camera: &PinholeCamera,
    cam_from_target: &Iso3,
    target_points: &[Pt3],
) -> Result<CorrespondenceView> {
    let mut pixels = Vec::with_capacity(target_points.len());
    for (idx, pw) in target_points.iter().enumerate() {
        let pc = cam_from_target.transform_point(pw);
        let Some(uv) = camera.project(&pc) else {
            anyhow::bail!("point {idx} not projectable (z={:.6})", pc.z);
        };
        pixels.push(Pt2::new(uv.x, uv.y));
    }
    CorrespondenceView::new(target_points.to_vec(), pixels)
}

/// Project the target for every pose.
pub fn project_views(
    camera: &PinholeCamera,
    poses: &[Iso3],
    target_points: &[Pt3],
) -> Result<Vec<CorrespondenceView>> {
    poses
        .iter()
        .map(|pose| project_view(camera, pose, target_points))
        .collect()
}

/// Deterministic pixel jitter in `[-amplitude, amplitude]` per axis.
///
/// Uses a SplitMix64 stream keyed by `(seed, view, point)`, so datasets are
/// stable across platforms without pulling in an RNG.
pub fn jitter(amplitude: Real, seed: u64, view_idx: usize, point_idx: usize) -> Vec2 {
    if amplitude == 0.0 {
        return Vec2::zeros();
    }
    let key = seed
        ^ (view_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (point_idx as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    let u = unit(splitmix64(key));
    let v = unit(splitmix64(key ^ 0x94D0_49BB_1331_11EB));
    Vec2::new((u - 0.5) * 2.0 * amplitude, (v - 0.5) * 2.0 * amplitude)
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn unit(bits: u64) -> Real {
    (bits >> 11) as Real / (1u64 << 53) as Real
}
