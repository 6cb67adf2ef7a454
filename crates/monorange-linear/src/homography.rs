use monorange_core::{Mat3, Pt2, Real};
use nalgebra::DMatrix;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point sets differ in length: {0} vs {1}")]
    LengthMismatch(usize, usize),
    #[error("degenerate point configuration")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Similarity that moves the centroid to the origin and scales the mean
/// distance from it to `sqrt(2)`.
fn normalization(points: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = points.len() as Real;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (mx, my) = (sx / n, sy / n);
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - mx).powi(2) + (p.y - my).powi(2)).sqrt())
        .sum::<Real>()
        / n;
    if mean_dist <= Real::EPSILON {
        return Err(HomographyError::Degenerate);
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Ok(Mat3::new(s, 0.0, -s * mx, 0.0, s, -s * my, 0.0, 0.0, 1.0))
}

fn apply(t: &Mat3, p: &Pt2) -> Pt2 {
    Pt2::new(
        t[(0, 0)] * p.x + t[(0, 2)],
        t[(1, 1)] * p.y + t[(1, 2)],
    )
}

/// Estimate `H` such that `image ~ H * world` using the normalised DLT.
///
/// Both point sets are conditioned (Hartley normalisation) before the SVD,
/// which matters when board coordinates are centimeters and pixels are in
/// the hundreds.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if image.len() != n {
        return Err(HomographyError::LengthMismatch(n, image.len()));
    }
    if n < 4 {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let t_world = normalization(world)?;
    let t_image = normalization(image)?;

    let mut a = DMatrix::<Real>::zeros(2 * n, 9);
    for (i, (pw, pi)) in world.iter().zip(image.iter()).enumerate() {
        let w = apply(&t_world, pw);
        let m = apply(&t_image, pi);
        let (x, y, u, v) = (w.x, w.y, m.x, m.y);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // A h = 0: right singular vector of the smallest singular value. With
    // exactly 4 points A is 8x9 and the thin SVD drops the null vector, so
    // pad to a square system first.
    if a.nrows() < 9 {
        a = a.resize_vertically(9, 0.0);
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .fold((0, Real::INFINITY), |best, (i, &s)| if s < best.1 { (i, s) } else { best });
    let h = v_t.row(min_idx);

    let h_norm = Mat3::from_fn(|r, c| h[3 * r + c]);
    let t_image_inv = t_image.try_inverse().ok_or(HomographyError::Degenerate)?;
    let mut h_mat = t_image_inv * h_norm * t_world;

    let scale = h_mat[(2, 2)];
    if scale.abs() <= Real::EPSILON {
        return Err(HomographyError::Degenerate);
    }
    h_mat /= scale;

    Ok(h_mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monorange_core::{from_homogeneous, to_homogeneous};

    #[test]
    fn scaling_homography() {
        let w = vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(1.0, 0.0),
            Pt2::new(1.0, 1.0),
            Pt2::new(0.0, 1.0),
        ];
        let img = vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(2.0, 0.0),
            Pt2::new(2.0, 2.0),
            Pt2::new(0.0, 2.0),
        ];

        let h = dlt_homography(&w, &img).unwrap();
        assert!((h[(0, 0)] - 2.0).abs() < 1e-6);
        assert!((h[(1, 1)] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn perspective_homography_maps_board_to_pixels() {
        let h_gt = Mat3::new(
            900.0, 15.0, 320.0, -8.0, 880.0, 240.0, 0.2, -0.1, 1.0,
        );
        let world: Vec<Pt2> = (0..6)
            .flat_map(|j| (0..6).map(move |i| Pt2::new(i as Real * 0.025, j as Real * 0.025)))
            .collect();
        let image: Vec<Pt2> = world
            .iter()
            .map(|p| from_homogeneous(&(h_gt * to_homogeneous(p))).unwrap())
            .collect();

        let h = dlt_homography(&world, &image).unwrap();
        for (pw, pi) in world.iter().zip(&image) {
            let proj = from_homogeneous(&(h * to_homogeneous(pw))).unwrap();
            assert!((proj - *pi).norm() < 1e-6);
        }
    }

    #[test]
    fn too_few_points() {
        let pts = vec![Pt2::origin(); 3];
        assert_eq!(
            dlt_homography(&pts, &pts),
            Err(HomographyError::NotEnoughPoints(3))
        );
    }

    #[test]
    fn coincident_points_are_degenerate() {
        let pts = vec![Pt2::new(1.0, 1.0); 5];
        assert_eq!(dlt_homography(&pts, &pts), Err(HomographyError::Degenerate));
    }
}
