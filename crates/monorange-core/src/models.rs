use serde::{Deserialize, Serialize};

use crate::{Mat3, Pt3, Real, Vec2};

/// Intrinsic parameters of a pinhole camera.
///
/// The corresponding calibration matrix `K` has the form:
///
/// ```text
/// [ fx  skew  cx ]
/// [  0   fy   cy ]
/// [  0    0    1 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    #[serde(default)]
    pub skew: Real,
}

impl CameraIntrinsics {
    /// Intrinsics with zero skew.
    pub fn new(fx: Real, fy: Real, cx: Real, cy: Real) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: 0.0,
        }
    }

    /// Build the 3×3 calibration matrix `K`.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    /// Attempt to construct intrinsics from a 3×3 calibration matrix `K`.
    ///
    /// The matrix is normalised so that `K[2, 2] == 1` and then checked
    /// against the upper-triangular form above. `None` is returned if the
    /// structure does not match within a small tolerance.
    pub fn try_from_k_matrix(k: &Mat3) -> Option<Self> {
        let eps = 1e-9;

        let k33 = k[(2, 2)];
        if k33.abs() < eps {
            return None;
        }
        let k_norm = *k / k33;

        if k_norm[(1, 0)].abs() > eps || k_norm[(2, 0)].abs() > eps || k_norm[(2, 1)].abs() > eps
        {
            return None;
        }

        Some(Self {
            fx: k_norm[(0, 0)],
            skew: k_norm[(0, 1)],
            cx: k_norm[(0, 2)],
            fy: k_norm[(1, 1)],
            cy: k_norm[(1, 2)],
        })
    }

    /// Row-major `K` as nested arrays, the layout used by calibration artifacts.
    pub fn to_rows(&self) -> [[Real; 3]; 3] {
        [
            [self.fx, self.skew, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    pub fn from_rows(rows: &[[Real; 3]; 3]) -> Option<Self> {
        let k = Mat3::from_fn(|r, c| rows[r][c]);
        Self::try_from_k_matrix(&k)
    }
}

/// Brown–Conrady radial-tangential distortion (OpenCV's 5-coefficient order).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: Real,
    pub k2: Real,
    pub p1: Real,
    pub p2: Real,
    pub k3: Real,
}

impl BrownConrady5 {
    /// Coefficients in OpenCV order `[k1, k2, p1, p2, k3]`.
    pub fn to_array(&self) -> [Real; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_array(c: [Real; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    /// Distort normalised image coordinates.
    pub fn distort(&self, x: Real, y: Real) -> (Real, Real) {
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let x_t = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_t = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (x * radial + x_t, y * radial + y_t)
    }
}

/// Pinhole camera with optional Brown–Conrady distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Option<BrownConrady5>,
}

impl PinholeCamera {
    pub fn new(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            distortion: None,
        }
    }

    pub fn with_distortion(mut self, distortion: BrownConrady5) -> Self {
        self.distortion = Some(distortion);
        self
    }

    /// Project a point in camera coordinates to (distorted) pixel coordinates.
    ///
    /// Returns `None` for points on or behind the image plane.
    pub fn project(&self, p_c: &Pt3) -> Option<Vec2> {
        if p_c.z <= 1e-12 {
            return None;
        }
        let x = p_c.x / p_c.z;
        let y = p_c.y / p_c.z;

        let (x_d, y_d) = match self.distortion {
            Some(dist) => dist.distort(x, y),
            None => (x, y),
        };

        let k = &self.intrinsics;
        Some(Vec2::new(k.fx * x_d + k.skew * y_d + k.cx, k.fy * y_d + k.cy))
    }
}
