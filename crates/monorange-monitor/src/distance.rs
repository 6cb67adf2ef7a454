//! Monocular ground-plane ranging with a tilted pinhole camera.
//!
//! For a camera at height `H` above flat ground, pitched down by `θ`, the
//! ray through image row `y` meets the ground at forward distance
//!
//! ```text
//! Z = H cos θ / (sin θ + ((cy - y) / fy) cos θ)
//! ```
//!
//! Only `fy`, `cy`, `H` and `θ` enter the formula.

use log::warn;
use monorange_core::{GroundGeometry, Real};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    /// Floor applied to every estimate (meters).
    pub min_distance: Real,
    /// Denominators smaller than this in magnitude are treated as zero.
    pub epsilon: Real,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            min_distance: 0.05,
            epsilon: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClampReason {
    /// The raw estimate was below `min_distance`, including rows past the
    /// horizon row where it turns negative.
    BelowFloor,
    /// Non-finite input or a vanishing denominator.
    DegenerateGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceEstimate {
    pub meters: Real,
    pub clamped: Option<ClampReason>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPlaneEstimator {
    geometry: GroundGeometry,
    config: DistanceConfig,
}

impl GroundPlaneEstimator {
    pub fn new(geometry: GroundGeometry, config: DistanceConfig) -> Self {
        Self { geometry, config }
    }

    pub fn geometry(&self) -> &GroundGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &DistanceConfig {
        &self.config
    }

    /// Forward distance in meters to the ground point seen at row `y_pixel`.
    ///
    /// Never fails and never returns less than `min_distance`.
    pub fn estimate(&self, y_pixel: Real) -> Real {
        self.estimate_detailed(y_pixel).meters
    }

    pub fn estimate_detailed(&self, y_pixel: Real) -> DistanceEstimate {
        let g = &self.geometry;
        let floor = self.config.min_distance;
        let degenerate = DistanceEstimate {
            meters: floor,
            clamped: Some(ClampReason::DegenerateGeometry),
        };

        if !y_pixel.is_finite() {
            warn!("non-finite image row {y_pixel}, using minimum distance");
            return degenerate;
        }

        let (sin_t, cos_t) = g.tilt_rad().sin_cos();
        let numerator = g.height_m() * cos_t;
        let denominator = sin_t + ((g.cy() - y_pixel) / g.fy()) * cos_t;
        if !denominator.is_finite() || denominator.abs() < self.config.epsilon {
            warn!("ray through row {y_pixel} is parallel to the ground, using minimum distance");
            return degenerate;
        }

        let z = numerator / denominator;
        if !z.is_finite() {
            warn!("distance for row {y_pixel} is not finite, using minimum distance");
            return degenerate;
        }
        if z < floor {
            return DistanceEstimate {
                meters: floor,
                clamped: Some(ClampReason::BelowFloor),
            };
        }
        DistanceEstimate {
            meters: z,
            clamped: None,
        }
    }
}
