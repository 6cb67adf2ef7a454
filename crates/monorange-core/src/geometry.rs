//! Immutable camera geometry used for ground-plane ranging.
//!
//! [`GroundGeometry`] merges the intrinsics produced by calibration with the
//! mount measurement (height above ground and downward tilt) taken when the
//! camera is installed. Once built it is never mutated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CameraIntrinsics, Real};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("{name} must be strictly positive, got {value}")]
    NonPositive { name: &'static str, value: Real },
    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: Real },
    #[error("tilt must lie in [0, 90) degrees, got {0} degrees")]
    TiltOutOfRange(Real),
}

/// Physical mount of the camera, measured once at installation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MountGeometry {
    /// Height of the optical center above the ground plane (meters).
    pub height_m: Real,
    /// Downward tilt of the optical axis below horizontal (degrees).
    pub tilt_deg: Real,
}

impl MountGeometry {
    pub fn tilt_rad(&self) -> Real {
        self.tilt_deg.to_radians()
    }
}

/// Intrinsics plus mount: everything the distance estimator reads.
///
/// Invariants enforced by [`GroundGeometry::new`]: `fx`, `fy` and the mount
/// height are strictly positive, the principal point is finite and the tilt
/// lies in `[0, π/2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroundGeometry {
    fx: Real,
    fy: Real,
    cx: Real,
    cy: Real,
    height_m: Real,
    tilt_rad: Real,
}

fn positive(name: &'static str, value: Real) -> Result<Real, GeometryError> {
    if !value.is_finite() {
        return Err(GeometryError::NotFinite { name, value });
    }
    if value <= 0.0 {
        return Err(GeometryError::NonPositive { name, value });
    }
    Ok(value)
}

fn finite(name: &'static str, value: Real) -> Result<Real, GeometryError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(GeometryError::NotFinite { name, value })
    }
}

impl GroundGeometry {
    pub fn new(intrinsics: &CameraIntrinsics, mount: &MountGeometry) -> Result<Self, GeometryError> {
        let tilt_rad = finite("tilt", mount.tilt_rad())?;
        if !(0.0..std::f64::consts::FRAC_PI_2).contains(&tilt_rad) {
            return Err(GeometryError::TiltOutOfRange(mount.tilt_deg));
        }
        Ok(Self {
            fx: positive("fx", intrinsics.fx)?,
            fy: positive("fy", intrinsics.fy)?,
            cx: finite("cx", intrinsics.cx)?,
            cy: finite("cy", intrinsics.cy)?,
            height_m: positive("mount height", mount.height_m)?,
            tilt_rad,
        })
    }

    pub fn fx(&self) -> Real {
        self.fx
    }

    pub fn fy(&self) -> Real {
        self.fy
    }

    pub fn cx(&self) -> Real {
        self.cx
    }

    pub fn cy(&self) -> Real {
        self.cy
    }

    pub fn height_m(&self) -> Real {
        self.height_m
    }

    pub fn tilt_rad(&self) -> Real {
        self.tilt_rad
    }

    /// Image row where the ranging denominator
    /// `sin θ + ((cy - y) / fy) cos θ` vanishes.
    ///
    /// Rows at or past it map to no ground point ahead of the camera.
    pub fn horizon_row(&self) -> Real {
        self.cy + self.fy * self.tilt_rad.tan()
    }
}
