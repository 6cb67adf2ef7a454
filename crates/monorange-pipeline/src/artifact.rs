//! Persisted calibration result and the mount measurement that goes with it.
//!
//! The artifact is written once by the calibration run and read at monitor
//! start, where it is merged with a [`MountGeometry`] into the immutable
//! [`GroundGeometry`].

use std::fs;
use std::path::Path;

use monorange_core::{
    BrownConrady5, CameraIntrinsics, GeometryError, GroundGeometry, MountGeometry, Real,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{CalibrationResult, ImageSize};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to access {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {path}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("camera matrix is not of the form [[fx, s, cx], [0, fy, cy], [0, 0, 1]]")]
    InvalidCameraMatrix,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationArtifact {
    pub camera_matrix: [[Real; 3]; 3],
    /// `[k1, k2, p1, p2, k3]`, all zero when distortion was not estimated.
    pub distortion: [Real; 5],
    pub rms_error: Real,
    pub image_size: ImageSize,
    pub sample_count: usize,
}

impl CalibrationArtifact {
    pub fn intrinsics(&self) -> Result<CameraIntrinsics, ArtifactError> {
        CameraIntrinsics::from_rows(&self.camera_matrix).ok_or(ArtifactError::InvalidCameraMatrix)
    }

    pub fn distortion(&self) -> BrownConrady5 {
        BrownConrady5::from_array(self.distortion)
    }

    /// Merge the calibrated intrinsics with a mount measurement.
    pub fn ground_geometry(&self, mount: &MountGeometry) -> Result<GroundGeometry, ArtifactError> {
        let intrinsics = self.intrinsics()?;
        Ok(GroundGeometry::new(&intrinsics, mount)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let artifact: Self = read_json(path.as_ref())?;
        // Reject malformed matrices at load time rather than at first use.
        artifact.intrinsics()?;
        Ok(artifact)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ArtifactError::Json {
            path: path.display().to_string(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ArtifactError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

impl From<&CalibrationResult> for CalibrationArtifact {
    fn from(result: &CalibrationResult) -> Self {
        Self {
            camera_matrix: result.intrinsics.to_rows(),
            distortion: result.distortion.unwrap_or_default().to_array(),
            rms_error: result.rms_error,
            image_size: result.image_size,
            sample_count: result.sample_count,
        }
    }
}

impl CalibrationResult {
    pub fn to_artifact(&self) -> CalibrationArtifact {
        CalibrationArtifact::from(self)
    }
}

/// Load a mount measurement (`{"height_m": .., "tilt_deg": ..}`).
pub fn load_mount(path: impl AsRef<Path>) -> Result<MountGeometry, ArtifactError> {
    read_json(path.as_ref())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let data = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ArtifactError::Json {
        path: path.display().to_string(),
        source,
    })
}
