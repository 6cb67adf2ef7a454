//! Offline side of `monorange`: collecting checkerboard samples and solving
//! for camera intrinsics.
//!
//! - [`CaptureGatekeeper`] decides which detected boards become samples,
//! - [`CaptureStation`] wires corner finding, refinement and gating together,
//! - [`CaptureLog`] keeps the append-only record of accepted samples,
//! - [`CalibrationSolver`] accumulates samples and runs the solve,
//! - [`CalibrationArtifact`] is the persisted result read by the monitor.

mod artifact;
mod calibration;
mod capture;
mod capture_log;

pub use artifact::*;
pub use calibration::*;
pub use capture::*;
pub use capture_log::*;
