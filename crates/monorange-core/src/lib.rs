//! Core math and geometry primitives for `monorange`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - the pinhole camera model used by calibration (`CameraIntrinsics`,
//!   `BrownConrady5`, `PinholeCamera`),
//! - the immutable ground geometry consumed by distance estimation,
//! - calibration observations (`CorrespondenceView`, `BoardSpec`),
//! - detector output types (`Detection`, `BoundingBox`),
//! - synthetic planar datasets for tests and demos.

/// Detector output types.
pub mod detection;
/// Camera mount and ground-plane geometry.
pub mod geometry;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Pinhole camera model with Brown–Conrady distortion.
pub mod models;
/// 2D-3D correspondences and checkerboard layout.
pub mod observation;
/// Synthetic planar targets.
pub mod synthetic;

pub use detection::*;
pub use geometry::*;
pub use math::*;
pub use models::*;
pub use observation::*;
