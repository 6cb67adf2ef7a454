//! Online side of `monorange`.
//!
//! Every frame from a [`FrameSource`] goes through the [`Detector`]; each
//! detection is ranged by the [`GroundPlaneEstimator`] from the bottom edge
//! of its box, the set of detected classes drives the [`AlertMachine`], and
//! the annotated frame goes to a [`FrameSink`]. [`FramePipeline`] owns the
//! loop.

mod alert;
mod config;
mod cue;
mod distance;
mod io;
mod orchestrator;
mod overlay;

pub use alert::*;
pub use config::*;
pub use cue::*;
pub use distance::*;
pub use io::*;
pub use orchestrator::*;
pub use overlay::*;
