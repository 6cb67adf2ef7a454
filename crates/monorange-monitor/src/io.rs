//! Boundaries of the monitor loop: where frames come from, who finds objects
//! in them, where annotated frames go and how the cue is played.

use std::time::Instant;

use monorange_core::Detection;

use crate::AnnotatedFrame;

/// Error type returned across the capability traits.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One captured frame with an opaque pixel payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<P> {
    pub index: u64,
    /// Monotonic capture time, used for alert debouncing.
    pub captured_at: Instant,
    pub width: u32,
    pub height: u32,
    pub pixels: P,
}

pub trait FrameSource {
    type Pixels;

    /// Next frame, or `Ok(None)` at end of stream.
    ///
    /// Blocks until a frame is available. An error means the device stopped
    /// producing frames; the session ends.
    fn read_frame(&mut self) -> Result<Option<Frame<Self::Pixels>>, BoxError>;
}

pub trait Detector<P> {
    fn detect(&mut self, frame: &Frame<P>) -> Result<Vec<Detection>, BoxError>;
}

pub trait FrameSink<P> {
    fn write_frame(&mut self, frame: &AnnotatedFrame<P>) -> Result<(), BoxError>;

    /// Flush and release the output. Called once when the session ends.
    fn finish(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Fire-and-forget audio notification.
pub trait AudioCue {
    /// Must not block the caller. Delivery is not guaranteed.
    fn play(&self);
}

/// Cue that plays nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl AudioCue for Silent {
    fn play(&self) {}
}

impl<T: AudioCue + ?Sized> AudioCue for &T {
    fn play(&self) {
        (**self).play();
    }
}
