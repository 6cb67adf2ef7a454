use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    class_set, AlertMachine, AnnotatedFrame, AudioCue, BoxError, Detector, FrameSink, FrameSource,
    GroundPlaneEstimator, RangedDetection,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("frame acquisition failed")]
    FrameAcquisitionFailed(#[source] BoxError),
    #[error("detector failed on frame {frame}")]
    Detector {
        frame: u64,
        #[source]
        source: BoxError,
    },
    #[error("frame sink failed")]
    Sink(#[source] BoxError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndOfStream,
    QuitRequested,
    FrameLimit,
    AcquisitionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub frames: u64,
    pub detections: u64,
    pub cues: u64,
    pub stop: StopReason,
}

/// What one iteration produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Frame { detections: usize, cue: bool },
    EndOfStream,
}

/// Single-threaded per-frame driver.
///
/// Each frame is pulled from the source, run through the detector, ranged,
/// fed to the alert machine and handed to the sink before the next one is
/// read.
pub struct FramePipeline<S, D, K, C> {
    source: S,
    detector: D,
    sink: K,
    cue: C,
    estimator: GroundPlaneEstimator,
    alerts: AlertMachine,
    max_frames: Option<u64>,
    frames: u64,
    detections: u64,
    cues: u64,
}

impl<S, D, K, C> FramePipeline<S, D, K, C>
where
    S: FrameSource,
    D: Detector<S::Pixels>,
    K: FrameSink<S::Pixels>,
    C: AudioCue,
{
    pub fn new(
        source: S,
        detector: D,
        sink: K,
        cue: C,
        estimator: GroundPlaneEstimator,
        alerts: AlertMachine,
    ) -> Self {
        Self {
            source,
            detector,
            sink,
            cue,
            estimator,
            alerts,
            max_frames: None,
            frames: 0,
            detections: 0,
            cues: 0,
        }
    }

    /// Stop after this many frames.
    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn alerts(&self) -> &AlertMachine {
        &self.alerts
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_parts(self) -> (S, D, K, C) {
        (self.source, self.detector, self.sink, self.cue)
    }

    /// Process one frame.
    pub fn step(&mut self) -> Result<Step, PipelineError> {
        let Some(frame) = self
            .source
            .read_frame()
            .map_err(PipelineError::FrameAcquisitionFailed)?
        else {
            return Ok(Step::EndOfStream);
        };

        let detections = self
            .detector
            .detect(&frame)
            .map_err(|source| PipelineError::Detector {
                frame: frame.index,
                source,
            })?;

        let classes = class_set(&detections);
        let ranged: Vec<RangedDetection> = detections
            .into_iter()
            .map(|detection| RangedDetection {
                distance_m: self.estimator.estimate(detection.bbox.bottom()),
                detection,
            })
            .collect();
        let decision = self.alerts.update(&classes, frame.captured_at);
        debug!(
            "frame {}: {} detections, alert {:?}",
            frame.index,
            ranged.len(),
            decision.message
        );

        let count = ranged.len();
        let annotated = AnnotatedFrame::new(frame, ranged, decision.message);
        self.sink.write_frame(&annotated).map_err(PipelineError::Sink)?;
        if decision.cue {
            self.cue.play();
            self.cues += 1;
        }

        self.frames += 1;
        self.detections += count as u64;
        Ok(Step::Frame {
            detections: count,
            cue: decision.cue,
        })
    }

    /// Run until end of stream, quit, frame limit or acquisition failure.
    ///
    /// The sink is finished on every exit path. Acquisition failure ends the
    /// session normally; detector and sink failures are returned as errors.
    pub fn run(&mut self, quit: &AtomicBool) -> Result<SessionSummary, PipelineError> {
        let outcome = self.run_loop(quit);
        let finished = self.sink.finish().map_err(PipelineError::Sink);

        let stop = outcome?;
        finished?;
        let summary = SessionSummary {
            frames: self.frames,
            detections: self.detections,
            cues: self.cues,
            stop,
        };
        info!(
            "session ended ({:?}) after {} frames, {} cues",
            summary.stop, summary.frames, summary.cues
        );
        Ok(summary)
    }

    fn run_loop(&mut self, quit: &AtomicBool) -> Result<StopReason, PipelineError> {
        loop {
            if quit.load(Ordering::Relaxed) {
                return Ok(StopReason::QuitRequested);
            }
            if self.max_frames.is_some_and(|max| self.frames >= max) {
                return Ok(StopReason::FrameLimit);
            }
            match self.step() {
                Ok(Step::Frame { .. }) => {}
                Ok(Step::EndOfStream) => return Ok(StopReason::EndOfStream),
                Err(PipelineError::FrameAcquisitionFailed(err)) => {
                    warn!("camera stopped sending frames: {err}");
                    return Ok(StopReason::AcquisitionFailed);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
