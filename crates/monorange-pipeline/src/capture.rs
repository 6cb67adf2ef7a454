use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, info};
use monorange_core::{BoardSpec, BoundingBox, CorrespondenceView, Pt2, Real};
use serde::{Deserialize, Serialize};

/// Stop criterion handed to the subpixel corner refiner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermCriteria {
    pub max_iters: u32,
    /// Stop once a corner moves less than this many pixels.
    pub epsilon: Real,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iters: 30,
            epsilon: 0.001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum board bounding-box area as a fraction of the frame area.
    pub min_area_ratio: Real,
    /// Minimum time between two automatic captures (seconds).
    pub min_interval_s: Real,
    /// The board center must move strictly more than this (pixels).
    pub min_center_shift_px: Real,
    /// Accept frames automatically when every gate passes.
    pub auto_capture: bool,
    pub refine: TermCriteria,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_area_ratio: 0.18,
            min_interval_s: 1.0,
            min_center_shift_px: 20.0,
            auto_capture: true,
            refine: TermCriteria::default(),
        }
    }
}

impl CaptureConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_interval_s).unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    BoardNotFound,
    AreaTooSmall,
    NotMoved,
    TooSoon,
    AutoCaptureDisabled,
}

/// Where the board sits in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardMeasurement {
    pub bbox: BoundingBox,
    pub center: Pt2,
    pub area_ratio: Real,
}

impl BoardMeasurement {
    fn from_corners(corners: &[Pt2], frame_area: Real) -> Option<Self> {
        let bbox = BoundingBox::enclosing(corners)?;
        let area_ratio = if frame_area > 0.0 {
            bbox.area() / frame_area
        } else {
            0.0
        };
        Some(Self {
            bbox,
            center: bbox.center(),
            area_ratio,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Accept(BoardMeasurement),
    Reject(RejectReason),
}

impl GateDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, GateDecision::Accept(_))
    }
}

/// Baseline of the last automatic capture.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CaptureGateState {
    pub last_save: Option<Instant>,
    pub last_center: Option<Pt2>,
    pub saved_count: usize,
}

/// Decides which detected boards are worth keeping as calibration samples.
///
/// Gates run in a fixed order (board present, area, movement, interval) and
/// the first failing gate is reported.
#[derive(Debug, Clone, Default)]
pub struct CaptureGatekeeper {
    config: CaptureConfig,
    state: CaptureGateState,
}

impl CaptureGatekeeper {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            state: CaptureGateState::default(),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> &CaptureGateState {
        &self.state
    }

    pub fn saved_count(&self) -> usize {
        self.state.saved_count
    }

    /// Continue numbering after `saved_count` samples kept by an earlier
    /// session.
    pub fn resume_from(&mut self, saved_count: usize) {
        self.state.saved_count = saved_count;
    }

    pub fn set_auto_capture(&mut self, enabled: bool) {
        self.config.auto_capture = enabled;
    }

    /// Evaluate a frame for automatic capture and update the baseline on
    /// acceptance.
    pub fn evaluate(
        &mut self,
        corners: Option<&[Pt2]>,
        frame_area: Real,
        now: Instant,
    ) -> GateDecision {
        let Some(measurement) = corners.and_then(|c| BoardMeasurement::from_corners(c, frame_area))
        else {
            return GateDecision::Reject(RejectReason::BoardNotFound);
        };
        if !self.config.auto_capture {
            return GateDecision::Reject(RejectReason::AutoCaptureDisabled);
        }
        if frame_area <= 0.0 || measurement.area_ratio < self.config.min_area_ratio {
            return GateDecision::Reject(RejectReason::AreaTooSmall);
        }
        if let Some(last) = self.state.last_center {
            let shift = (measurement.center - last).norm();
            if shift <= self.config.min_center_shift_px {
                return GateDecision::Reject(RejectReason::NotMoved);
            }
        }
        if let Some(last) = self.state.last_save {
            if now.saturating_duration_since(last) < self.config.min_interval() {
                return GateDecision::Reject(RejectReason::TooSoon);
            }
        }

        self.state.last_save = Some(now);
        self.state.last_center = Some(measurement.center);
        self.state.saved_count += 1;
        GateDecision::Accept(measurement)
    }

    /// Manual capture: only a detected board is required. The automatic
    /// baseline is left untouched.
    pub fn accept_manual(&mut self, corners: Option<&[Pt2]>, frame_area: Real) -> GateDecision {
        match corners.and_then(|c| BoardMeasurement::from_corners(c, frame_area)) {
            Some(measurement) => {
                self.state.saved_count += 1;
                GateDecision::Accept(measurement)
            }
            None => GateDecision::Reject(RejectReason::BoardNotFound),
        }
    }
}

/// Locates the inner corners of a checkerboard in an image.
pub trait CornerFinder<I: ?Sized> {
    /// All `board.rows * board.cols` corners, x varying fastest, or `None`.
    fn find_corners(&mut self, image: &I, board: &BoardSpec) -> Option<Vec<Pt2>>;
}

/// Subpixel corner refinement.
pub trait CornerRefiner<I: ?Sized> {
    fn refine(&mut self, image: &I, corners: &mut [Pt2], criteria: &TermCriteria);
}

/// Refiner that keeps corners as found.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefinement;

impl<I: ?Sized> CornerRefiner<I> for NoRefinement {
    fn refine(&mut self, _image: &I, _corners: &mut [Pt2], _criteria: &TermCriteria) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSample {
    /// 1-based capture number, shared by automatic and manual captures.
    pub index: usize,
    pub method: CaptureMethod,
    pub view: CorrespondenceView,
    pub measurement: BoardMeasurement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Accepted(CalibrationSample),
    Rejected(RejectReason),
}

/// Corner finding, refinement and gating for one camera.
pub struct CaptureStation<F, R> {
    board: BoardSpec,
    finder: F,
    refiner: R,
    gatekeeper: CaptureGatekeeper,
}

impl<F, R> CaptureStation<F, R> {
    pub fn new(board: BoardSpec, finder: F, refiner: R, config: CaptureConfig) -> Self {
        Self {
            board,
            finder,
            refiner,
            gatekeeper: CaptureGatekeeper::new(config),
        }
    }

    pub fn board(&self) -> &BoardSpec {
        &self.board
    }

    pub fn gatekeeper(&self) -> &CaptureGatekeeper {
        &self.gatekeeper
    }

    pub fn gatekeeper_mut(&mut self) -> &mut CaptureGatekeeper {
        &mut self.gatekeeper
    }

    /// Run one frame through corner finding, refinement and the gates.
    pub fn process<I: ?Sized>(
        &mut self,
        image: &I,
        frame_width: u32,
        frame_height: u32,
        now: Instant,
        method: CaptureMethod,
    ) -> Result<CaptureOutcome>
    where
        F: CornerFinder<I>,
        R: CornerRefiner<I>,
    {
        let criteria = self.gatekeeper.config().refine;
        let corners = self
            .finder
            .find_corners(image, &self.board)
            .filter(|c| c.len() == self.board.corner_count())
            .map(|mut c| {
                self.refiner.refine(image, &mut c, &criteria);
                c
            });

        let frame_area = frame_width as Real * frame_height as Real;
        let index = self.gatekeeper.saved_count();
        let decision = match method {
            CaptureMethod::Auto => self.gatekeeper.evaluate(corners.as_deref(), frame_area, now),
            CaptureMethod::Manual => self.gatekeeper.accept_manual(corners.as_deref(), frame_area),
        };

        match (decision, corners) {
            (GateDecision::Accept(measurement), Some(corners)) => {
                info!(
                    "captured sample #{index} ({method:?}), board covers {:.1}% of the frame",
                    100.0 * measurement.area_ratio
                );
                Ok(CaptureOutcome::Accepted(CalibrationSample {
                    index,
                    method,
                    view: self.board.view(corners)?,
                    measurement,
                }))
            }
            (GateDecision::Reject(reason), _) => {
                debug!("frame rejected: {reason:?}");
                Ok(CaptureOutcome::Rejected(reason))
            }
            (GateDecision::Accept(_), None) => Ok(CaptureOutcome::Rejected(RejectReason::BoardNotFound)),
        }
    }
}
