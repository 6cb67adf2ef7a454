//! Recorded inputs and outputs for offline runs.
//!
//! Board streams and detection streams are JSON lines, one frame per line,
//! with a `timestamp_s` offset from the start of the recording.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDateTime, TimeDelta};
use monorange_core::{BoardSpec, CorrespondenceView, Detection, Pt2, Real};
use monorange_monitor::{
    AnnotatedFrame, BoxError, Detector, Frame, FrameSink, FrameSource, RangedDetection,
};
use monorange_pipeline::{CornerFinder, ImageSize};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Samples in the layout `calibrate --input` reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationInput {
    pub image_size: ImageSize,
    pub views: Vec<CorrespondenceView>,
}

/// One recorded frame of checkerboard detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardFrame {
    pub timestamp_s: Real,
    pub width: u32,
    pub height: u32,
    /// Raw corners as reported by the corner finder, absent when no board
    /// was found.
    #[serde(default)]
    pub corners: Option<Vec<[Real; 2]>>,
    /// Operator pressed the capture key on this frame.
    #[serde(default)]
    pub manual: bool,
}

/// Corner finder over recorded frames.
pub struct RecordedCorners;

impl CornerFinder<BoardFrame> for RecordedCorners {
    fn find_corners(&mut self, image: &BoardFrame, _board: &BoardSpec) -> Option<Vec<Pt2>> {
        image
            .corners
            .as_ref()
            .map(|c| c.iter().map(|[x, y]| Pt2::new(*x, *y)).collect())
    }
}

/// One recorded frame of detector output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub timestamp_s: Real,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

pub fn offset(t0: Instant, timestamp_s: Real) -> Result<Instant> {
    Duration::try_from_secs_f64(timestamp_s)
        .ok()
        .and_then(|offset| t0.checked_add(offset))
        .ok_or_else(|| anyhow!("invalid timestamp {timestamp_s}"))
}

/// Wall-clock time of a frame recorded `timestamp_s` after `started`.
pub fn wall_clock(started: &NaiveDateTime, timestamp_s: Real) -> Result<NaiveDateTime> {
    TimeDelta::try_milliseconds((timestamp_s * 1000.0) as i64)
        .and_then(|delta| started.checked_add_signed(delta))
        .ok_or_else(|| anyhow!("timestamp {timestamp_s} is out of calendar range"))
}

/// Typed reader over a JSON-lines file.
pub struct JsonLines<T> {
    label: String,
    lines: Lines<BufReader<File>>,
    lineno: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: DeserializeOwned> JsonLines<T> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Ok(Self {
            label: path.display().to_string(),
            lines: BufReader::new(file).lines(),
            lineno: 0,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Iterator for JsonLines<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.lineno += 1;
            let line = match line {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(&line)
                    .with_context(|| format!("{}:{}: malformed frame", self.label, self.lineno)),
            );
        }
    }
}

/// Replays recorded detector output as a frame source. The detections ride
/// along as the frame payload.
pub struct ReplaySource {
    frames: JsonLines<DetectionFrame>,
    t0: Instant,
    next_index: u64,
}

impl ReplaySource {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            frames: JsonLines::open(path)?,
            t0: Instant::now(),
            next_index: 0,
        })
    }
}

impl FrameSource for ReplaySource {
    type Pixels = Vec<Detection>;

    fn read_frame(&mut self) -> Result<Option<Frame<Vec<Detection>>>, BoxError> {
        let Some(record) = self.frames.next() else {
            return Ok(None);
        };
        let record = record.map_err(BoxError::from)?;
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame {
            index,
            captured_at: offset(self.t0, record.timestamp_s).map_err(BoxError::from)?,
            width: record.width,
            height: record.height,
            pixels: record.detections,
        }))
    }
}

/// Detector that returns the detections recorded with the frame.
pub struct ReplayDetector;

impl Detector<Vec<Detection>> for ReplayDetector {
    fn detect(&mut self, frame: &Frame<Vec<Detection>>) -> Result<Vec<Detection>, BoxError> {
        Ok(frame.pixels.clone())
    }
}

#[derive(Debug, Serialize)]
struct AnnotatedRecord<'a> {
    index: u64,
    width: u32,
    height: u32,
    detections: &'a [RangedDetection],
    labels: Vec<&'a str>,
    alert: Option<&'a str>,
}

/// Writes one JSON object per annotated frame.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write, P> FrameSink<P> for JsonLinesSink<W> {
    fn write_frame(&mut self, frame: &AnnotatedFrame<P>) -> Result<(), BoxError> {
        let record = AnnotatedRecord {
            index: frame.frame.index,
            width: frame.frame.width,
            height: frame.frame.height,
            detections: &frame.detections,
            labels: frame.boxes.iter().map(|b| b.label.as_str()).collect(),
            alert: frame.banner.as_ref().map(|b| b.text.as_str()),
        };
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), BoxError> {
        self.out.flush()?;
        Ok(())
    }
}
