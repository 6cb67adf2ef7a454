use monorange_core::{BoundingBox, Detection, Pt2, Real};
use serde::Serialize;

use crate::Frame;

/// Top-left anchor of the warning banner (pixels).
pub const BANNER_ANCHOR: (Real, Real) = (20.0, 50.0);
/// Box labels sit this many pixels above the box.
const LABEL_OFFSET_PX: Real = 10.0;

/// A detection together with its estimated ground distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangedDetection {
    pub detection: Detection,
    pub distance_m: Real,
}

impl RangedDetection {
    /// `"person 1.27 m (93.4%)"`
    pub fn label(&self) -> String {
        format!(
            "{} {:.2} m ({:.1}%)",
            self.detection.label,
            self.distance_m,
            100.0 * self.detection.confidence
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxAnnotation {
    pub bbox: BoundingBox,
    pub label: String,
    pub label_anchor: Pt2,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Banner {
    pub text: String,
    pub anchor: Pt2,
}

/// Frame plus everything to draw on it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedFrame<P> {
    pub frame: Frame<P>,
    pub detections: Vec<RangedDetection>,
    pub boxes: Vec<BoxAnnotation>,
    pub banner: Option<Banner>,
}

impl<P> AnnotatedFrame<P> {
    pub fn new(frame: Frame<P>, detections: Vec<RangedDetection>, alert: Option<String>) -> Self {
        let boxes = detections
            .iter()
            .map(|d| BoxAnnotation {
                bbox: d.detection.bbox,
                label: d.label(),
                label_anchor: Pt2::new(d.detection.bbox.x1, d.detection.bbox.y1 - LABEL_OFFSET_PX),
            })
            .collect();
        let banner = alert.map(|text| Banner {
            text,
            anchor: Pt2::new(BANNER_ANCHOR.0, BANNER_ANCHOR.1),
        });
        Self {
            frame,
            detections,
            boxes,
            banner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn ranged(label: &str, confidence: Real, distance_m: Real) -> RangedDetection {
        RangedDetection {
            detection: Detection::new(label, BoundingBox::new(100.0, 40.0, 180.0, 210.0), confidence),
            distance_m,
        }
    }

    #[test]
    fn label_shows_distance_and_confidence() {
        assert_eq!(ranged("person", 0.934, 1.2702).label(), "person 1.27 m (93.4%)");
        assert_eq!(ranged("car", 1.0, 12.0).label(), "car 12.00 m (100.0%)");
    }

    #[test]
    fn boxes_and_banner_are_placed() {
        let frame = Frame {
            index: 3,
            captured_at: Instant::now(),
            width: 640,
            height: 480,
            pixels: (),
        };
        let annotated = AnnotatedFrame::new(
            frame,
            vec![ranged("dog", 0.5, 2.0)],
            Some("Warning! dog ahead.".into()),
        );
        assert_eq!(annotated.boxes.len(), 1);
        assert_eq!(annotated.boxes[0].label_anchor, Pt2::new(100.0, 30.0));
        let banner = annotated.banner.unwrap();
        assert_eq!(banner.text, "Warning! dog ahead.");
        assert_eq!(banner.anchor, Pt2::new(20.0, 50.0));
    }

    #[test]
    fn no_alert_means_no_banner() {
        let frame = Frame {
            index: 0,
            captured_at: Instant::now(),
            width: 640,
            height: 480,
            pixels: (),
        };
        let annotated = AnnotatedFrame::new(frame, vec![], None);
        assert!(annotated.banner.is_none());
        assert!(annotated.boxes.is_empty());
    }
}
