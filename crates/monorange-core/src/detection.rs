use serde::{Deserialize, Serialize};

use crate::{Pt2, Real};

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left and `(x2, y2)`
/// bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: Real,
    pub y1: Real,
    pub x2: Real,
    pub y2: Real,
}

impl BoundingBox {
    pub fn new(x1: Real, y1: Real, x2: Real, y2: Real) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box spanning a set of points; `None` for an empty set.
    pub fn enclosing(points: &[Pt2]) -> Option<Self> {
        let (min, max) = crate::bounds_2d(points)?;
        Some(Self::new(min.x, min.y, max.x, max.y))
    }

    pub fn width(&self) -> Real {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> Real {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> Real {
        self.width() * self.height()
    }

    pub fn center(&self) -> Pt2 {
        Pt2::new(0.5 * (self.x1 + self.x2), 0.5 * (self.y1 + self.y2))
    }

    /// Image row where the object meets the ground.
    pub fn bottom(&self) -> Real {
        self.y2
    }
}

/// One object reported by the detector for a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub bbox: BoundingBox,
    /// Detector score in `[0, 1]`.
    pub confidence: Real,
}

impl Detection {
    /// Confidence is clamped into `[0, 1]`; NaN becomes zero.
    pub fn new(label: impl Into<String>, bbox: BoundingBox, confidence: Real) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            label: label.into(),
            bbox,
            confidence,
        }
    }
}
