//! Observation types for calibration data.
//!
//! A [`CorrespondenceView`] is one accepted calibration image: the known
//! board corners in board coordinates paired with their detected pixel
//! positions, in the same order.

use crate::{Pt2, Pt3, Real};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// A single view containing 2D-3D point correspondences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceView {
    /// 3D points in board coordinates (z = 0 for planar targets).
    pub points_3d: Vec<Pt3>,
    /// Corresponding 2D pixel observations.
    pub points_2d: Vec<Pt2>,
}

impl CorrespondenceView {
    /// # Errors
    ///
    /// Returns an error if the 3D and 2D point counts don't match.
    pub fn new(points_3d: Vec<Pt3>, points_2d: Vec<Pt2>) -> Result<Self> {
        ensure!(
            points_3d.len() == points_2d.len(),
            "3D / 2D point counts must match: {} vs {}",
            points_3d.len(),
            points_2d.len()
        );
        Ok(Self {
            points_3d,
            points_2d,
        })
    }

    /// Board points projected onto the board plane.
    pub fn planar_points(&self) -> Vec<Pt2> {
        self.points_3d
            .iter()
            .map(|p3| Pt2::new(p3.x, p3.y))
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points_3d.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points_3d.is_empty()
    }
}

/// Inner-corner layout of a printed checkerboard.
///
/// A board of 7×7 squares has 6×6 inner corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    /// Inner corners along the board x axis.
    pub cols: usize,
    /// Inner corners along the board y axis.
    pub rows: usize,
    /// Edge length of one square (meters).
    pub square_size: Real,
}

impl Default for BoardSpec {
    fn default() -> Self {
        Self {
            cols: 6,
            rows: 6,
            square_size: 0.025,
        }
    }
}

impl BoardSpec {
    pub fn corner_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Board corners on the z = 0 plane, x varying fastest.
    ///
    /// This is the order in which corner finders report inner corners.
    pub fn object_points(&self) -> Vec<Pt3> {
        let mut points = Vec::with_capacity(self.corner_count());
        for j in 0..self.rows {
            for i in 0..self.cols {
                points.push(Pt3::new(
                    i as Real * self.square_size,
                    j as Real * self.square_size,
                    0.0,
                ));
            }
        }
        points
    }

    /// Pair detected corners with the board layout.
    ///
    /// # Errors
    ///
    /// Fails unless exactly `rows * cols` corners were supplied.
    pub fn view(&self, image_points: Vec<Pt2>) -> Result<CorrespondenceView> {
        ensure!(
            image_points.len() == self.corner_count(),
            "expected {} board corners ({}x{}), got {}",
            self.corner_count(),
            self.cols,
            self.rows,
            image_points.len()
        );
        CorrespondenceView::new(self.object_points(), image_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_counts_fail() {
        let err = CorrespondenceView::new(vec![Pt3::origin()], vec![]).unwrap_err();
        assert!(err.to_string().contains("must match"));
    }

    #[test]
    fn object_points_are_x_major() {
        let board = BoardSpec {
            cols: 3,
            rows: 2,
            square_size: 0.5,
        };
        let pts = board.object_points();
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[1], Pt3::new(0.5, 0.0, 0.0));
        assert_eq!(pts[3], Pt3::new(0.0, 0.5, 0.0));
        assert!(pts.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn view_requires_full_board() {
        let board = BoardSpec::default();
        assert!(board.view(vec![Pt2::origin(); 35]).is_err());
        let view = board.view(vec![Pt2::origin(); 36]).unwrap();
        assert_eq!(view.len(), 36);
        assert_eq!(view.planar_points()[7], Pt2::new(0.025, 0.025));
    }
}
