use nalgebra::{Isometry3, Matrix3, Point2, Point3, Vector2, Vector3};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Iso3 = Isometry3<Real>;

pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

/// Dehomogenise a 3-vector. Returns `None` when the last component vanishes.
pub fn from_homogeneous(v: &Vec3) -> Option<Pt2> {
    if v.z.abs() <= Real::EPSILON {
        return None;
    }
    Some(Pt2::new(v.x / v.z, v.y / v.z))
}

/// Axis-aligned bounds `(min, max)` of a point set, or `None` if it is empty.
pub fn bounds_2d(points: &[Pt2]) -> Option<(Pt2, Pt2)> {
    let first = points.first()?;
    let mut min = *first;
    let mut max = *first;
    for p in &points[1..] {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_cover_all_points() {
        let pts = vec![Pt2::new(3.0, 1.0), Pt2::new(-1.0, 4.0), Pt2::new(2.0, -2.0)];
        let (min, max) = bounds_2d(&pts).unwrap();
        assert_eq!(min, Pt2::new(-1.0, -2.0));
        assert_eq!(max, Pt2::new(3.0, 4.0));
        assert!(bounds_2d(&[]).is_none());
    }

    #[test]
    fn homogeneous_at_infinity_is_rejected() {
        assert!(from_homogeneous(&Vec3::new(1.0, 2.0, 0.0)).is_none());
        let p = from_homogeneous(&Vec3::new(2.0, 4.0, 2.0)).unwrap();
        assert_eq!(p, Pt2::new(1.0, 2.0));
    }
}
