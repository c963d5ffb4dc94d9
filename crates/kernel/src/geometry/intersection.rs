//! Axis and plane primitives used by constraint bookkeeping.

use serde::{Deserialize, Serialize};

use super::point::Point3d;
use super::vector::Vec3;

/// Cross products shorter than this mean the inputs are parallel.
const PARALLEL_TOL: f64 = 1e-9;

/// An infinite line through `point` along `direction`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLine {
    pub point: Point3d,
    pub direction: Vec3,
}

impl AxisLine {
    pub fn new(point: Point3d, direction: Vec3) -> Self {
        Self { point, direction }
    }

    pub fn closest_point(&self, p: &Point3d) -> Point3d {
        let d = self.direction.normalize_or(Vec3::Z);
        self.point + d * (*p - self.point).dot(&d)
    }

    pub fn distance_to_point(&self, p: &Point3d) -> f64 {
        p.distance_to(&self.closest_point(p))
    }
}

/// Shortest distance between two infinite axes.
///
/// Parallel axes use the perpendicular offset; skew axes the common normal.
pub fn distance_between_axes(a: &AxisLine, b: &AxisLine) -> f64 {
    let da = a.direction.normalize_or(Vec3::Z);
    let db = b.direction.normalize_or(Vec3::Z);
    let offset = b.point - a.point;
    let normal = da.cross(&db);
    let sin = normal.length();
    if sin < PARALLEL_TOL {
        return offset.reject_from(&da).length();
    }
    (offset.dot(&normal) / sin).abs()
}

/// Direction of the line where two planes with the given normals meet.
/// `None` when the planes are parallel.
pub fn plane_intersection(n1: &Vec3, n2: &Vec3) -> Option<Vec3> {
    let a = n1.normalized()?;
    let b = n2.normalized()?;
    let d = a.cross(&b);
    if d.length() < PARALLEL_TOL {
        return None;
    }
    d.normalized()
}

/// Full intersection line of two planes given by point and normal.
pub fn plane_intersection_line(
    p1: &Point3d,
    n1: &Vec3,
    p2: &Point3d,
    n2: &Vec3,
) -> Option<AxisLine> {
    let dir = plane_intersection(n1, n2)?;
    let a = n1.normalized()?;
    let b = n2.normalized()?;
    // Point on both planes, in the span of the two normals.
    let h1 = a.dot(&p1.to_vec3());
    let h2 = b.dot(&p2.to_vec3());
    let ab = a.dot(&b);
    let det = 1.0 - ab * ab;
    let c1 = (h1 - h2 * ab) / det;
    let c2 = (h2 - h1 * ab) / det;
    Some(AxisLine::new(Point3d::from_vec3(a * c1 + b * c2), dir))
}

/// Two orthonormal directions spanning the plane perpendicular to `normal`.
pub fn plane_degrees_of_freedom(normal: &Vec3) -> [Vec3; 2] {
    let n = normal.normalize_or(Vec3::Z);
    let d1 = n.any_perpendicular();
    let d2 = n.cross(&d1).normalize_or(Vec3::Y);
    [d1, d2]
}
