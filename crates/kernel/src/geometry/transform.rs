use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::point::Point3d;
use super::rotation::Quaternion;
use super::vector::Vec3;

/// A rigid transform: rotate about the local origin, then translate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Placement {
    pub position: Point3d,
    pub rotation: Quaternion,
}

impl Placement {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new(position: Point3d, rotation: Quaternion) -> Self {
        Self { position, rotation }
    }

    pub fn from_translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(Point3d::new(dx, dy, dz), Quaternion::IDENTITY)
    }

    /// Rotation by `rotation` about the world point `pivot`.
    pub fn rotation_about(pivot: &Point3d, rotation: Quaternion) -> Self {
        let moved = rotation.rotate_vector(&pivot.to_vec3());
        Self::new(Point3d::from_vec3(pivot.to_vec3() - moved), rotation)
    }

    /// Transform a point (applies translation).
    pub fn transform_point(&self, p: &Point3d) -> Point3d {
        self.position + self.rotation.rotate_vector(&p.to_vec3())
    }

    /// Transform a vector (no translation).
    pub fn transform_vector(&self, v: &Vec3) -> Vec3 {
        self.rotation.rotate_vector(v)
    }

    /// Express a world vector in this placement's local frame.
    ///
    /// Solves `R * v_local = v_world` instead of multiplying by the inverse, so
    /// a slightly non-orthonormal rotation still round-trips exactly.
    pub fn untransform_vector(&self, v: &Vec3) -> Vec3 {
        let m = self.rotation.to_matrix();
        let rhs: Vector3<f64> = (*v).into();
        match m.lu().solve(&rhs) {
            Some(local) => Vec3::from(local),
            None => self.rotation.conjugate().rotate_vector(v),
        }
    }

    /// Express a world point in this placement's local frame.
    pub fn untransform_point(&self, p: &Point3d) -> Point3d {
        Point3d::from_vec3(self.untransform_vector(&(*p - self.position)))
    }

    /// Compose two transforms: `self` applied after `other`.
    pub fn then(&self, other: &Placement) -> Placement {
        Placement::new(
            self.transform_point(&other.position),
            (self.rotation * other.rotation).normalized(),
        )
    }

    pub fn inverse(&self) -> Placement {
        let inv = self.rotation.conjugate();
        let p = inv.rotate_vector(&self.position.to_vec3());
        Placement::new(Point3d::from_vec3(-p), inv)
    }

    /// True when translations differ by at most `linear_tol` and quaternion
    /// components by at most `rotation_tol`.
    pub fn is_close(&self, other: &Placement, linear_tol: f64, rotation_tol: f64) -> bool {
        let dp = self.position - other.position;
        dp.x.abs() <= linear_tol
            && dp.y.abs() <= linear_tol
            && dp.z.abs() <= linear_tol
            && self.rotation.max_component_difference(&other.rotation) <= rotation_tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_transform_point_with_rotation() {
        // 90 degrees about z: local (1,0,0) -> world (0,1,0) + position
        let p = Placement::new(
            Point3d::new(10.0, 20.0, 30.0),
            Quaternion::from_axis_angle(Vec3::Z, FRAC_PI_2),
        );
        let w = p.transform_point(&Point3d::new(1.0, 0.0, 0.0));
        assert!(w.distance_to(&Point3d::new(10.0, 21.0, 30.0)) < 1e-10);
    }

    #[test]
    fn test_untransform_inverts_transform() {
        let p = Placement::new(
            Point3d::new(1.0, -2.0, 3.0),
            Quaternion::from_axis_angle(Vec3::new(1.0, 1.0, 0.0), 0.7),
        );
        let local = Point3d::new(0.3, 0.2, -5.0);
        let back = p.untransform_point(&p.transform_point(&local));
        assert!(back.distance_to(&local) < 1e-12);
    }

    #[test]
    fn test_inverse_composes_to_identity() {
        let p = Placement::new(
            Point3d::new(4.0, 5.0, 6.0),
            Quaternion::from_axis_angle(Vec3::new(0.0, 1.0, 1.0), -1.3),
        );
        let id = p.then(&p.inverse());
        assert!(id.is_close(&Placement::identity(), 1e-12, 1e-12));
    }

    #[test]
    fn test_rotation_about_pivot_keeps_pivot() {
        let pivot = Point3d::new(1.0, 2.0, 3.0);
        let r = Placement::rotation_about(&pivot, Quaternion::from_axis_angle(Vec3::X, 1.0));
        assert!(r.transform_point(&pivot).distance_to(&pivot) < 1e-12);
    }
}
