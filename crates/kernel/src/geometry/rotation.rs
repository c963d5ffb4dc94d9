//! Rotation representations and conversions.
//!
//! The solver stores orientations as azimuth/elevation/angle triples, the
//! document model as quaternions, and constraint bookkeeping works with
//! axis-angle pairs. Euler ZYX angles are provided for reporting and for
//! fixtures authored in yaw/pitch/roll.

use nalgebra::{Matrix3, Rotation3, Unit, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::ops::Mul;

use super::vector::Vec3;

/// Below this sine-of-half-angle the rotation axis is considered undefined.
const DEGENERATE_AXIS: f64 = 1e-15;

/// `|cos(pitch)|` below which Euler angles are treated as gimbal-locked.
const GIMBAL_LOCK: f64 = 1e-12;

// ── Quaternion ───────────────────────────────────────────────────────────────

/// A rotation quaternion `w + xi + yj + zk` (Hamilton convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// Rotation of `angle` radians about `axis`. A degenerate axis yields identity.
    pub fn from_axis_angle(axis: Vec3, angle: f64) -> Self {
        match axis.normalized() {
            Some(u) => {
                let (s, c) = (angle * 0.5).sin_cos();
                Self::new(c, u.x * s, u.y * s, u.z * s)
            }
            None => Self::IDENTITY,
        }
    }

    pub fn vector_part(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n < DEGENERATE_AXIS {
            return Self::IDENTITY;
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    pub fn conjugate(&self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.w, self.x, self.y, self.z]
    }

    /// Largest component difference to `other`, treating `q` and `-q` as the same rotation.
    pub fn max_component_difference(&self, other: &Self) -> f64 {
        let a = self.to_array();
        let b = other.to_array();
        let same = (0..4).map(|i| (a[i] - b[i]).abs()).fold(0.0, f64::max);
        let flipped = (0..4).map(|i| (a[i] + b[i]).abs()).fold(0.0, f64::max);
        same.min(flipped)
    }

    /// Rotate a vector: `q v q*`.
    pub fn rotate_vector(&self, v: &Vec3) -> Vec3 {
        let u = self.vector_part();
        let t = u.cross(v) * 2.0;
        *v + t * self.w + u.cross(&t)
    }

    /// Axis-angle with the angle in `[0, π]`. An identity rotation reports axis +X.
    pub fn to_axis_angle(&self) -> AxisAngle {
        let mut q = self.normalized();
        if q.w < 0.0 {
            q = Self::new(-q.w, -q.x, -q.y, -q.z);
        }
        let v = q.vector_part();
        let s = v.length();
        if s < DEGENERATE_AXIS {
            return AxisAngle::new(Vec3::X, 0.0);
        }
        AxisAngle::new(v / s, 2.0 * s.atan2(q.w))
    }

    fn to_nalgebra(self) -> nalgebra::Quaternion<f64> {
        nalgebra::Quaternion::new(self.w, self.x, self.y, self.z)
    }

    fn from_nalgebra(q: &nalgebra::Quaternion<f64>) -> Self {
        Self::new(q.w, q.i, q.j, q.k)
    }

    pub fn to_unit_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::new_unchecked(self.normalized().to_nalgebra())
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        self.to_unit_quaternion().to_rotation_matrix().into_inner()
    }

    /// Quaternion of a proper rotation matrix.
    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*m));
        Self::from_nalgebra(q.quaternion()).normalized()
    }

    pub fn to_euler_zyx(&self) -> EulerZyx {
        EulerZyx::from_matrix(&self.to_matrix())
    }
}

/// Hamilton product: `(a * b)` applies `b` first, then `a`.
impl Mul for Quaternion {
    type Output = Self;
    fn mul(self, b: Self) -> Self::Output {
        Self::from_nalgebra(&(self.to_nalgebra() * b.to_nalgebra()))
    }
}

// ── Axis-angle ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisAngle {
    /// Unit rotation axis.
    pub axis: Vec3,
    /// Rotation angle in radians.
    pub angle: f64,
}

impl AxisAngle {
    pub fn new(axis: Vec3, angle: f64) -> Self {
        Self { axis, angle }
    }

    /// Axis from azimuth/elevation.
    pub fn from_azimuth_elevation(azimuth: f64, elevation: f64, angle: f64) -> Self {
        Self::new(azimuth_elevation_to_axis(azimuth, elevation), angle)
    }

    pub fn to_quaternion(&self) -> Quaternion {
        Quaternion::from_axis_angle(self.axis, self.angle)
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        rotation_matrix_about_axis(&self.axis, self.angle)
    }

    pub fn to_euler_zyx(&self) -> EulerZyx {
        EulerZyx::from_matrix(&self.to_matrix())
    }

    /// `(azimuth, elevation)` of the axis.
    pub fn azimuth_elevation(&self) -> (f64, f64) {
        axis_to_azimuth_elevation(&self.axis)
    }

    /// Rotate `v` by this rotation (Rodrigues' formula).
    pub fn rotate_vector(&self, v: &Vec3) -> Vec3 {
        let k = self.axis.normalize_or(Vec3::X);
        let (s, c) = self.angle.sin_cos();
        *v * c + k.cross(v) * s + k * (k.dot(v) * (1.0 - c))
    }
}

/// Rotation matrix of `angle` about `axis`; a degenerate axis gives identity.
pub fn rotation_matrix_about_axis(axis: &Vec3, angle: f64) -> Matrix3<f64> {
    let Some(k) = axis.normalized() else {
        return Matrix3::identity();
    };
    Rotation3::from_axis_angle(&Unit::new_unchecked(k.into()), angle).into_inner()
}

// ── Euler ZYX ────────────────────────────────────────────────────────────────

/// Intrinsic Z-Y-X angles: `R = Rz(yaw) * Ry(pitch) * Rx(roll)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerZyx {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl EulerZyx {
    pub fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self { yaw, pitch, roll }
    }

    pub fn to_quaternion(&self) -> Quaternion {
        Quaternion::from_axis_angle(Vec3::Z, self.yaw)
            * Quaternion::from_axis_angle(Vec3::Y, self.pitch)
            * Quaternion::from_axis_angle(Vec3::X, self.roll)
    }

    pub fn to_axis_angle(&self) -> AxisAngle {
        self.to_quaternion().to_axis_angle()
    }

    /// True when pitch sits at ±π/2, where yaw and roll share one freedom.
    pub fn is_gimbal_locked(&self) -> bool {
        self.pitch.cos().abs() < GIMBAL_LOCK
    }

    /// Decompose a rotation matrix.
    ///
    /// At gimbal lock (pitch = ±π/2) yaw and roll are not separable; roll is
    /// pinned to zero and the combined rotation is reported as yaw.
    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        let sin_pitch = (-m[(2, 0)]).clamp(-1.0, 1.0);
        let cos_pitch = (m[(0, 0)] * m[(0, 0)] + m[(1, 0)] * m[(1, 0)]).sqrt();
        if cos_pitch < GIMBAL_LOCK.sqrt() {
            let pitch = if sin_pitch > 0.0 { FRAC_PI_2 } else { -FRAC_PI_2 };
            let yaw = (-m[(0, 1)]).atan2(m[(1, 1)]);
            return Self::new(yaw, pitch, 0.0);
        }
        Self::new(
            m[(1, 0)].atan2(m[(0, 0)]),
            sin_pitch.atan2(cos_pitch),
            m[(2, 1)].atan2(m[(2, 2)]),
        )
    }
}

// ── Azimuth / elevation ──────────────────────────────────────────────────────

/// Unit axis `(cos e cos a, cos e sin a, sin e)`.
pub fn azimuth_elevation_to_axis(azimuth: f64, elevation: f64) -> Vec3 {
    let (sa, ca) = azimuth.sin_cos();
    let (se, ce) = elevation.sin_cos();
    Vec3::new(ce * ca, ce * sa, se)
}

/// Inverse of [`azimuth_elevation_to_axis`]. Vertical axes report azimuth 0.
pub fn axis_to_azimuth_elevation(axis: &Vec3) -> (f64, f64) {
    let u = axis.normalize_or(Vec3::X);
    let horizontal = (u.x * u.x + u.y * u.y).sqrt();
    let azimuth = if horizontal < DEGENERATE_AXIS {
        0.0
    } else {
        u.y.atan2(u.x)
    };
    let elevation = u.z.atan2(horizontal);
    (azimuth, elevation)
}

/// Wrap an angle into `[-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Smallest rotation taking direction `a` onto direction `b`.
///
/// Antiparallel inputs rotate by π about an arbitrary axis perpendicular to `a`.
pub fn rotation_required_to_rotate_a_vector_to_be_aligned_to_another_vector(
    a: &Vec3,
    b: &Vec3,
) -> AxisAngle {
    let ua = a.normalize_or(Vec3::X);
    let ub = b.normalize_or(Vec3::X);
    let cross = ua.cross(&ub);
    let sin = cross.length();
    let cos = ua.dot(&ub);
    if sin < 1e-12 {
        if cos > 0.0 {
            return AxisAngle::new(Vec3::X, 0.0);
        }
        return AxisAngle::new(ua.any_perpendicular(), PI);
    }
    AxisAngle::new(cross / sin, sin.atan2(cos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_vec_eq(a: Vec3, b: Vec3, tol: f64) {
        assert!((a - b).length() < tol, "{a:?} != {b:?}");
    }

    #[test]
    fn quaternion_rotates_x_onto_y_about_z() {
        let q = Quaternion::from_axis_angle(Vec3::Z, FRAC_PI_2);
        assert_vec_eq(q.rotate_vector(&Vec3::X), Vec3::Y, 1e-12);
    }

    #[test]
    fn identity_axis_angle_is_degenerate_x_axis() {
        let aa = Quaternion::IDENTITY.to_axis_angle();
        assert_eq!(aa.angle, 0.0);
        assert_eq!(aa.azimuth_elevation(), (0.0, 0.0));
    }

    #[test]
    fn negative_quaternion_gives_same_axis_angle() {
        let q = Quaternion::from_axis_angle(Vec3::new(1.0, 2.0, 3.0), 1.2);
        let neg = Quaternion::new(-q.w, -q.x, -q.y, -q.z);
        let a = q.to_axis_angle();
        let b = neg.to_axis_angle();
        assert_relative_eq!(a.angle, b.angle, epsilon = 1e-12);
        assert_vec_eq(a.axis, b.axis, 1e-12);
        assert!(q.max_component_difference(&neg) < 1e-15);
    }

    #[test]
    fn matrix_round_trip() {
        let q = Quaternion::from_axis_angle(Vec3::new(-1.0, 0.3, 0.7), 2.9);
        let back = Quaternion::from_matrix(&q.to_matrix());
        assert!(q.max_component_difference(&back) < 1e-12);
    }

    #[test]
    fn unit_quaternion_agrees_with_rotate_vector() {
        let q = Quaternion::from_axis_angle(Vec3::new(0.2, -1.0, 0.4), 1.7);
        let v = Vec3::new(3.0, -1.0, 2.0);
        let via_nalgebra: Vec3 = (q.to_unit_quaternion() * nalgebra::Vector3::from(v)).into();
        assert_vec_eq(via_nalgebra, q.rotate_vector(&v), 1e-12);
        let via_matrix: Vec3 = (q.to_matrix() * nalgebra::Vector3::from(v)).into();
        assert_vec_eq(via_matrix, q.rotate_vector(&v), 1e-12);
    }

    #[test]
    fn composition_applies_right_operand_first() {
        let a = Quaternion::from_axis_angle(Vec3::Z, FRAC_PI_2);
        let b = Quaternion::from_axis_angle(Vec3::X, FRAC_PI_2);
        // b takes Y to Z, a leaves Z alone.
        assert_vec_eq((a * b).rotate_vector(&Vec3::Y), Vec3::Z, 1e-12);
    }

    #[test]
    fn euler_gimbal_lock_is_special_cased() {
        let e = EulerZyx::new(0.4, FRAC_PI_2, 0.3);
        let back = e.to_quaternion().to_euler_zyx();
        assert!(back.is_gimbal_locked());
        assert_eq!(back.roll, 0.0);
        let original = e.to_quaternion();
        assert!(original.max_component_difference(&back.to_quaternion()) < 1e-9);
    }

    #[test]
    fn euler_round_trip_away_from_lock() {
        let e = EulerZyx::new(-2.1, 0.7, 1.4);
        let back = e.to_quaternion().to_euler_zyx();
        assert_relative_eq!(back.yaw, e.yaw, epsilon = 1e-10);
        assert_relative_eq!(back.pitch, e.pitch, epsilon = 1e-10);
        assert_relative_eq!(back.roll, e.roll, epsilon = 1e-10);
    }

    #[test]
    fn azimuth_elevation_of_diagonal_axis() {
        let axis = Vec3::new(-1.0, -1.0, 1.0);
        let (a, e) = axis_to_azimuth_elevation(&axis);
        assert_relative_eq!(a, -2.356194490192345, epsilon = 1e-12);
        assert_relative_eq!(e, 0.6154797086703875, epsilon = 1e-12);
        assert_vec_eq(azimuth_elevation_to_axis(a, e), axis.normalize_or(Vec3::X), 1e-12);
    }

    #[test]
    fn vertical_axis_has_zero_azimuth() {
        assert_eq!(axis_to_azimuth_elevation(&Vec3::Z), (0.0, FRAC_PI_2));
    }

    #[test]
    fn rotation_aligning_vectors() {
        let a = Vec3::new(1.0, 2.0, -0.5);
        let b = Vec3::new(-3.0, 0.1, 2.0);
        let r = rotation_required_to_rotate_a_vector_to_be_aligned_to_another_vector(&a, &b);
        let rotated = r.rotate_vector(&a.normalize_or(Vec3::X));
        assert_vec_eq(rotated, b.normalize_or(Vec3::X), 1e-12);
    }

    #[test]
    fn rotation_aligning_antiparallel_vectors() {
        let r = rotation_required_to_rotate_a_vector_to_be_aligned_to_another_vector(
            &Vec3::Z,
            &(-Vec3::Z),
        );
        assert_relative_eq!(r.angle, PI);
        assert_vec_eq(r.rotate_vector(&Vec3::Z), -Vec3::Z, 1e-12);
    }

    #[test]
    fn rodrigues_matches_quaternion() {
        let aa = AxisAngle::new(Vec3::new(0.2, -0.9, 0.4).normalize_or(Vec3::X), 0.8);
        let v = Vec3::new(1.0, 2.0, 3.0);
        let m = aa.to_matrix() * nalgebra::Vector3::new(v.x, v.y, v.z);
        assert_vec_eq(Vec3::from(m), aa.to_quaternion().rotate_vector(&v), 1e-12);
    }

    #[test]
    fn wrap_angle_stays_in_range() {
        assert_relative_eq!(wrap_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-12);
    }
}
