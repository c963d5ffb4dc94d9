//! Constraint equations, their closed-form solutions and the DOF reduction
//! each union applies once its equation holds.

use mate_kernel::geometry::rotation::wrap_angle;
use mate_kernel::{
    plane_degrees_of_freedom, rotation_required_to_rotate_a_vector_to_be_aligned_to_another_vector,
    AxisAngle, AxisLine, Placement, Point3d, Vec3,
};
use nalgebra::{DMatrix, DVector};

use crate::constraint::{DirectionConstraint, FeatureKind};
use crate::dof::{apply_dofs, move_cluster, Dof, DofKind};
use crate::solver::Tolerances;
use crate::variables::{ObjectIndex, VariableManager};

/// Directions closer than this (radians) count as parallel or perpendicular.
const DIRECTION_TOL: f64 = 1e-6;
/// A point this close to a rotation axis lies on it.
const ON_AXIS_TOL: f64 = 1e-7;
/// Two pivots closer than this are the same pivot.
const PIVOT_TOL: f64 = 1e-9;

/// A feature captured in its object's own frame at build time.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    pub object: ObjectIndex,
    pub feature: String,
    pub kind: FeatureKind,
    pub position: Point3d,
    /// Absent for point-like features.
    pub axis: Option<Vec3>,
}

impl FeatureFrame {
    pub fn world_point(&self, vm: &VariableManager, x: &[f64]) -> Point3d {
        vm.rotate_and_move(self.object, &self.position, x)
    }

    pub fn world_axis(&self, vm: &VariableManager, x: &[f64]) -> Vec3 {
        self.axis
            .map(|a| vm.rotate(self.object, &a, x))
            .unwrap_or(Vec3::ZERO)
    }

    pub fn is_point_like(&self) -> bool {
        self.kind.is_point_like() || self.axis.is_none()
    }
}

/// The equation a union node imposes between two features.
#[derive(Debug, Clone, PartialEq)]
pub enum UnionGeometry {
    AxisAlignment {
        first: FeatureFrame,
        second: FeatureFrame,
        direction: DirectionConstraint,
    },
    /// Angle between the two axes, in radians.
    Angle {
        first: FeatureFrame,
        second: FeatureFrame,
        angle: f64,
    },
    /// Signed distance of the other feature from the plane feature.
    PlaneOffset {
        first: FeatureFrame,
        second: FeatureFrame,
        offset: f64,
    },
    /// The second feature's point lies on the first feature's axis.
    AxisDistance {
        first: FeatureFrame,
        second: FeatureFrame,
    },
    Vertex {
        first: FeatureFrame,
        second: FeatureFrame,
    },
    /// Freezes the current relative rotation about a shared axis.
    LockRotation {
        first: FeatureFrame,
        second: FeatureFrame,
    },
}

fn parallel(a: &Vec3, b: &Vec3) -> bool {
    a.is_parallel_to(b, DIRECTION_TOL)
}

fn perpendicular(a: &Vec3, b: &Vec3) -> bool {
    let (Some(ua), Some(ub)) = (a.normalized(), b.normalized()) else {
        return true;
    };
    ua.dot(&ub).abs() < DIRECTION_TOL
}

/// `+1` or `-1`: the sense the second axis must take relative to the first.
pub fn alignment_sign(direction: DirectionConstraint, a: &Vec3, b: &Vec3) -> f64 {
    match direction {
        DirectionConstraint::Aligned => 1.0,
        DirectionConstraint::Opposed => -1.0,
        DirectionConstraint::None => {
            if a.dot(b) >= 0.0 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

/// Scalar alignment error: zero exactly when the direction rule is met.
pub fn alignment_error(direction: DirectionConstraint, a: &Vec3, b: &Vec3) -> f64 {
    let cos = a.dot(b);
    match direction {
        DirectionConstraint::None => 1.0 - cos.abs(),
        DirectionConstraint::Aligned => 1.0 - cos,
        DirectionConstraint::Opposed => 1.0 + cos,
    }
}

/// Rotation angle about unit `axis` that gives `m` the cosine `c` with `f`.
/// Picks the solution closest to zero; `None` when no angle reaches `c`.
pub fn single_axis_angle(axis: &Vec3, m: &Vec3, f: &Vec3, c: f64) -> Option<f64> {
    let ma = m.dot(axis);
    let fa = f.dot(axis);
    let mp = *m - *axis * ma;
    let fp = *f - *axis * fa;
    let r = mp.length() * fp.length();
    let want = c - ma * fa;
    if r < 1e-12 {
        return (want.abs() < 1e-9).then_some(0.0);
    }
    let cos_delta = want / r;
    if cos_delta.abs() > 1.0 + 1e-9 {
        return None;
    }
    let delta = cos_delta.clamp(-1.0, 1.0).acos();
    let theta0 = axis.dot(&mp.cross(&fp)).atan2(mp.dot(&fp));
    let a = wrap_angle(theta0 - delta);
    let b = wrap_angle(theta0 + delta);
    Some(if a.abs() <= b.abs() { a } else { b })
}

fn raw_pivot(dof: &Dof) -> Option<Point3d> {
    match &dof.kind {
        DofKind::Placement { pivot, .. } => *pivot,
        _ => None,
    }
}

/// Pin the pivot of raw rotations to `point` (world). Rotations already
/// pinned about another point collapse to one hinge through both points.
fn pin_raw_rotations(
    vm: &VariableManager,
    x: &[f64],
    mut rotations: Vec<Dof>,
    point: &Point3d,
) -> Result<Vec<Dof>, String> {
    if rotations.is_empty() {
        return Ok(rotations);
    }
    let first = &rotations[0];
    let owner = first.owner;
    let local = vm.rotate_and_move_undo(owner, point, x);
    if let Some(p) = raw_pivot(first).filter(|p| p.distance_to(&local) > PIVOT_TOL) {
        let pivot_world = vm.rotate_and_move(owner, &p, x);
        let axis = (*point - pivot_world)
            .normalized()
            .ok_or_else(|| "hinge points coincide".to_string())?;
        let hinge = Dof::axis_rotation(owner, vm.rotate_undo(owner, &axis, x), p).with_cluster(first.cluster.clone());
        return Ok(vec![hinge]);
    }
    for dof in rotations.iter_mut() {
        if let DofKind::Placement { pivot, .. } = &mut dof.kind {
            *pivot = Some(local);
        }
    }
    Ok(rotations)
}

fn count_raw(dofs: &[Dof]) -> usize {
    dofs.iter().filter(|d| d.is_raw()).count()
}

impl UnionGeometry {
    pub fn name(&self) -> &'static str {
        match self {
            UnionGeometry::AxisAlignment { .. } => "AxisAlignmentUnion",
            UnionGeometry::Angle { .. } => "AngleUnion",
            UnionGeometry::PlaneOffset { .. } => "PlaneOffsetUnion",
            UnionGeometry::AxisDistance { .. } => "AxisDistanceUnion",
            UnionGeometry::Vertex { .. } => "VertexUnion",
            UnionGeometry::LockRotation { .. } => "LockRelativeAxialRotationUnion",
        }
    }

    pub fn features(&self) -> (&FeatureFrame, &FeatureFrame) {
        match self {
            UnionGeometry::AxisAlignment { first, second, .. }
            | UnionGeometry::Angle { first, second, .. }
            | UnionGeometry::PlaneOffset { first, second, .. }
            | UnionGeometry::AxisDistance { first, second }
            | UnionGeometry::Vertex { first, second }
            | UnionGeometry::LockRotation { first, second } => (first, second),
        }
    }

    fn features_mut(&mut self) -> (&mut FeatureFrame, &mut FeatureFrame) {
        match self {
            UnionGeometry::AxisAlignment { first, second, .. }
            | UnionGeometry::Angle { first, second, .. }
            | UnionGeometry::PlaneOffset { first, second, .. }
            | UnionGeometry::AxisDistance { first, second }
            | UnionGeometry::Vertex { first, second }
            | UnionGeometry::LockRotation { first, second } => (first, second),
        }
    }

    pub fn objects(&self) -> (ObjectIndex, ObjectIndex) {
        let (a, b) = self.features();
        (a.object, b.object)
    }

    pub(crate) fn remap(&mut self, map: &impl Fn(ObjectIndex) -> ObjectIndex) {
        let (a, b) = self.features_mut();
        a.object = map(a.object);
        b.object = map(b.object);
    }

    /// `(fixed side, moving side)` for the object that `moving` names.
    fn sides(&self, moving: ObjectIndex) -> (&FeatureFrame, &FeatureFrame) {
        let (a, b) = self.features();
        if b.object == moving { (a, b) } else { (b, a) }
    }

    /// `(plane, other)` for a plane offset; the first feature is the plane
    /// unless it is point-like.
    fn plane_sides(&self) -> (&FeatureFrame, &FeatureFrame) {
        let (a, b) = self.features();
        if a.is_point_like() && !b.is_point_like() {
            (b, a)
        } else {
            (a, b)
        }
    }

    pub fn tolerance(&self, tolerances: &Tolerances) -> f64 {
        match self {
            UnionGeometry::AxisDistance { .. } => tolerances.axis_distance,
            _ => tolerances.constraint,
        }
    }

    /// Residual vector driven to zero by Newton iterations.
    pub fn residual(&self, vm: &VariableManager, x: &[f64]) -> Vec<f64> {
        match self {
            UnionGeometry::AxisAlignment {
                first,
                second,
                direction,
            } => {
                let a = first.world_axis(vm, x);
                let b = second.world_axis(vm, x);
                let r = a - b * alignment_sign(*direction, &a, &b);
                vec![r.x, r.y, r.z]
            }
            UnionGeometry::Angle {
                first,
                second,
                angle,
            } => {
                let a = first.world_axis(vm, x);
                let b = second.world_axis(vm, x);
                vec![a.dot(&b) - angle.cos()]
            }
            UnionGeometry::PlaneOffset { offset, .. } => {
                let (plane, other) = self.plane_sides();
                let n = plane.world_axis(vm, x);
                let d = other.world_point(vm, x) - plane.world_point(vm, x);
                vec![d.dot(&n) - offset]
            }
            UnionGeometry::AxisDistance { first, second } => {
                let a = first.world_axis(vm, x);
                let r = (second.world_point(vm, x) - first.world_point(vm, x)).reject_from(&a);
                vec![r.x, r.y, r.z]
            }
            UnionGeometry::Vertex { first, second } => {
                let r = second.world_point(vm, x) - first.world_point(vm, x);
                vec![r.x, r.y, r.z]
            }
            UnionGeometry::LockRotation { .. } => Vec::new(),
        }
    }

    /// Scalar error compared against [`UnionGeometry::tolerance`].
    pub fn error(&self, vm: &VariableManager, x: &[f64]) -> f64 {
        match self {
            UnionGeometry::AxisAlignment {
                first,
                second,
                direction,
            } => alignment_error(*direction, &first.world_axis(vm, x), &second.world_axis(vm, x)),
            UnionGeometry::LockRotation { .. } => 0.0,
            _ => self.residual(vm, x).iter().map(|r| r * r).sum::<f64>().sqrt(),
        }
    }

    /// Closed-form solve over the primary freedoms, if one applies.
    pub(crate) fn solve_analytically(
        &self,
        vm: &VariableManager,
        x: &[f64],
        primary: &[Dof],
        moving: ObjectIndex,
    ) -> Option<Vec<f64>> {
        match self {
            UnionGeometry::AxisAlignment { .. } | UnionGeometry::Angle { .. } => {
                self.rotate_into_place(vm, x, primary, moving)
            }
            UnionGeometry::PlaneOffset { .. }
            | UnionGeometry::AxisDistance { .. }
            | UnionGeometry::Vertex { .. } => self.translate_into_place(vm, x, primary),
            UnionGeometry::LockRotation { .. } => None,
        }
    }

    fn rotate_into_place(
        &self,
        vm: &VariableManager,
        x: &[f64],
        primary: &[Dof],
        moving: ObjectIndex,
    ) -> Option<Vec<f64>> {
        let (fixed, mov) = self.sides(moving);
        let f = fixed.world_axis(vm, x);
        let m = mov.world_axis(vm, x);
        let target_cos = match self {
            UnionGeometry::AxisAlignment { direction, .. } => alignment_sign(*direction, &m, &f),
            UnionGeometry::Angle { angle, .. } => angle.cos(),
            _ => return None,
        };
        let rotations: Vec<&Dof> = primary.iter().filter(|d| d.is_rotation()).collect();
        match rotations.as_slice() {
            [r, _, _] if rotations.iter().all(|d| d.is_raw()) => {
                let pivot = r.world_pivot(vm, x)?;
                let rotation = match self {
                    UnionGeometry::Angle { angle, .. } => {
                        let axis = m.cross(&f).normalized().unwrap_or_else(|| m.any_perpendicular());
                        AxisAngle::new(axis, m.angle_to(&f) - angle)
                    }
                    _ => rotation_required_to_rotate_a_vector_to_be_aligned_to_another_vector(
                        &m,
                        &(f * target_cos),
                    ),
                };
                let delta = Placement::rotation_about(&pivot, rotation.to_quaternion());
                let mut out = x.to_vec();
                move_cluster(vm, &mut out, &r.cluster, &delta);
                Some(out)
            }
            [r] => {
                let axis = r.world_axis(vm, x)?.normalized()?;
                let theta = single_axis_angle(&axis, &m, &f, target_cos)?;
                let mut out = x.to_vec();
                r.apply(vm, &mut out, theta);
                Some(out)
            }
            _ => None,
        }
    }

    /// Least-squares solve over the translational freedoms; exact because
    /// translations leave every axis unchanged, so the residual is affine in them.
    fn translate_into_place(&self, vm: &VariableManager, x: &[f64], primary: &[Dof]) -> Option<Vec<f64>> {
        let trans: Vec<Dof> = primary.iter().filter(|d| !d.is_rotation()).cloned().collect();
        if trans.is_empty() {
            return None;
        }
        let r0 = self.residual(vm, x);
        let mut jac = DMatrix::zeros(r0.len(), trans.len());
        for (j, dof) in trans.iter().enumerate() {
            let mut probe = x.to_vec();
            dof.apply(vm, &mut probe, 1.0);
            for (i, ri) in self.residual(vm, &probe).iter().enumerate() {
                jac[(i, j)] = ri - r0[i];
            }
        }
        let rhs = -DVector::from_column_slice(&r0);
        let values = jac.svd(true, true).solve(&rhs, 1e-12).ok()?;
        let values: Vec<f64> = values.iter().copied().collect();
        Some(apply_dofs(vm, x, &trans, &values))
    }

    /// Freedoms of the primary owner that survive once this equation holds.
    pub(crate) fn reduce(
        &self,
        vm: &VariableManager,
        x: &[f64],
        primary: Vec<Dof>,
        moving: ObjectIndex,
    ) -> Result<Vec<Dof>, String> {
        let (mut rotations, translations): (Vec<Dof>, Vec<Dof>) =
            primary.into_iter().partition(|d| d.is_rotation());
        let (fixed, mov) = self.sides(moving);
        match self {
            UnionGeometry::AxisAlignment { .. } => {
                let f = fixed.world_axis(vm, x);
                let mut kept = translations;
                kept.extend(reduce_rotations_to_axis(vm, x, rotations, &f, None, mov)?);
                Ok(kept)
            }
            UnionGeometry::Angle { .. } => {
                let f = fixed.world_axis(vm, x);
                let m = mov.world_axis(vm, x);
                let mut kept = translations;
                kept.extend(reduce_rotations_to_axis(vm, x, rotations, &f, Some(m), mov)?);
                Ok(kept)
            }
            UnionGeometry::PlaneOffset { .. } => {
                let (plane, other) = self.plane_sides();
                let n = plane.world_axis(vm, x).normalize_or(Vec3::Z);
                let mut kept = reduce_translations_in_plane(vm, x, translations, &n, fixed.object)?;
                let (a, b) = self.features();
                if a.is_point_like() || b.is_point_like() {
                    let vertex = other.world_point(vm, x);
                    match count_raw(&rotations) {
                        0 => rotations.retain(|d| {
                            let (Some(axis), Some(pivot)) = (d.world_axis(vm, x), d.world_pivot(vm, x)) else {
                                return false;
                            };
                            parallel(&axis, &n) || AxisLine::new(pivot, axis).distance_to_point(&vertex) < ON_AXIS_TOL
                        }),
                        3 if rotations.len() == 3 => rotations = pin_raw_rotations(vm, x, rotations, &vertex)?,
                        k => return Err(format!("{k} raw rotations against a vertex offset")),
                    }
                } else {
                    if count_raw(&rotations) > 0 {
                        return Err("raw rotations remain on a face offset without alignment".to_string());
                    }
                    rotations.retain(|d| d.world_axis(vm, x).is_some_and(|a| parallel(&a, &n)));
                }
                kept.extend(rotations);
                Ok(kept)
            }
            UnionGeometry::AxisDistance { .. } => {
                let a = fixed.world_axis(vm, x).normalize_or(Vec3::Z);
                let mut kept = reduce_translations_to_line(vm, x, translations, &a, fixed.object)?;
                if count_raw(&rotations) > 0 {
                    return Err("raw rotations remain on an axis distance without alignment".to_string());
                }
                let on_axis = mov.world_point(vm, x);
                for mut dof in rotations {
                    let Some(axis) = dof.world_axis(vm, x) else { continue };
                    if !parallel(&axis, &a) {
                        continue;
                    }
                    let local = vm.rotate_and_move_undo(dof.owner, &on_axis, x);
                    if let DofKind::AxisRotation { pivot, .. } = &mut dof.kind {
                        *pivot = local;
                    }
                    kept.push(dof);
                }
                Ok(kept)
            }
            UnionGeometry::Vertex { .. } => {
                let vertex = mov.world_point(vm, x);
                match count_raw(&rotations) {
                    0 => rotations.retain(|d| {
                        let (Some(axis), Some(pivot)) = (d.world_axis(vm, x), d.world_pivot(vm, x)) else {
                            return false;
                        };
                        AxisLine::new(pivot, axis).distance_to_point(&vertex) < ON_AXIS_TOL
                    }),
                    3 if rotations.len() == 3 => rotations = pin_raw_rotations(vm, x, rotations, &vertex)?,
                    k => return Err(format!("{k} raw rotations against a vertex")),
                }
                Ok(rotations)
            }
            UnionGeometry::LockRotation { .. } => {
                if count_raw(&rotations) > 0 {
                    return Err("raw rotations cannot be locked about an axis".to_string());
                }
                Ok(translations)
            }
        }
    }
}

/// Rotational reduction shared by alignment and angle unions.
///
/// Three raw rotations collapse to one rotation about `axis`; a single axis
/// rotation survives when parallel to `axis` (or `alternate`), otherwise it
/// is locked.
fn reduce_rotations_to_axis(
    vm: &VariableManager,
    x: &[f64],
    rotations: Vec<Dof>,
    axis: &Vec3,
    alternate: Option<Vec3>,
    moving: &FeatureFrame,
) -> Result<Vec<Dof>, String> {
    let raw = count_raw(&rotations);
    match (rotations.len(), raw) {
        (0, _) => Ok(Vec::new()),
        (3, 3) => {
            let first = &rotations[0];
            let owner = first.owner;
            let pivot_world = match raw_pivot(first) {
                Some(p) => vm.rotate_and_move(owner, &p, x),
                None => moving.world_point(vm, x),
            };
            let dof = Dof::axis_rotation(
                owner,
                vm.rotate_undo(owner, axis, x),
                vm.rotate_and_move_undo(owner, &pivot_world, x),
            )
            .with_cluster(first.cluster.clone());
            Ok(vec![dof])
        }
        (1, 0) => {
            let Some(a) = rotations[0].world_axis(vm, x) else {
                return Ok(Vec::new());
            };
            if parallel(&a, axis) || alternate.is_some_and(|m| parallel(&a, &m)) {
                Ok(rotations)
            } else {
                Ok(Vec::new())
            }
        }
        (n, raw) => Err(format!("{n} rotational freedoms ({raw} raw)")),
    }
}

/// Store a world direction in `frame`'s local coordinates.
fn linear_in_frame(vm: &VariableManager, x: &[f64], like: &Dof, direction: &Vec3, frame: ObjectIndex) -> Dof {
    Dof::linear(like.owner, vm.rotate_undo(frame, direction, x), Some(frame)).with_cluster(like.cluster.clone())
}

/// Translations that keep a point at fixed distance from a plane with normal `n`.
fn reduce_translations_in_plane(
    vm: &VariableManager,
    x: &[f64],
    translations: Vec<Dof>,
    n: &Vec3,
    frame: ObjectIndex,
) -> Result<Vec<Dof>, String> {
    let raw = count_raw(&translations);
    match (translations.len(), raw) {
        (0, _) => Ok(Vec::new()),
        (3, 3) => {
            let [d1, d2] = plane_degrees_of_freedom(n);
            let like = &translations[0];
            Ok(vec![
                linear_in_frame(vm, x, like, &d1, frame),
                linear_in_frame(vm, x, like, &d2, frame),
            ])
        }
        (2, 0) => {
            let d1 = translations[0].world_direction(vm, x).unwrap_or(Vec3::ZERO);
            let d2 = translations[1].world_direction(vm, x).unwrap_or(Vec3::ZERO);
            if perpendicular(&d1, n) && perpendicular(&d2, n) {
                return Ok(translations);
            }
            match d1.cross(&d2).cross(n).normalized() {
                Some(d) => Ok(vec![linear_in_frame(vm, x, &translations[0], &d, frame)]),
                None => Ok(Vec::new()),
            }
        }
        (1, 0) => {
            let d = translations[0].world_direction(vm, x).unwrap_or(Vec3::ZERO);
            Ok(if perpendicular(&d, n) { translations } else { Vec::new() })
        }
        (n, raw) => Err(format!("{n} translational freedoms ({raw} raw)")),
    }
}

/// Translations that keep a point on a line with direction `a`.
fn reduce_translations_to_line(
    vm: &VariableManager,
    x: &[f64],
    translations: Vec<Dof>,
    a: &Vec3,
    frame: ObjectIndex,
) -> Result<Vec<Dof>, String> {
    let raw = count_raw(&translations);
    match (translations.len(), raw) {
        (0, _) => Ok(Vec::new()),
        (3, 3) => Ok(vec![linear_in_frame(vm, x, &translations[0], a, frame)]),
        (2, 0) => {
            let d1 = translations[0].world_direction(vm, x).unwrap_or(Vec3::ZERO);
            let d2 = translations[1].world_direction(vm, x).unwrap_or(Vec3::ZERO);
            let Some(normal) = d1.cross(&d2).normalized() else {
                return Err("linear freedoms are not independent".to_string());
            };
            if perpendicular(&normal, a) {
                Ok(vec![linear_in_frame(vm, x, &translations[0], a, frame)])
            } else {
                Ok(Vec::new())
            }
        }
        (1, 0) => {
            let d = translations[0].world_direction(vm, x).unwrap_or(Vec3::ZERO);
            Ok(if parallel(&d, a) { translations } else { Vec::new() })
        }
        (n, raw) => Err(format!("{n} translational freedoms ({raw} raw)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ObjectId;
    use crate::document::{DocumentObject, InMemoryDocument};
    use std::collections::BTreeMap;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn vm() -> VariableManager {
        let mut d = InMemoryDocument::new();
        d.add_object(DocumentObject {
            id: ObjectId::new("A"),
            placement: Placement::identity(),
            fixed: true,
            features: BTreeMap::new(),
        });
        d.add_object(DocumentObject {
            id: ObjectId::new("B"),
            placement: Placement::from_translation(5.0, 5.0, 5.0),
            fixed: false,
            features: BTreeMap::new(),
        });
        VariableManager::new(&d, &[ObjectId::new("A"), ObjectId::new("B")]).unwrap()
    }

    fn face(object: ObjectIndex, p: Point3d, n: Vec3) -> FeatureFrame {
        FeatureFrame {
            object,
            feature: "Face".into(),
            kind: FeatureKind::PlanarFace,
            position: p,
            axis: Some(n),
        }
    }

    #[test]
    fn alignment_direction_semantics() {
        let a = Vec3::Z;
        for (dir, same, opposite) in [
            (DirectionConstraint::None, 0.0, 0.0),
            (DirectionConstraint::Aligned, 0.0, 2.0),
            (DirectionConstraint::Opposed, 2.0, 0.0),
        ] {
            assert!((alignment_error(dir, &a, &Vec3::Z) - same).abs() < 1e-15, "{dir:?}");
            assert!((alignment_error(dir, &a, &-Vec3::Z) - opposite).abs() < 1e-15, "{dir:?}");
        }
    }

    #[test]
    fn single_axis_angle_reaches_target() {
        let theta = single_axis_angle(&Vec3::Z, &Vec3::X, &Vec3::Y, 1.0).unwrap();
        assert!((theta - FRAC_PI_2).abs() < 1e-12);
        // Rotating about the moving axis itself cannot change the angle.
        assert!(single_axis_angle(&Vec3::Z, &Vec3::Z, &Vec3::X, 0.0).is_some());
        assert!(single_axis_angle(&Vec3::Z, &Vec3::Z, &Vec3::X, 1.0).is_none());
        let theta = single_axis_angle(&Vec3::Z, &Vec3::X, &Vec3::X, -1.0).unwrap();
        assert!((theta.abs() - PI).abs() < 1e-12);
    }

    #[test]
    fn plane_alignment_then_offset_leaves_three_freedoms() {
        let vm = vm();
        let mut x = vm.x0().to_vec();
        let fixed = face(0, Point3d::new(1.0, 2.0, 1.0), Vec3::Y);
        let moving = face(1, Point3d::new(2.0, 1.0, 1.0), Vec3::X);
        let align = UnionGeometry::AxisAlignment {
            first: fixed.clone(),
            second: moving.clone(),
            direction: DirectionConstraint::Aligned,
        };
        let dofs = Dof::free_object(1);
        x = align.solve_analytically(&vm, &x, &dofs, 1).unwrap();
        assert!(align.error(&vm, &x) < 1e-12);
        let dofs = align.reduce(&vm, &x, dofs, 1).unwrap();
        assert_eq!(dofs.len(), 4);

        let offset = UnionGeometry::PlaneOffset {
            first: fixed,
            second: moving,
            offset: 2.0,
        };
        x = offset.solve_analytically(&vm, &x, &dofs, 1).unwrap();
        assert!(offset.error(&vm, &x) < 1e-12);
        let dofs = offset.reduce(&vm, &x, dofs, 1).unwrap();
        assert_eq!(dofs.len(), 3);
        assert_eq!(dofs.iter().filter(|d| d.is_rotation()).count(), 1);
        // Every remaining freedom preserves both equations.
        for d in &dofs {
            let mut probe = x.clone();
            d.apply(&vm, &mut probe, 0.7);
            assert!(align.error(&vm, &probe) < 1e-12, "{d}");
            assert!(offset.error(&vm, &probe) < 1e-12, "{d}");
        }
    }

    #[test]
    fn vertex_pins_rotations_and_removes_translations() {
        let vm = vm();
        let mut x = vm.x0().to_vec();
        let point = |object, p| FeatureFrame {
            object,
            feature: "Vertex".into(),
            kind: FeatureKind::Vertex,
            position: p,
            axis: None,
        };
        let u = UnionGeometry::Vertex {
            first: point(0, Point3d::new(1.0, 1.0, 1.0)),
            second: point(1, Point3d::new(0.0, 0.0, 0.0)),
        };
        let dofs = Dof::free_object(1);
        x = u.solve_analytically(&vm, &x, &dofs, 1).unwrap();
        assert!(u.error(&vm, &x) < 1e-12);
        let dofs = u.reduce(&vm, &x, dofs, 1).unwrap();
        assert_eq!(dofs.len(), 3);
        let mut probe = x.clone();
        for d in &dofs {
            d.apply(&vm, &mut probe, 0.4);
        }
        assert!(u.error(&vm, &probe) < 1e-12);
    }

    #[test]
    fn second_vertex_turns_pinned_rotations_into_hinge() {
        let vm = vm();
        let point = |object, p| FeatureFrame {
            object,
            feature: "Vertex".into(),
            kind: FeatureKind::Vertex,
            position: p,
            axis: None,
        };
        // B at (5,5,5): its local origin and (2,0,0) already sit on A's (5,5,5) and (7,5,5).
        let x = vm.x0().to_vec();
        let first = UnionGeometry::Vertex {
            first: point(0, Point3d::new(5.0, 5.0, 5.0)),
            second: point(1, Point3d::ORIGIN),
        };
        let second = UnionGeometry::Vertex {
            first: point(0, Point3d::new(7.0, 5.0, 5.0)),
            second: point(1, Point3d::new(2.0, 0.0, 0.0)),
        };
        let dofs = first.reduce(&vm, &x, Dof::free_object(1), 1).unwrap();
        assert!(second.error(&vm, &x) < 1e-12);
        let dofs = second.reduce(&vm, &x, dofs, 1).unwrap();
        assert_eq!(dofs.len(), 1);
        assert!(parallel(&dofs[0].world_axis(&vm, &x).unwrap(), &Vec3::X));
        let mut turned = x.clone();
        dofs[0].apply(&vm, &mut turned, 0.9);
        assert!(first.error(&vm, &turned) < 1e-12);
        assert!(second.error(&vm, &turned) < 1e-12);
    }

    #[test]
    fn angle_with_parallel_axis_rotation_has_no_closed_form() {
        let vm = vm();
        let x = vm.x0().to_vec();
        let u = UnionGeometry::Angle {
            first: face(0, Point3d::ORIGIN, Vec3::Z),
            second: face(1, Point3d::ORIGIN, Vec3::Z),
            angle: FRAC_PI_2,
        };
        let dofs = vec![Dof::axis_rotation(1, Vec3::Z, Point3d::ORIGIN)];
        assert!(u.solve_analytically(&vm, &x, &dofs, 1).is_none());
    }

    #[test]
    fn lock_rejects_raw_rotations() {
        let vm = vm();
        let u = UnionGeometry::LockRotation {
            first: face(0, Point3d::ORIGIN, Vec3::Z),
            second: face(1, Point3d::ORIGIN, Vec3::Z),
        };
        assert!(u.reduce(&vm, vm.x0(), Dof::free_object(1), 1).is_err());
    }
}
