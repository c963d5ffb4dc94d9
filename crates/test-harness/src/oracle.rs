//! Verification oracles, pure functions returning pass/fail verdicts.
//!
//! Each oracle returns an `OracleVerdict` with diagnostic detail, not panics.
//! Constraint oracles measure the document's world geometry directly, so
//! they check the solver's output without sharing its equations.

use mate_kernel::{AxisLine, Point3d, Vec3};
use mate_solver::{
    ConstraintKind, ConstraintProvider, ConstraintRecord, DirectionConstraint, DocumentModel, GeometryAccessor,
    GeometryError, InMemoryDocument, ObjectId, SolvedPlacements,
};

/// The result of a single oracle check.
#[derive(Debug, Clone)]
pub struct OracleVerdict {
    pub oracle_name: String,
    pub passed: bool,
    pub detail: String,
    pub value: Option<f64>,
}

impl OracleVerdict {
    fn pass(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: true,
            detail,
            value: None,
        }
    }

    fn fail(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: false,
            detail,
            value: None,
        }
    }

    fn judged(name: &str, detail: String, value: f64, passed: bool) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed,
            detail,
            value: Some(value),
        }
    }
}

// ── Constraint Oracles ──────────────────────────────────────────────────────

struct WorldFeature {
    point: Point3d,
    axis: Option<Vec3>,
}

fn world_feature(doc: &InMemoryDocument, object: &ObjectId, feature: &str) -> Result<WorldFeature, GeometryError> {
    let kind = doc.feature_kind(object, feature)?;
    let point = doc.feature_position(object, feature)?;
    let axis = if kind.is_point_like() {
        None
    } else {
        Some(doc.feature_axis(object, feature)?.normalize_or(Vec3::Z))
    };
    Ok(WorldFeature { point, axis })
}

/// How far two unit axes are from the required relative sense.
fn direction_deviation(direction: DirectionConstraint, a: &Vec3, b: &Vec3) -> f64 {
    let d = a.dot(b);
    match direction {
        DirectionConstraint::Aligned => 1.0 - d,
        DirectionConstraint::Opposed => 1.0 + d,
        DirectionConstraint::None => 1.0 - d.abs(),
    }
}

/// Largest deviation of `c` from being satisfied in the current document.
pub fn constraint_deviation(doc: &InMemoryDocument, c: &ConstraintRecord) -> Result<f64, GeometryError> {
    let a = world_feature(doc, &c.first.object, &c.first.feature)?;
    let b = world_feature(doc, &c.second.object, &c.second.feature)?;
    let deviation = match c.kind {
        ConstraintKind::Plane => {
            let (plane, other) = if a.axis.is_none() && b.axis.is_some() { (&b, &a) } else { (&a, &b) };
            let n = plane.axis.unwrap_or(Vec3::Z);
            let distance = ((other.point - plane.point).dot(&n) - c.offset).abs();
            match (a.axis, b.axis) {
                (Some(na), Some(nb)) => distance.max(direction_deviation(c.direction, &na, &nb)),
                _ => distance,
            }
        }
        ConstraintKind::AngleBetweenPlanes => {
            let (na, nb) = (a.axis.unwrap_or(Vec3::Z), b.axis.unwrap_or(Vec3::Z));
            (na.angle_to(&nb) - c.angle_radians()).abs()
        }
        ConstraintKind::Axial | ConstraintKind::CircularEdge => {
            let (na, nb) = (a.axis.unwrap_or(Vec3::Z), b.axis.unwrap_or(Vec3::Z));
            let off_axis = AxisLine::new(a.point, na).distance_to_point(&b.point);
            let mut d = off_axis.max(direction_deviation(c.direction, &na, &nb));
            if c.kind == ConstraintKind::CircularEdge {
                d = d.max(((b.point - a.point).dot(&na) - c.offset).abs());
            }
            d
        }
        ConstraintKind::SphericalSurface => a.point.distance_to(&b.point),
    };
    Ok(deviation)
}

/// Check one constraint against the document's current placements.
pub fn check_constraint(doc: &InMemoryDocument, c: &ConstraintRecord, tol: f64) -> OracleVerdict {
    let name = "constraint_satisfied";
    match constraint_deviation(doc, c) {
        Ok(d) if d <= tol => OracleVerdict::judged(name, format!("{}: deviation {:.2e}", c.name, d), d, true),
        Ok(d) => OracleVerdict::judged(
            name,
            format!("{}: deviation {:.2e} exceeds {:.1e}", c.name, d, tol),
            d,
            false,
        ),
        Err(e) => OracleVerdict::fail(name, format!("{}: {e}", c.name)),
    }
}

/// Check every constraint of the document.
pub fn check_all_constraints(doc: &InMemoryDocument, tol: f64) -> Vec<OracleVerdict> {
    doc.list_constraints().iter().map(|c| check_constraint(doc, c, tol)).collect()
}

// ── Placement Oracles ───────────────────────────────────────────────────────

/// Fixed parts must keep their placement through a solve.
pub fn check_fixed_unmoved(before: &InMemoryDocument, after: &InMemoryDocument) -> OracleVerdict {
    let name = "fixed_unmoved";
    let mut moved = Vec::new();
    for o in before.objects().iter().filter(|o| o.fixed) {
        match after.object_placement(&o.id) {
            Ok(p) if p == o.placement => {}
            _ => moved.push(o.id.to_string()),
        }
    }
    if moved.is_empty() {
        OracleVerdict::pass(name, "all fixed parts in place".to_string())
    } else {
        OracleVerdict::fail(name, format!("moved: {}", moved.join(", ")))
    }
}

/// Check the remaining degrees of freedom.
pub fn check_dof(solved: &SolvedPlacements, expected: usize) -> OracleVerdict {
    let passed = solved.dof == expected;
    let detail = format!("dof {} (expected {expected})", solved.dof);
    OracleVerdict::judged("dof", detail, solved.dof as f64, passed)
}

/// Two solves agree on every listed object's placement vector.
pub fn check_placements_agree(
    a: &SolvedPlacements,
    b: &SolvedPlacements,
    objects: &[ObjectId],
    tol: f64,
) -> OracleVerdict {
    let name = "placements_agree";
    let mut worst = 0.0_f64;
    for id in objects {
        match (a.placement(id), b.placement(id)) {
            (Some(pa), Some(pb)) => {
                let dp = pa.position.distance_to(&pb.position);
                let dq = pa.rotation.max_component_difference(&pb.rotation);
                worst = worst.max(dp).max(dq);
            }
            _ => return OracleVerdict::fail(name, format!("{id} missing from one of the solves")),
        }
    }
    OracleVerdict::judged(
        name,
        format!("largest difference {worst:.2e} over {} objects", objects.len()),
        worst,
        worst <= tol,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_deviation_respects_sense() {
        assert_eq!(direction_deviation(DirectionConstraint::Aligned, &Vec3::Z, &Vec3::Z), 0.0);
        assert_eq!(direction_deviation(DirectionConstraint::Opposed, &Vec3::Z, &-Vec3::Z), 0.0);
        assert_eq!(direction_deviation(DirectionConstraint::None, &Vec3::Z, &-Vec3::Z), 0.0);
        assert_eq!(direction_deviation(DirectionConstraint::Aligned, &Vec3::Z, &-Vec3::Z), 2.0);
    }
}
