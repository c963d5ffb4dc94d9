//! Helper functions: error type, tracing setup, part builders, fixtures.

use std::collections::BTreeMap;

use mate_kernel::{Placement, Point3d, Quaternion, Vec3};
use mate_solver::{DocumentObject, FeatureKind, InMemoryDocument, LocalFeature, ObjectId, SolverError};
use tracing_subscriber::EnvFilter;

// ── Error Type ──────────────────────────────────────────────────────────────

/// Unified error type for the test harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("unknown object: {name}")]
    UnknownObject { name: String },

    #[error("duplicate name: {name}")]
    DuplicateName { name: String },

    #[error("assertion failed: {detail}")]
    AssertionFailed { detail: String },

    #[error("oracle failure ({oracle}): {detail}")]
    OracleFailure { oracle: String, detail: String },

    #[error("solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("fixture error: {0}")]
    Fixture(#[from] serde_json::Error),
}

// ── Tracing ─────────────────────────────────────────────────────────────────

/// Route solver logs to the test output. Honours `RUST_LOG`, defaults to
/// warnings only. Safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ── Part Builders ───────────────────────────────────────────────────────────

fn planar(position: [f64; 3], normal: Vec3) -> LocalFeature {
    LocalFeature::new(FeatureKind::PlanarFace, Point3d::from_array(position), Some(normal))
}

fn placed(name: &str, at: [f64; 3], rotation: Quaternion, fixed: bool, features: BTreeMap<String, LocalFeature>) -> DocumentObject {
    DocumentObject {
        id: ObjectId::new(name),
        placement: Placement::new(Point3d::from_array(at), rotation),
        fixed,
        features,
    }
}

/// Box features, spanning `[0, size]` on each axis.
///
/// Faces follow the usual numbering: `Face1` -x, `Face2` +x, `Face3` -y,
/// `Face4` +y, `Face5` -z, `Face6` +z. `Vertex1`..`Vertex8` are the corners,
/// `Vertex1` at the origin, counting x fastest.
pub fn box_features(size: [f64; 3]) -> BTreeMap<String, LocalFeature> {
    let [sx, sy, sz] = size;
    let (hx, hy, hz) = (sx / 2.0, sy / 2.0, sz / 2.0);
    let mut f = BTreeMap::new();
    f.insert("Face1".into(), planar([0.0, hy, hz], -Vec3::X));
    f.insert("Face2".into(), planar([sx, hy, hz], Vec3::X));
    f.insert("Face3".into(), planar([hx, 0.0, hz], -Vec3::Y));
    f.insert("Face4".into(), planar([hx, sy, hz], Vec3::Y));
    f.insert("Face5".into(), planar([hx, hy, 0.0], -Vec3::Z));
    f.insert("Face6".into(), planar([hx, hy, sz], Vec3::Z));
    for i in 0..8 {
        let corner = Point3d::new(
            if i & 1 == 0 { 0.0 } else { sx },
            if i & 2 == 0 { 0.0 } else { sy },
            if i & 4 == 0 { 0.0 } else { sz },
        );
        f.insert(format!("Vertex{}", i + 1), LocalFeature::new(FeatureKind::Vertex, corner, None));
    }
    f
}

/// An axis-aligned box whose local origin is its minimum corner.
pub fn box_part(name: &str, size: [f64; 3], at: [f64; 3], fixed: bool) -> DocumentObject {
    placed(name, at, Quaternion::IDENTITY, fixed, box_features(size))
}

/// Cylinder features along local +z from the origin.
///
/// `Face1` lateral surface, `Face2` top, `Face3` bottom, `Edge1` top rim,
/// `Edge3` bottom rim.
pub fn cylinder_features(height: f64) -> BTreeMap<String, LocalFeature> {
    let mut f = BTreeMap::new();
    f.insert(
        "Face1".into(),
        LocalFeature::new(FeatureKind::CylindricalFace, Point3d::ORIGIN, Some(Vec3::Z)),
    );
    f.insert("Face2".into(), planar([0.0, 0.0, height], Vec3::Z));
    f.insert("Face3".into(), planar([0.0, 0.0, 0.0], -Vec3::Z));
    f.insert(
        "Edge1".into(),
        LocalFeature::new(FeatureKind::CircularEdge, Point3d::new(0.0, 0.0, height), Some(Vec3::Z)),
    );
    f.insert(
        "Edge3".into(),
        LocalFeature::new(FeatureKind::CircularEdge, Point3d::ORIGIN, Some(Vec3::Z)),
    );
    f
}

pub fn cylinder_part(name: &str, height: f64, at: [f64; 3], rotation: Quaternion, fixed: bool) -> DocumentObject {
    placed(name, at, rotation, fixed, cylinder_features(height))
}

/// A box with a vertical through hole at `(hole_x, hole_y)`.
///
/// Box faces as in [`box_features`], plus `Face7` for the hole wall,
/// `Edge13` for the top rim and `Edge14` for the bottom rim.
pub fn plate_with_hole(
    name: &str,
    size: [f64; 3],
    hole: [f64; 2],
    at: [f64; 3],
    fixed: bool,
) -> DocumentObject {
    let mut f = box_features(size);
    let [hx, hy] = hole;
    f.insert(
        "Face7".into(),
        LocalFeature::new(FeatureKind::CylindricalFace, Point3d::new(hx, hy, 0.0), Some(Vec3::Z)),
    );
    f.insert(
        "Edge13".into(),
        LocalFeature::new(FeatureKind::CircularEdge, Point3d::new(hx, hy, size[2]), Some(Vec3::Z)),
    );
    f.insert(
        "Edge14".into(),
        LocalFeature::new(FeatureKind::CircularEdge, Point3d::new(hx, hy, 0.0), Some(Vec3::Z)),
    );
    placed(name, at, Quaternion::IDENTITY, fixed, f)
}

/// A ball: `Face1` is the spherical surface centred on the local origin.
pub fn sphere_part(name: &str, at: [f64; 3], fixed: bool) -> DocumentObject {
    let mut f = BTreeMap::new();
    f.insert(
        "Face1".into(),
        LocalFeature::new(FeatureKind::SphericalFace, Point3d::ORIGIN, None),
    );
    placed(name, at, Quaternion::IDENTITY, fixed, f)
}

// ── Fixtures ────────────────────────────────────────────────────────────────

/// Parse an assembly document (parts, features, constraints) from JSON.
pub fn load_document_json(json: &str) -> Result<InMemoryDocument, HarnessError> {
    let mut doc: InMemoryDocument = serde_json::from_str(json)?;
    doc.reindex();
    Ok(doc)
}

pub fn document_to_json(doc: &InMemoryDocument) -> Result<String, HarnessError> {
    Ok(serde_json::to_string_pretty(doc)?)
}

// ── Vector Math ─────────────────────────────────────────────────────────────

/// Largest absolute component difference of two equally long vectors.
pub fn max_abs_difference(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter().zip(b).fold(0.0_f64, |m, (x, y)| m.max((x - y).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_faces_point_outward() {
        let f = box_features([2.0, 4.0, 6.0]);
        let top = &f["Face6"];
        assert_eq!(top.position, Point3d::new(1.0, 2.0, 6.0));
        assert_eq!(top.axis, Some(Vec3::Z));
        assert_eq!(f["Face1"].axis, Some(-Vec3::X));
        assert_eq!(f["Vertex8"].position, Point3d::new(2.0, 4.0, 6.0));
        assert!(f["Vertex1"].axis.is_none());
    }

    #[test]
    fn fixture_round_trip_keeps_lookup() {
        let mut doc = InMemoryDocument::new();
        doc.add_object(box_part("A", [1.0, 1.0, 1.0], [0.0, 0.0, 0.0], true));
        let json = document_to_json(&doc).unwrap();
        let back = load_document_json(&json).unwrap();
        assert!(back.object(&ObjectId::new("A")).is_some());
    }

    #[test]
    fn max_abs_difference_of_mismatched_lengths_is_infinite() {
        assert_eq!(max_abs_difference(&[1.0], &[1.0, 2.0]), f64::INFINITY);
        assert_eq!(max_abs_difference(&[1.0, 2.0], &[1.5, 2.0]), 0.5);
    }
}
