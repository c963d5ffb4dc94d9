//! End-to-end assembly scenarios through `solve_constraints`.
//!
//! Each scenario scripts a small assembly, solves it and checks the result
//! with the independent oracles rather than the solver's own residuals.

use approx::assert_abs_diff_eq;
use mate_kernel::{Placement, Quaternion, Vec3};
use mate_solver::{ConstraintRecord, DirectionConstraint, FeatureSelection, ObjectId, SolverEngine, SolverError};
use mate_test_harness::assertions::{assert_constraints_hold, assert_vector_close};
use mate_test_harness::helpers::load_document_json;
use mate_test_harness::{init_tracing, AssemblyBuilder, HarnessError};

const TWO_CUBES: &str = include_str!("../fixtures/two_cubes.json");

const GOLDEN: [f64; 12] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 3.0, 2.0, 2.0, -2.35619449, 0.61547971, 2.0943951,
];

/// Two 2-unit cubes, A fixed at the origin, B free at (5, 5, 5), with three
/// aligned plane constraints that pin B completely.
fn two_cubes() -> AssemblyBuilder {
    let mut m = AssemblyBuilder::new();
    m.add_box("A", [2.0; 3], [0.0; 3], true).unwrap();
    m.add_box("B", [2.0; 3], [5.0; 3], false).unwrap();
    m.plane("Top", ("A", "Face4"), ("B", "Face2"), 2.0, DirectionConstraint::Aligned)
        .unwrap();
    m.plane("Side", ("A", "Face5"), ("B", "Face4"), 0.0, DirectionConstraint::Aligned)
        .unwrap();
    m.plane("Back", ("A", "Face1"), ("B", "Face6"), -1.0, DirectionConstraint::Aligned)
        .unwrap();
    m
}

// ── Scenario 1: golden placement vector ─────────────────────────────────

#[test]
fn two_cubes_reach_golden_vector() {
    init_tracing();
    let mut m = two_cubes();
    let solved = m.solve().unwrap();

    assert_eq!(solved.dof, 0, "three aligned planes pin the cube:\n{}", solved.trace);
    assert_eq!(solved.written, 1, "only B moves");
    let v = m.vector(&["A", "B"]).unwrap();
    assert_vector_close(&v, &GOLDEN, 1e-6, "golden").unwrap();
    assert_constraints_hold(m.document(), Some(&solved), 1e-6).unwrap();
}

#[test]
fn fixture_matches_scripted_assembly() {
    let mut from_json = AssemblyBuilder::from_json(TWO_CUBES).unwrap();
    let solved = from_json.solve().unwrap();
    assert_eq!(solved.dof, 0);
    let v = from_json.vector(&["A", "B"]).unwrap();
    assert_vector_close(&v, &GOLDEN, 1e-6, "fixture golden").unwrap();
}

#[test]
fn result_vector_lists_fixed_objects_too() {
    let mut m = two_cubes();
    let solved = m.solve().unwrap();
    let ids = [ObjectId::new("A"), ObjectId::new("B")];
    assert_vector_close(&solved.as_vector(&ids), &GOLDEN, 1e-6, "as_vector").unwrap();
}

// ── Scenario 2: unsatisfiable angle ─────────────────────────────────────

#[test]
fn aligned_planes_cannot_also_be_perpendicular() {
    let mut m = AssemblyBuilder::new();
    m.add_box("A", [2.0; 3], [0.0; 3], true).unwrap();
    m.add_box("B", [2.0; 3], [4.0, 1.0, 3.0], false).unwrap();
    m.plane("Offset", ("A", "Face6"), ("B", "Face6"), 5.0, DirectionConstraint::Aligned)
        .unwrap();
    m.angle("Square", ("A", "Face6"), ("B", "Face6"), 90.0).unwrap();
    let before = m.document().clone();

    let err = m.solve().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Square"), "failure names the constraint: {msg}");
    assert!(msg.contains("FAILED"), "failure carries the system trace: {msg}");
    assert_eq!(m.document().placement_writes(), 0, "no partial writes");
    assert_eq!(m.placement("B").unwrap(), before.objects()[1].placement);
}

#[test]
fn unsolvable_is_reported_as_such() {
    let mut doc = load_document_json(TWO_CUBES).unwrap();
    doc.add_constraint(ConstraintRecord::angle_between_planes(
        "Twist",
        FeatureSelection::new("A", "Face4"),
        FeatureSelection::new("B", "Face2"),
        45.0,
    ));
    let mut m = AssemblyBuilder::from_document(doc);
    let err = m.solve().unwrap_err();
    assert!(
        matches!(err, HarnessError::Solver(SolverError::ConstraintUnsolvable { ref constraint, .. }) if constraint == "Twist"),
        "{err}"
    );
}

// ── Scenario 3: idempotence and caching ─────────────────────────────────

#[test]
fn second_solve_changes_nothing() {
    let mut m = two_cubes();
    m.solve().unwrap();
    let first = m.vector(&["A", "B"]).unwrap();
    let again = m.solve().unwrap();
    assert_eq!(again.written, 0);
    let second = m.vector(&["A", "B"]).unwrap();
    assert_vector_close(&second, &first, 1e-8, "idempotent").unwrap();
}

#[test]
fn cached_resolve_resumes_after_every_constraint() {
    let mut m = two_cubes().with_cache();
    let first = m.solve().unwrap();
    assert_eq!(first.resume_index, 0);
    let second = m.solve().unwrap();
    assert_eq!(second.resume_index, 3);
    assert_eq!(second.written, 0);
    assert_eq!(second.dof, first.dof);
}

#[test]
fn editing_last_constraint_reuses_the_prefix() {
    let mut cached = two_cubes().with_cache();
    cached.solve().unwrap();
    cached.edit_constraint("Back", |c| c.offset = -2.0).unwrap();
    let resumed = cached.solve().unwrap();
    assert_eq!(resumed.resume_index, 2);

    let mut fresh = AssemblyBuilder::from_document(cached.document().clone());
    fresh.solve().unwrap();

    let a = cached.vector(&["A", "B"]).unwrap();
    let b = fresh.vector(&["A", "B"]).unwrap();
    assert_vector_close(&a, &b, 1e-6, "cache vs fresh").unwrap();
    assert!((a[6] - 4.0).abs() < 1e-6, "B slides one unit further: {a:?}");
}

#[test]
fn moving_the_fixed_part_invalidates_the_cache() {
    let mut m = two_cubes().with_cache();
    m.solve().unwrap();
    m.move_part("A", Placement::from_translation(1.0, 0.0, 0.0))
        .unwrap();
    let solved = m.solve().unwrap();
    assert_eq!(solved.resume_index, 0);
    assert_constraints_hold(m.document(), Some(&solved), 1e-6).unwrap();
}

// ── Scenario 4: degrees of freedom per constraint type ──────────────────

#[test]
fn single_plane_leaves_three_freedoms() {
    let mut m = AssemblyBuilder::new();
    m.add_box("A", [2.0; 3], [0.0; 3], true).unwrap();
    m.add_box("B", [1.0; 3], [3.0, 3.0, 7.0], false).unwrap();
    m.plane("Stack", ("A", "Face6"), ("B", "Face5"), 0.0, DirectionConstraint::Opposed)
        .unwrap();
    let solved = m.solve().unwrap();
    assert_eq!(solved.dof, 3);
    let b = m.placement("B").unwrap();
    assert_abs_diff_eq!(b.position.z, 2.0, epsilon = 1e-9);
    assert_constraints_hold(m.document(), Some(&solved), 1e-9).unwrap();
}

#[test]
fn axial_pin_in_hole() {
    let mut m = AssemblyBuilder::new();
    m.add_plate_with_hole("Plate", [40.0, 30.0, 5.0], [10.0, 15.0], [0.0; 3], true)
        .unwrap();
    m.add_cylinder(
        "Pin",
        12.0,
        [25.0, 3.0, 8.0],
        Quaternion::from_axis_angle(Vec3::X, 0.3),
        false,
    )
    .unwrap();
    m.axial("Shaft", ("Plate", "Face7"), ("Pin", "Face1"), DirectionConstraint::None, false)
        .unwrap();
    let solved = m.solve().unwrap();
    assert_eq!(solved.dof, 2, "slide and spin remain:\n{}", solved.trace);
    assert_constraints_hold(m.document(), Some(&solved), 1e-4).unwrap();
}

#[test]
fn axial_with_lock_keeps_only_the_slide() {
    let mut m = AssemblyBuilder::new();
    m.add_plate_with_hole("Plate", [40.0, 30.0, 5.0], [10.0, 15.0], [0.0; 3], true)
        .unwrap();
    m.add_cylinder("Pin", 12.0, [25.0, 3.0, 8.0], Quaternion::IDENTITY, false)
        .unwrap();
    m.axial("Shaft", ("Plate", "Face7"), ("Pin", "Face1"), DirectionConstraint::Aligned, true)
        .unwrap();
    let solved = m.solve().unwrap();
    assert_eq!(solved.dof, 1);
    assert_constraints_hold(m.document(), Some(&solved), 1e-4).unwrap();
}

#[test]
fn circular_edge_seats_the_pin() {
    let mut m = AssemblyBuilder::new();
    m.add_plate_with_hole("Plate", [40.0, 30.0, 5.0], [10.0, 15.0], [0.0; 3], true)
        .unwrap();
    m.add_cylinder("Pin", 12.0, [-6.0, 2.0, 20.0], Quaternion::IDENTITY, false)
        .unwrap();
    m.circular_edge(
        "Seat",
        ("Plate", "Edge13"),
        ("Pin", "Edge3"),
        0.0,
        DirectionConstraint::Aligned,
        false,
    )
    .unwrap();
    let solved = m.solve().unwrap();
    assert_eq!(solved.dof, 1, "only the spin remains");
    let pin = m.placement("Pin").unwrap();
    assert_abs_diff_eq!(pin.position.x, 10.0, epsilon = 1e-4);
    assert_abs_diff_eq!(pin.position.y, 15.0, epsilon = 1e-4);
    assert_abs_diff_eq!(pin.position.z, 5.0, epsilon = 1e-6);
    assert_constraints_hold(m.document(), Some(&solved), 1e-4).unwrap();
}

#[test]
fn locked_circular_edge_is_rigid() {
    let mut m = AssemblyBuilder::new();
    m.add_plate_with_hole("Plate", [40.0, 30.0, 5.0], [10.0, 15.0], [0.0; 3], true)
        .unwrap();
    m.add_cylinder("Pin", 12.0, [-6.0, 2.0, 20.0], Quaternion::IDENTITY, false)
        .unwrap();
    m.circular_edge(
        "Seat",
        ("Plate", "Edge13"),
        ("Pin", "Edge3"),
        0.0,
        DirectionConstraint::Aligned,
        true,
    )
    .unwrap();
    let solved = m.solve().unwrap();
    assert_eq!(solved.dof, 0);
}

#[test]
fn spherical_joint_leaves_rotations() {
    let mut m = AssemblyBuilder::new();
    m.add_sphere("Socket", [0.0; 3], true).unwrap();
    m.add_sphere("Ball", [3.0, 4.0, 5.0], false).unwrap();
    m.spherical("Joint", ("Socket", "Face1"), ("Ball", "Face1"))
        .unwrap();
    let solved = m.solve().unwrap();
    assert_eq!(solved.dof, 3);
    let ball = m.placement("Ball").unwrap();
    assert!(ball.position.to_vec3().length() < 1e-9, "{ball:?}");
}

#[test]
fn angle_between_faces() {
    let mut m = AssemblyBuilder::new();
    m.add_box("A", [2.0; 3], [0.0; 3], true).unwrap();
    m.add_box("B", [2.0; 3], [5.0, 0.0, 0.0], false).unwrap();
    m.plane("Floor", ("A", "Face5"), ("B", "Face5"), 0.0, DirectionConstraint::Aligned)
        .unwrap();
    m.angle("Tilt", ("A", "Face2"), ("B", "Face2"), 30.0).unwrap();
    let solved = m.solve().unwrap();
    assert_eq!(solved.dof, 2);
    assert_constraints_hold(m.document(), Some(&solved), 1e-8).unwrap();
}

#[test]
fn chained_parts_solve_in_order() {
    let mut m = AssemblyBuilder::new();
    m.add_box("Base", [4.0, 4.0, 1.0], [0.0; 3], true).unwrap();
    m.add_box("Mid", [2.0, 2.0, 1.0], [7.0, 1.0, 4.0], false).unwrap();
    m.add_box("Cap", [1.0, 1.0, 1.0], [-3.0, 2.0, 9.0], false).unwrap();
    m.plane("BaseMid", ("Base", "Face6"), ("Mid", "Face5"), 0.0, DirectionConstraint::Opposed)
        .unwrap();
    m.plane("MidCap", ("Mid", "Face6"), ("Cap", "Face5"), 0.0, DirectionConstraint::Opposed)
        .unwrap();
    let solved = m.solve().unwrap();
    assert_eq!(solved.dof, 6);
    assert_abs_diff_eq!(m.placement("Cap").unwrap().position.z, 2.0, epsilon = 1e-9);
    assert_constraints_hold(m.document(), Some(&solved), 1e-9).unwrap();
}

#[test]
fn two_vertices_leave_a_hinge() {
    let mut m = AssemblyBuilder::new();
    m.add_box("A", [2.0; 3], [0.0; 3], true).unwrap();
    m.add_box("B", [2.0; 3], [3.0, 4.0, 5.0], false).unwrap();
    m.spherical("Pivot", ("A", "Vertex1"), ("B", "Vertex1")).unwrap();
    m.spherical("Pin", ("A", "Vertex2"), ("B", "Vertex3")).unwrap();
    let solved = m.solve().unwrap();
    assert_eq!(solved.dof, 1, "{}", solved.trace);
    // Turning B's local y onto world x has no closed form over pinned rotations.
    assert!(solved.trace.contains("newton("), "{}", solved.trace);
    assert_constraints_hold(m.document(), Some(&solved), 1e-9).unwrap();
    let b = m.placement("B").unwrap();
    assert!(b.position.to_vec3().length() < 1e-9, "{b:?}");
}

#[test]
fn side_part_constrained_before_the_base_contact() {
    let mut m = AssemblyBuilder::new();
    m.add_box("A", [2.0; 3], [0.0; 3], true).unwrap();
    m.add_box("B", [2.0; 3], [5.0, 5.0, 5.0], false).unwrap();
    m.add_box("C", [2.0; 3], [1.0, -6.0, 3.0], false).unwrap();
    m.plane("CB", ("C", "Face2"), ("B", "Face1"), 0.0, DirectionConstraint::Opposed)
        .unwrap();
    m.plane("AB", ("A", "Face6"), ("B", "Face5"), 0.0, DirectionConstraint::Opposed)
        .unwrap();
    let solved = m.solve().unwrap();
    assert!(solved.dof > 0, "{}", solved.trace);
    assert_abs_diff_eq!(m.placement("B").unwrap().position.z, 2.0, epsilon = 1e-9);
    assert_constraints_hold(m.document(), Some(&solved), 1e-9).unwrap();
}

#[test]
fn closed_loop_through_the_base() {
    let mut m = AssemblyBuilder::new();
    m.add_box("A", [2.0; 3], [0.0; 3], true).unwrap();
    m.add_box("B", [2.0; 3], [0.5, 0.3, 4.0], false).unwrap();
    m.add_box("C", [2.0; 3], [4.0, 1.0, 3.0], false).unwrap();
    m.plane("AB", ("A", "Face6"), ("B", "Face5"), 0.0, DirectionConstraint::Opposed)
        .unwrap();
    m.plane("BC", ("B", "Face2"), ("C", "Face1"), 0.0, DirectionConstraint::Opposed)
        .unwrap();
    m.plane("AC", ("A", "Face6"), ("C", "Face5"), 0.0, DirectionConstraint::Opposed)
        .unwrap();
    let solved = m.solve().unwrap();
    // B slides and turns on A; C can only slide along B's side.
    assert_eq!(solved.dof, 4, "{}", solved.trace);
    assert_abs_diff_eq!(m.placement("C").unwrap().position.z, 2.0, epsilon = 1e-9);
    assert_constraints_hold(m.document(), Some(&solved), 1e-9).unwrap();
}

// ── Scenario 5: legacy engine ───────────────────────────────────────────

#[test]
fn legacy_engine_agrees_on_golden() {
    let mut legacy = two_cubes().with_engine(SolverEngine::NewtonSlsqp);
    let solved = legacy.solve().unwrap();
    assert_eq!(solved.dof, 0);
    assert!(solved.trace.is_empty());
    let v = legacy.vector(&["A", "B"]).unwrap();
    assert_vector_close(&v, &GOLDEN, 1e-3, "legacy golden").unwrap();
}

#[test]
fn legacy_engine_counts_freedoms_from_rank() {
    let mut m = AssemblyBuilder::new().with_engine(SolverEngine::NewtonSlsqp);
    m.add_box("A", [2.0; 3], [0.0; 3], true).unwrap();
    m.add_box("B", [2.0; 3], [1.0, 1.0, 6.0], false).unwrap();
    m.plane("Stack", ("A", "Face6"), ("B", "Face5"), 0.0, DirectionConstraint::Opposed)
        .unwrap();
    let solved = m.solve().unwrap();
    assert_eq!(solved.dof, 3);
    assert!((m.placement("B").unwrap().position.z - 2.0).abs() < 1e-3);
}
