//! Turns the ordered constraint list into a chain of constraint systems.

use tracing::{debug, instrument, warn};

use crate::constraint::{ConstraintKind, ConstraintRecord};
use crate::document::GeometryAccessor;
use crate::solver::{SolverConfig, SolverError};
use crate::variables::{ObjectIndex, VariableManager};

use super::unions::{FeatureFrame, UnionGeometry};
use super::{ConstraintSystem, SolveMethod, SystemKind, SystemNode};

/// Both features of one constraint, captured in their objects' frames.
pub type ConstraintFeatures = (FeatureFrame, FeatureFrame);

/// The anchor of the tree: the first object flagged fixed, scanning
/// constraints in order, else the first object of the first constraint.
pub fn select_root_object(constraints: &[ConstraintRecord], vm: &VariableManager) -> Option<ObjectIndex> {
    let candidates = || {
        constraints
            .iter()
            .flat_map(|c| c.objects())
            .filter_map(|id| vm.index_of(id))
    };
    if let Some(fixed) = candidates().find(|&o| vm.is_fixed(o)) {
        return Some(fixed);
    }
    let implicit = candidates().next()?;
    warn!(
        object = %vm.object_id(implicit),
        "no fixed object in the assembly; anchoring the first constrained object"
    );
    Some(implicit)
}

/// Capture one feature relative to its object's initial placement.
pub fn capture_feature<G: GeometryAccessor + ?Sized>(
    geometry: &G,
    vm: &VariableManager,
    object: ObjectIndex,
    feature: &str,
) -> Result<FeatureFrame, SolverError> {
    let id = vm.object_id(object);
    let kind = geometry.feature_kind(id, feature)?;
    let world_position = geometry.feature_position(id, feature)?;
    let world_axis = if kind.is_point_like() {
        None
    } else {
        Some(geometry.feature_axis(id, feature)?)
    };
    let placement = vm.placement(object, vm.x0());
    let axis = match world_axis {
        Some(a) => {
            let local = placement.untransform_vector(&a);
            Some(local.normalized().ok_or_else(|| SolverError::NumericalDegeneracy {
                context: format!("{id}.{feature} has a zero-length axis"),
            })?)
        }
        None => None,
    };
    Ok(FeatureFrame {
        object,
        feature: feature.to_string(),
        kind,
        position: placement.untransform_point(&world_position),
        axis,
    })
}

/// Capture the features of every constraint, in order.
pub fn capture_constraint_features<G: GeometryAccessor + ?Sized>(
    geometry: &G,
    constraints: &[ConstraintRecord],
    vm: &VariableManager,
) -> Result<Vec<ConstraintFeatures>, SolverError> {
    constraints
        .iter()
        .map(|c| {
            let index = |sel: &crate::constraint::FeatureSelection| {
                vm.index_of(&sel.object).ok_or_else(|| SolverError::BrokenReference {
                    constraint: c.name.clone(),
                    object: sel.object.clone(),
                })
            };
            let first = capture_feature(geometry, vm, index(&c.first)?, &c.first.feature)?;
            let second = capture_feature(geometry, vm, index(&c.second)?, &c.second.feature)?;
            Ok((first, second))
        })
        .collect()
}

fn root_system(root: Option<ObjectIndex>, vm: &VariableManager) -> ConstraintSystem {
    let (kind, label, contained) = match root {
        Some(object) => (
            SystemKind::FixedObject { object },
            vm.object_id(object).to_string(),
            vec![object],
        ),
        None => (SystemKind::Empty, String::new(), Vec::new()),
    };
    ConstraintSystem::new(SystemNode {
        parent: None,
        kind,
        label,
        x: vm.x0().to_vec(),
        dofs: Vec::new(),
        contained,
        error: 0.0,
        method: SolveMethod::Structural,
    })
}

/// The union equations a constraint expands to, in solve order.
pub(crate) fn constraint_equations(
    constraint: &ConstraintRecord,
    (first, second): &ConstraintFeatures,
) -> Vec<UnionGeometry> {
    let pair = || (first.clone(), second.clone());
    let alignment = || {
        let (first, second) = pair();
        UnionGeometry::AxisAlignment {
            first,
            second,
            direction: constraint.direction,
        }
    };
    let axis_distance = || {
        let (first, second) = pair();
        UnionGeometry::AxisDistance { first, second }
    };
    let plane_offset = || {
        let (first, second) = pair();
        UnionGeometry::PlaneOffset {
            first,
            second,
            offset: constraint.offset,
        }
    };
    let lock = || {
        let (first, second) = pair();
        UnionGeometry::LockRotation { first, second }
    };

    let mut unions = Vec::new();
    match constraint.kind {
        ConstraintKind::Plane => {
            if !first.is_point_like() && !second.is_point_like() {
                unions.push(alignment());
            }
            unions.push(plane_offset());
        }
        ConstraintKind::AngleBetweenPlanes => {
            let (first, second) = pair();
            unions.push(UnionGeometry::Angle {
                first,
                second,
                angle: constraint.angle_radians(),
            });
        }
        ConstraintKind::Axial => {
            unions.push(alignment());
            unions.push(axis_distance());
            if constraint.lock_rotation {
                unions.push(lock());
            }
        }
        ConstraintKind::CircularEdge => {
            unions.push(alignment());
            unions.push(axis_distance());
            unions.push(plane_offset());
            if constraint.lock_rotation {
                unions.push(lock());
            }
        }
        ConstraintKind::SphericalSurface => {
            let (first, second) = pair();
            unions.push(UnionGeometry::Vertex { first, second });
        }
    }
    unions
}

/// Union the equations of one constraint into the chain.
fn add_constraint(
    system: &mut ConstraintSystem,
    vm: &VariableManager,
    config: &SolverConfig,
    index: usize,
    constraint: &ConstraintRecord,
    features: &ConstraintFeatures,
) -> Result<(), SolverError> {
    let (first, second) = features;
    for object in [first.object, second.object] {
        if !system.contains_object(object) && vm.is_fixed(object) {
            system.add_fixed_object(object, vm.object_id(object).as_str());
        }
    }
    if !system.contains_object(first.object) && !system.contains_object(second.object) {
        system.add_free_object(first.object, vm.object_id(first.object).as_str());
    }

    let label = constraint.name.as_str();
    for geometry in constraint_equations(constraint, features) {
        system.add_union(vm, config, index, label, geometry)?;
    }
    system.checkpoint();
    debug!(
        constraint = label,
        kind = %constraint.kind,
        dofs = system.dof_count(),
        "constraint absorbed"
    );
    Ok(())
}

/// Build (or extend) the constraint-system chain for `constraints`.
///
/// `resume` is a chain already holding a prefix of the constraints, as
/// returned by the solver cache; building continues after its last
/// checkpoint. `features[i]` must be the captured features of
/// `constraints[i]`.
#[instrument(skip_all, fields(constraints = constraints.len()))]
pub fn build_constraint_system(
    constraints: &[ConstraintRecord],
    features: &[ConstraintFeatures],
    vm: &VariableManager,
    config: &SolverConfig,
    resume: Option<ConstraintSystem>,
) -> Result<ConstraintSystem, SolverError> {
    let mut system = match resume {
        Some(system) => system,
        None => root_system(select_root_object(constraints, vm), vm),
    };
    let start = system.checkpoints().len();
    if start > 0 {
        debug!(resumed_after = start, "continuing cached system");
    }
    for (index, (constraint, captured)) in constraints.iter().zip(features).enumerate().skip(start) {
        add_constraint(&mut system, vm, config, index, constraint, captured)?;
    }
    debug!(
        nodes = system.path().len(),
        dofs = system.dof_count(),
        "constraint system built"
    );
    Ok(system)
}
