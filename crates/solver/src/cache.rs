//! Reuse of a previously solved constraint-system prefix.
//!
//! The cache keys each constraint by its type, parameters and the local
//! geometry of both features. On the next solve the longest matching prefix
//! of the constraint list is restored from the stored tree, so only the
//! constraints after it are solved again. A miss is never an error.

use mate_kernel::{Placement, Point3d, Vec3};
use tracing::{debug, warn};

use crate::constraint::{ConstraintKind, ConstraintRecord, DirectionConstraint, FeatureKind, ObjectId};
use crate::solver::Tolerances;
use crate::system::{ConstraintFeatures, ConstraintSystem, FeatureFrame};
use crate::variables::{ObjectIndex, VariableManager, SLOTS_PER_OBJECT};

/// Geometry of one feature as the cache compares it.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeElementInfo {
    pub kind: FeatureKind,
    /// In the object's own frame.
    pub position: Point3d,
    pub axis: Option<Vec3>,
}

impl ShapeElementInfo {
    pub fn from_frame(frame: &FeatureFrame) -> Self {
        Self {
            kind: frame.kind,
            position: frame.position,
            axis: frame.axis,
        }
    }

    pub fn matches(&self, other: &Self, tolerances: &Tolerances) -> bool {
        if self.kind != other.kind || self.position.distance_to(&other.position) > tolerances.cache_position {
            return false;
        }
        match (&self.axis, &other.axis) {
            (None, None) => true,
            (Some(a), Some(b)) => (a.dot(b) - 1.0).abs() <= tolerances.cache_axis,
            _ => false,
        }
    }
}

/// Everything about one constraint that its cached solution depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheInput {
    pub name: String,
    pub kind: ConstraintKind,
    pub first_object: ObjectId,
    pub second_object: ObjectId,
    pub offset: f64,
    pub angle: f64,
    pub direction: DirectionConstraint,
    pub lock_rotation: bool,
    pub first: ShapeElementInfo,
    pub second: ShapeElementInfo,
}

impl CacheInput {
    pub fn new(constraint: &ConstraintRecord, (first, second): &ConstraintFeatures) -> Self {
        Self {
            name: constraint.name.clone(),
            kind: constraint.kind,
            first_object: constraint.first.object.clone(),
            second_object: constraint.second.object.clone(),
            offset: constraint.offset,
            angle: constraint.angle,
            direction: constraint.direction,
            lock_rotation: constraint.lock_rotation,
            first: ShapeElementInfo::from_frame(first),
            second: ShapeElementInfo::from_frame(second),
        }
    }

    pub fn matches(&self, other: &Self, tolerances: &Tolerances) -> bool {
        self.kind == other.kind
            && self.first_object == other.first_object
            && self.second_object == other.second_object
            && self.offset == other.offset
            && self.angle == other.angle
            && self.direction == other.direction
            && self.lock_rotation == other.lock_rotation
            && self.first.matches(&other.first, tolerances)
            && self.second.matches(&other.second, tolerances)
    }
}

/// The anchor a cached tree was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct RootIdentity {
    pub object: ObjectId,
    pub placement: Placement,
    pub dofs: usize,
}

impl RootIdentity {
    pub fn new(vm: &VariableManager, root: ObjectIndex) -> Self {
        Self {
            object: vm.object_id(root).clone(),
            placement: vm.placement(root, vm.x0()),
            dofs: 0,
        }
    }

    fn matches(&self, other: &Self, tolerances: &Tolerances) -> bool {
        self.object == other.object
            && self.dofs == other.dofs
            && self
                .placement
                .is_close(&other.placement, tolerances.cache_position, tolerances.cache_axis)
    }
}

/// An object of the table the cached tree was built against.
#[derive(Debug, Clone, PartialEq)]
struct CachedObject {
    id: ObjectId,
    offset: Option<usize>,
    /// Placement the object had when the tree was built.
    initial: Placement,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    root: RootIdentity,
    inputs: Vec<CacheInput>,
    system: ConstraintSystem,
    objects: Vec<CachedObject>,
}

/// Caller-owned store for the most recent successful solve.
#[derive(Debug, Clone, Default)]
pub struct SolverCache {
    committed: Option<CacheEntry>,
    pending: Option<CacheEntry>,
}

impl SolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of constraints a matching solve could skip.
    pub fn cached_constraints(&self) -> usize {
        self.committed.as_ref().map_or(0, |e| e.inputs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_none()
    }

    /// Restore the longest reusable prefix for `inputs`, remapped onto `vm`.
    ///
    /// The returned tree holds one checkpoint per reused constraint; building
    /// resumes after the last one.
    pub fn retrieve(
        &self,
        root: &RootIdentity,
        inputs: &[CacheInput],
        vm: &VariableManager,
        tolerances: &Tolerances,
    ) -> Option<ConstraintSystem> {
        let entry = self.committed.as_ref()?;
        if !entry.root.matches(root, tolerances) {
            warn!(anchor = %root.object, "solver cache miss: anchor changed");
            return None;
        }
        let prefix = entry
            .inputs
            .iter()
            .zip(inputs)
            .take(entry.system.checkpoints().len())
            .take_while(|(cached, current)| cached.matches(current, tolerances))
            .count();
        if prefix == 0 {
            warn!(
                first = inputs.first().map(|i| i.name.as_str()).unwrap_or(""),
                "solver cache miss: first constraint changed"
            );
            return None;
        }

        let mut system = entry.system.clone();
        system.truncate(prefix);

        let table: Vec<Option<ObjectIndex>> = entry.objects.iter().map(|o| vm.index_of(&o.id)).collect();
        for &old in &system.leaf().contained {
            let cached = &entry.objects[old];
            let compatible = table[old].is_some_and(|new| {
                vm.is_fixed(new) == cached.offset.is_none()
                    && (!vm.is_fixed(new)
                        || vm.placement(new, vm.x0()).is_close(
                            &cached.initial,
                            tolerances.cache_position,
                            tolerances.cache_axis,
                        ))
            });
            if !compatible {
                warn!(object = %cached.id, "solver cache miss: object table changed");
                return None;
            }
        }

        for node in system.nodes_mut() {
            let mut x = vm.x0().to_vec();
            for &old in &node.contained {
                if let (Some(from), Some(new)) = (entry.objects[old].offset, table[old]) {
                    if let Some(to) = vm.offset(new) {
                        x[to..to + SLOTS_PER_OBJECT].copy_from_slice(&node.x[from..from + SLOTS_PER_OBJECT]);
                    }
                }
            }
            node.x = x;
        }
        system.remap(&|o| table.get(o).copied().flatten().unwrap_or(o));

        debug!(reused = prefix, of = inputs.len(), "solver cache hit");
        Some(system)
    }

    /// Stage the result of a successful solve; [`SolverCache::commit`] makes
    /// it visible to the next retrieve.
    pub fn record(&mut self, root: RootIdentity, inputs: Vec<CacheInput>, system: &ConstraintSystem, vm: &VariableManager) {
        let objects = (0..vm.object_count())
            .map(|i| CachedObject {
                id: vm.object_id(i).clone(),
                offset: vm.offset(i),
                initial: vm.placement(i, vm.x0()),
            })
            .collect();
        self.pending = Some(CacheEntry {
            root,
            inputs,
            system: system.clone(),
            objects,
        });
    }

    pub fn commit(&mut self) {
        if let Some(entry) = self.pending.take() {
            self.committed = Some(entry);
        }
    }

    pub fn invalidate(&mut self) {
        self.committed = None;
        self.pending = None;
    }

    /// Forget constraint `index` and everything after it.
    pub fn invalidate_from(&mut self, index: usize) {
        self.pending = None;
        if index == 0 {
            self.committed = None;
            return;
        }
        if let Some(entry) = &mut self.committed {
            entry.inputs.truncate(index);
            entry.system.truncate(index.min(entry.system.checkpoints().len()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: FeatureKind, position: Point3d, axis: Option<Vec3>) -> ShapeElementInfo {
        ShapeElementInfo { kind, position, axis }
    }

    #[test]
    fn shape_info_tolerances() {
        let t = Tolerances::default();
        let a = frame(FeatureKind::PlanarFace, Point3d::new(1.0, 0.0, 0.0), Some(Vec3::Z));
        let near = frame(FeatureKind::PlanarFace, Point3d::new(1.0 + 5e-6, 0.0, 0.0), Some(Vec3::Z));
        let far = frame(FeatureKind::PlanarFace, Point3d::new(1.0 + 5e-5, 0.0, 0.0), Some(Vec3::Z));
        let flipped = frame(FeatureKind::PlanarFace, Point3d::new(1.0, 0.0, 0.0), Some(-Vec3::Z));
        let edge = frame(FeatureKind::CircularEdge, Point3d::new(1.0, 0.0, 0.0), Some(Vec3::Z));
        assert!(a.matches(&near, &t));
        assert!(!a.matches(&far, &t));
        assert!(!a.matches(&flipped, &t));
        assert!(!a.matches(&edge, &t));
    }

    #[test]
    fn point_features_match_without_axis() {
        let t = Tolerances::default();
        let a = frame(FeatureKind::Vertex, Point3d::new(0.0, 1.0, 0.0), None);
        assert!(a.matches(&a.clone(), &t));
        let with_axis = frame(FeatureKind::Vertex, Point3d::new(0.0, 1.0, 0.0), Some(Vec3::X));
        assert!(!a.matches(&with_axis, &t));
    }

    #[test]
    fn empty_cache_never_hits() {
        let cache = SolverCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.cached_constraints(), 0);
    }
}
