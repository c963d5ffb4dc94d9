//! Remaining freedoms of a constraint-system node.
//!
//! A [`Dof`] never stores a value. Newton iterations and analytical solves
//! hand an explicit value vector to [`apply_dofs`], which returns a new
//! placement vector; a value of `0.0` leaves everything in place.

use std::fmt;

use mate_kernel::{Placement, Point3d, Quaternion, Vec3};

use crate::variables::{ObjectIndex, VariableManager};

/// How one scalar freedom moves its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum DofKind {
    /// One raw slot of a free object. Slots 0..3 translate along world x/y/z;
    /// slots 3..6 rotate about world x/y/z through `pivot` (owner-local,
    /// default the owner's origin).
    Placement { slot: usize, pivot: Option<Point3d> },
    /// Translation along `direction`, expressed in the local frame of `frame`
    /// (world when `None`).
    LinearMotion {
        direction: Vec3,
        frame: Option<ObjectIndex>,
    },
    /// Rotation about an owner-local axis through an owner-local pivot.
    AxisRotation { axis: Vec3, pivot: Point3d },
}

/// One scalar freedom of motion.
#[derive(Debug, Clone, PartialEq)]
pub struct Dof {
    /// Object whose feature geometry defines this freedom.
    pub owner: ObjectIndex,
    /// Objects moved rigidly with the owner, owner included.
    pub cluster: Vec<ObjectIndex>,
    pub kind: DofKind,
}

impl Dof {
    pub fn new(owner: ObjectIndex, kind: DofKind) -> Self {
        Self {
            owner,
            cluster: vec![owner],
            kind,
        }
    }

    /// The six raw freedoms of an unconstrained object.
    pub fn free_object(owner: ObjectIndex) -> Vec<Dof> {
        (0..6)
            .map(|slot| Dof::new(owner, DofKind::Placement { slot, pivot: None }))
            .collect()
    }

    pub fn linear(owner: ObjectIndex, direction: Vec3, frame: Option<ObjectIndex>) -> Self {
        Dof::new(
            owner,
            DofKind::LinearMotion {
                direction: direction.normalize_or(Vec3::Z),
                frame,
            },
        )
    }

    pub fn axis_rotation(owner: ObjectIndex, axis: Vec3, pivot: Point3d) -> Self {
        Dof::new(
            owner,
            DofKind::AxisRotation {
                axis: axis.normalize_or(Vec3::Z),
                pivot,
            },
        )
    }

    pub fn with_cluster(mut self, cluster: Vec<ObjectIndex>) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn is_rotation(&self) -> bool {
        match self.kind {
            DofKind::Placement { slot, .. } => slot >= 3,
            DofKind::LinearMotion { .. } => false,
            DofKind::AxisRotation { .. } => true,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.kind, DofKind::Placement { .. })
    }

    pub fn moves(&self, object: ObjectIndex) -> bool {
        self.cluster.contains(&object)
    }

    /// World-space rigid motion this freedom produces for value `v` at `x`.
    pub fn delta(&self, vm: &VariableManager, x: &[f64], v: f64) -> Placement {
        let owner = vm.placement(self.owner, x);
        match &self.kind {
            DofKind::Placement { slot, .. } if *slot < 3 => {
                let mut t = [0.0; 3];
                t[*slot] = v;
                Placement::from_translation(t[0], t[1], t[2])
            }
            DofKind::Placement { slot, pivot } => {
                let axis = [Vec3::X, Vec3::Y, Vec3::Z][slot - 3];
                let center = pivot
                    .map(|p| owner.transform_point(&p))
                    .unwrap_or(owner.position);
                Placement::rotation_about(&center, Quaternion::from_axis_angle(axis, v))
            }
            DofKind::LinearMotion { direction, frame } => {
                let d = match frame {
                    Some(f) => vm.rotate(*f, direction, x),
                    None => *direction,
                } * v;
                Placement::from_translation(d.x, d.y, d.z)
            }
            DofKind::AxisRotation { axis, pivot } => {
                let world_axis = owner.transform_vector(axis);
                let center = owner.transform_point(pivot);
                Placement::rotation_about(&center, Quaternion::from_axis_angle(world_axis, v))
            }
        }
    }

    /// Apply this freedom to `x` in place.
    pub fn apply(&self, vm: &VariableManager, x: &mut [f64], value: f64) {
        if value == 0.0 {
            return;
        }
        let delta = self.delta(vm, x, value);
        move_cluster(vm, x, &self.cluster, &delta);
    }

    /// World axis of a rotational freedom at `x`.
    pub fn world_axis(&self, vm: &VariableManager, x: &[f64]) -> Option<Vec3> {
        match &self.kind {
            DofKind::Placement { slot, .. } if *slot >= 3 => Some([Vec3::X, Vec3::Y, Vec3::Z][slot - 3]),
            DofKind::AxisRotation { axis, .. } => Some(vm.rotate(self.owner, axis, x)),
            _ => None,
        }
    }

    /// World pivot of a rotational freedom at `x`.
    pub fn world_pivot(&self, vm: &VariableManager, x: &[f64]) -> Option<Point3d> {
        let owner = vm.placement(self.owner, x);
        match &self.kind {
            DofKind::Placement { slot, pivot } if *slot >= 3 => {
                Some(pivot.map(|p| owner.transform_point(&p)).unwrap_or(owner.position))
            }
            DofKind::AxisRotation { pivot, .. } => Some(owner.transform_point(pivot)),
            _ => None,
        }
    }

    /// World direction of a translational freedom at `x`.
    pub fn world_direction(&self, vm: &VariableManager, x: &[f64]) -> Option<Vec3> {
        match &self.kind {
            DofKind::Placement { slot, .. } if *slot < 3 => Some([Vec3::X, Vec3::Y, Vec3::Z][*slot]),
            DofKind::LinearMotion { direction, frame } => Some(match frame {
                Some(f) => vm.rotate(*f, direction, x),
                None => *direction,
            }),
            _ => None,
        }
    }

    /// Rewrite object indices after the object table changed.
    pub fn remap(&mut self, map: &impl Fn(ObjectIndex) -> ObjectIndex) {
        self.owner = map(self.owner);
        for o in &mut self.cluster {
            *o = map(*o);
        }
        if let DofKind::LinearMotion { frame: Some(f), .. } = &mut self.kind {
            *f = map(*f);
        }
    }
}

impl fmt::Display for Dof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DofKind::Placement { slot, .. } => {
                let name = ["x", "y", "z", "rx", "ry", "rz"][*slot];
                write!(f, "Placement({name}) of #{}", self.owner)
            }
            DofKind::LinearMotion { direction, .. } => write!(
                f,
                "LinearMotion({:.3}, {:.3}, {:.3}) of #{}",
                direction.x, direction.y, direction.z, self.owner
            ),
            DofKind::AxisRotation { axis, .. } => write!(
                f,
                "AxisRotation({:.3}, {:.3}, {:.3}) of #{}",
                axis.x, axis.y, axis.z, self.owner
            ),
        }
    }
}

/// Apply `values[i]` to `dofs[i]` in order, starting from `base`.
pub fn apply_dofs(vm: &VariableManager, base: &[f64], dofs: &[Dof], values: &[f64]) -> Vec<f64> {
    let mut x = base.to_vec();
    for (dof, &value) in dofs.iter().zip(values) {
        dof.apply(vm, &mut x, value);
    }
    x
}

/// Apply the world-space motion `delta` to every object in `cluster`.
pub fn move_cluster(vm: &VariableManager, x: &mut [f64], cluster: &[ObjectIndex], delta: &Placement) {
    for &object in cluster {
        let moved = delta.then(&vm.placement(object, x));
        vm.set_placement(object, x, &moved);
    }
}

/// Extend every freedom that already carries `anchor` so it also carries `joined`.
pub fn attach_to_clusters(dofs: &mut [Dof], anchor: ObjectIndex, joined: ObjectIndex) {
    for dof in dofs {
        if dof.moves(anchor) && !dof.moves(joined) {
            dof.cluster.push(joined);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ObjectId;
    use crate::document::{DocumentObject, InMemoryDocument};
    use std::collections::BTreeMap;
    use std::f64::consts::FRAC_PI_2;

    fn vm() -> VariableManager {
        let mut d = InMemoryDocument::new();
        for (name, x) in [("A", 0.0), ("B", 10.0)] {
            d.add_object(DocumentObject {
                id: ObjectId::new(name),
                placement: Placement::from_translation(x, 0.0, 0.0),
                fixed: false,
                features: BTreeMap::new(),
            });
        }
        VariableManager::new(&d, &[ObjectId::new("A"), ObjectId::new("B")]).unwrap()
    }

    #[test]
    fn zero_values_leave_x_unchanged() {
        let vm = vm();
        let dofs = Dof::free_object(0);
        let x = apply_dofs(&vm, vm.x0(), &dofs, &[0.0; 6]);
        assert_eq!(x, vm.x0());
    }

    #[test]
    fn raw_translation_moves_whole_cluster() {
        let vm = vm();
        let dof = Dof::free_object(0)[1].clone().with_cluster(vec![0, 1]);
        let x = apply_dofs(&vm, vm.x0(), &[dof], &[2.5]);
        assert!((x[1] - 2.5).abs() < 1e-12);
        assert!((x[7] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn raw_rotation_swings_cluster_about_owner_origin() {
        let vm = vm();
        let dof = Dof::free_object(0)[5].clone().with_cluster(vec![0, 1]);
        let x = apply_dofs(&vm, vm.x0(), &[dof], &[FRAC_PI_2]);
        let b = vm.placement(1, &x);
        assert!(b.position.distance_to(&Point3d::new(0.0, 10.0, 0.0)) < 1e-9);
        let a = vm.placement(0, &x);
        assert!(a.position.distance_to(&Point3d::ORIGIN) < 1e-9);
        assert!((a.transform_vector(&Vec3::X) - Vec3::Y).length() < 1e-9);
    }

    #[test]
    fn axis_rotation_uses_local_pivot() {
        let vm = vm();
        let dof = Dof::axis_rotation(1, Vec3::Z, Point3d::new(-10.0, 0.0, 0.0));
        let x = apply_dofs(&vm, vm.x0(), &[dof], &[FRAC_PI_2]);
        let b = vm.placement(1, &x);
        assert!(b.position.distance_to(&Point3d::new(0.0, 10.0, 0.0)) < 1e-9);
    }

    #[test]
    fn attach_extends_matching_clusters_only() {
        let mut dofs = vec![Dof::linear(0, Vec3::X, None), Dof::linear(1, Vec3::Y, None)];
        attach_to_clusters(&mut dofs, 0, 2);
        assert_eq!(dofs[0].cluster, vec![0, 2]);
        assert_eq!(dofs[1].cluster, vec![1]);
    }
}
