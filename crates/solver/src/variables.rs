//! The flat placement vector and its mapping to document objects.
//!
//! Each free object owns six consecutive slots
//! `[x, y, z, azimuth, elevation, angle]`; fixed objects have no slots and
//! keep the placement they had when the manager was built.

use std::collections::HashMap;

use mate_kernel::{
    axis_to_azimuth_elevation, azimuth_elevation_to_axis, Placement, Point3d, Quaternion, Vec3,
};
use tracing::debug;

use crate::constraint::ObjectId;
use crate::document::{DocumentModel, GeometryError};

/// Number of placement slots per free object.
pub const SLOTS_PER_OBJECT: usize = 6;

/// Position of an object in the manager's object table.
pub type ObjectIndex = usize;

#[derive(Debug, Clone, PartialEq)]
struct ManagedObject {
    id: ObjectId,
    /// Start of this object's six slots; `None` for fixed objects.
    offset: Option<usize>,
    /// Placement at build time, authoritative for fixed objects.
    initial: Placement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableManager {
    objects: Vec<ManagedObject>,
    index: HashMap<ObjectId, ObjectIndex>,
    x0: Vec<f64>,
}

/// Canonical six-slot encoding of a placement.
pub fn placement_to_slots(placement: &Placement) -> [f64; SLOTS_PER_OBJECT] {
    let aa = placement.rotation.to_axis_angle();
    let (azimuth, elevation) = if aa.angle == 0.0 {
        (0.0, 0.0)
    } else {
        axis_to_azimuth_elevation(&aa.axis)
    };
    let p = placement.position;
    [p.x, p.y, p.z, azimuth, elevation, aa.angle]
}

pub fn slots_to_placement(slots: &[f64]) -> Placement {
    let axis = azimuth_elevation_to_axis(slots[3], slots[4]);
    Placement::new(
        Point3d::new(slots[0], slots[1], slots[2]),
        Quaternion::from_axis_angle(axis, slots[5]),
    )
}

impl VariableManager {
    /// Build from the ordered, distinct objects referenced by the constraints.
    pub fn new<D: DocumentModel + ?Sized>(document: &D, objects: &[ObjectId]) -> Result<Self, GeometryError> {
        let mut managed = Vec::with_capacity(objects.len());
        let mut index = HashMap::new();
        let mut x0 = Vec::new();
        for id in objects {
            if index.contains_key(id) {
                continue;
            }
            let placement = document.object_placement(id)?;
            let offset = if document.is_object_fixed(id) {
                None
            } else {
                let offset = x0.len();
                x0.extend_from_slice(&placement_to_slots(&placement));
                Some(offset)
            };
            index.insert(id.clone(), managed.len());
            managed.push(ManagedObject {
                id: id.clone(),
                offset,
                initial: placement,
            });
        }
        debug!(objects = managed.len(), variables = x0.len(), "variable manager built");
        Ok(Self {
            objects: managed,
            index,
            x0,
        })
    }

    pub fn x0(&self) -> &[f64] {
        &self.x0
    }

    /// Length of the placement vector.
    pub fn len(&self) -> usize {
        self.x0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x0.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object_id(&self, object: ObjectIndex) -> &ObjectId {
        &self.objects[object].id
    }

    pub fn object_ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.objects.iter().map(|o| &o.id)
    }

    pub fn index_of(&self, id: &ObjectId) -> Option<ObjectIndex> {
        self.index.get(id).copied()
    }

    pub fn is_fixed(&self, object: ObjectIndex) -> bool {
        self.objects[object].offset.is_none()
    }

    pub fn offset(&self, object: ObjectIndex) -> Option<usize> {
        self.objects[object].offset
    }

    /// Absolute placement of `object` as encoded in `x`.
    pub fn placement(&self, object: ObjectIndex, x: &[f64]) -> Placement {
        let o = &self.objects[object];
        match o.offset {
            Some(off) => slots_to_placement(&x[off..off + SLOTS_PER_OBJECT]),
            None => o.initial,
        }
    }

    /// Write `placement` into `object`'s slots. Fixed objects are left alone.
    pub fn set_placement(&self, object: ObjectIndex, x: &mut [f64], placement: &Placement) {
        if let Some(off) = self.objects[object].offset {
            x[off..off + SLOTS_PER_OBJECT].copy_from_slice(&placement_to_slots(placement));
        }
    }

    /// Copy `object`'s slots from `source` into `target`.
    pub fn copy_slots(&self, object: ObjectIndex, source: &[f64], target: &mut [f64]) {
        if let Some(off) = self.objects[object].offset {
            target[off..off + SLOTS_PER_OBJECT].copy_from_slice(&source[off..off + SLOTS_PER_OBJECT]);
        }
    }

    /// Apply only the rotation of `object` to a local vector.
    pub fn rotate(&self, object: ObjectIndex, local: &Vec3, x: &[f64]) -> Vec3 {
        self.placement(object, x).transform_vector(local)
    }

    /// Express a world vector in `object`'s local frame.
    pub fn rotate_undo(&self, object: ObjectIndex, world: &Vec3, x: &[f64]) -> Vec3 {
        self.placement(object, x).untransform_vector(world)
    }

    pub fn rotate_and_move(&self, object: ObjectIndex, local: &Point3d, x: &[f64]) -> Point3d {
        self.placement(object, x).transform_point(local)
    }

    pub fn rotate_and_move_undo(&self, object: ObjectIndex, world: &Point3d, x: &[f64]) -> Point3d {
        self.placement(object, x).untransform_point(world)
    }

    /// Every managed object with its placement under `x`, in table order.
    pub fn placements(&self, x: &[f64]) -> Vec<(ObjectId, Placement)> {
        (0..self.objects.len())
            .map(|i| (self.objects[i].id.clone(), self.placement(i, x)))
            .collect()
    }

    /// Write solved placements back, skipping objects whose placement did not
    /// change beyond `linear_tol` / `rotation_tol`. Returns the number written.
    pub fn update_document_values<D: DocumentModel + ?Sized>(
        &self,
        document: &mut D,
        x: &[f64],
        linear_tol: f64,
        rotation_tol: f64,
    ) -> Result<usize, GeometryError> {
        let mut written = 0;
        for (i, o) in self.objects.iter().enumerate() {
            if o.offset.is_none() {
                continue;
            }
            let new = self.placement(i, x);
            let current = document.object_placement(&o.id)?;
            if new.is_close(&current, linear_tol, rotation_tol) {
                continue;
            }
            document.set_object_placement(&o.id, new);
            written += 1;
        }
        debug!(written, "placements written back");
        Ok(written)
    }
}
