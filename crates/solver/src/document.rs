//! Boundary between the solver and its host document.
//!
//! The solver never sees B-Rep data or document properties directly; it asks
//! a [`GeometryAccessor`] for classified feature geometry, reads and writes
//! placements through a [`DocumentModel`], and takes its ordered constraint
//! list from a [`ConstraintProvider`]. [`InMemoryDocument`] implements all
//! three for tests and fixtures.

use std::collections::{BTreeMap, HashMap};

use mate_kernel::{Placement, Point3d, Vec3};
use serde::{Deserialize, Serialize};

use crate::constraint::{ConstraintRecord, FeatureKind, ObjectId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("feature {feature} not found on {object}")]
    FeatureNotFound { object: ObjectId, feature: String },

    #[error("{kind:?} feature {feature} on {object} has no {query}")]
    NotImplemented {
        object: ObjectId,
        feature: String,
        kind: FeatureKind,
        query: &'static str,
    },
}

/// Classified feature geometry in world coordinates at the current placement.
pub trait GeometryAccessor {
    fn feature_kind(&self, object: &ObjectId, feature: &str) -> Result<FeatureKind, GeometryError>;
    fn feature_position(&self, object: &ObjectId, feature: &str) -> Result<Point3d, GeometryError>;
    fn feature_axis(&self, object: &ObjectId, feature: &str) -> Result<Vec3, GeometryError>;
}

/// Placement storage of the host document.
pub trait DocumentModel {
    fn contains_object(&self, object: &ObjectId) -> bool;
    fn object_placement(&self, object: &ObjectId) -> Result<Placement, GeometryError>;
    fn set_object_placement(&mut self, object: &ObjectId, placement: Placement);
    /// Fixed objects anchor the solve and are never moved.
    fn is_object_fixed(&self, object: &ObjectId) -> bool;
}

/// Authoritative, ordered constraint list.
pub trait ConstraintProvider {
    fn list_constraints(&self) -> Vec<ConstraintRecord>;
}

/// Everything a solve needs from the host.
pub trait AssemblyDocument: GeometryAccessor + DocumentModel + ConstraintProvider {}

impl<T: GeometryAccessor + DocumentModel + ConstraintProvider> AssemblyDocument for T {}

// ── In-memory implementation ────────────────────────────────────────────────

/// A feature in its part's local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalFeature {
    pub kind: FeatureKind,
    pub position: Point3d,
    /// Normal or axis direction; absent for point-like features.
    #[serde(default)]
    pub axis: Option<Vec3>,
}

impl LocalFeature {
    pub fn new(kind: FeatureKind, position: Point3d, axis: Option<Vec3>) -> Self {
        Self {
            kind,
            position,
            axis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentObject {
    pub id: ObjectId,
    pub placement: Placement,
    #[serde(default)]
    pub fixed: bool,
    pub features: BTreeMap<String, LocalFeature>,
}

/// A self-contained assembly document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryDocument {
    objects: Vec<DocumentObject>,
    #[serde(default)]
    constraints: Vec<ConstraintRecord>,
    /// Number of placement writes received; lets callers observe write suppression.
    #[serde(skip)]
    placement_writes: usize,
    #[serde(skip)]
    index: HashMap<ObjectId, usize>,
}

impl InMemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the lookup index, e.g. after deserializing.
    pub fn reindex(&mut self) {
        self.index = self
            .objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.id.clone(), i))
            .collect();
    }

    pub fn add_object(&mut self, object: DocumentObject) {
        let id = object.id.clone();
        match self.index.get(&id) {
            Some(&i) => self.objects[i] = object,
            None => {
                self.index.insert(id, self.objects.len());
                self.objects.push(object);
            }
        }
    }

    pub fn remove_object(&mut self, id: &ObjectId) -> Option<DocumentObject> {
        let pos = self.objects.iter().position(|o| &o.id == id)?;
        let removed = self.objects.remove(pos);
        self.reindex();
        Some(removed)
    }

    pub fn add_constraint(&mut self, constraint: ConstraintRecord) {
        self.constraints.push(constraint);
    }

    pub fn constraints_mut(&mut self) -> &mut Vec<ConstraintRecord> {
        &mut self.constraints
    }

    pub fn object(&self, id: &ObjectId) -> Option<&DocumentObject> {
        self.index.get(id).map(|&i| &self.objects[i])
    }

    pub fn object_mut(&mut self, id: &ObjectId) -> Option<&mut DocumentObject> {
        self.index.get(id).map(|&i| &mut self.objects[i])
    }

    pub fn objects(&self) -> &[DocumentObject] {
        &self.objects
    }

    pub fn set_fixed(&mut self, id: &ObjectId, fixed: bool) {
        if let Some(o) = self.object_mut(id) {
            o.fixed = fixed;
        }
    }

    pub fn placement_writes(&self) -> usize {
        self.placement_writes
    }

    fn feature(&self, object: &ObjectId, feature: &str) -> Result<(&DocumentObject, &LocalFeature), GeometryError> {
        let obj = self
            .object(object)
            .ok_or_else(|| GeometryError::ObjectNotFound(object.clone()))?;
        let f = obj
            .features
            .get(feature)
            .ok_or_else(|| GeometryError::FeatureNotFound {
                object: object.clone(),
                feature: feature.to_string(),
            })?;
        Ok((obj, f))
    }
}

impl GeometryAccessor for InMemoryDocument {
    fn feature_kind(&self, object: &ObjectId, feature: &str) -> Result<FeatureKind, GeometryError> {
        Ok(self.feature(object, feature)?.1.kind)
    }

    fn feature_position(&self, object: &ObjectId, feature: &str) -> Result<Point3d, GeometryError> {
        let (obj, f) = self.feature(object, feature)?;
        Ok(obj.placement.transform_point(&f.position))
    }

    fn feature_axis(&self, object: &ObjectId, feature: &str) -> Result<Vec3, GeometryError> {
        let (obj, f) = self.feature(object, feature)?;
        match f.axis {
            Some(axis) if !f.kind.is_point_like() => Ok(obj.placement.transform_vector(&axis)),
            _ => Err(GeometryError::NotImplemented {
                object: object.clone(),
                feature: feature.to_string(),
                kind: f.kind,
                query: "axis",
            }),
        }
    }
}

impl DocumentModel for InMemoryDocument {
    fn contains_object(&self, object: &ObjectId) -> bool {
        self.index.contains_key(object)
    }

    fn object_placement(&self, object: &ObjectId) -> Result<Placement, GeometryError> {
        self.object(object)
            .map(|o| o.placement)
            .ok_or_else(|| GeometryError::ObjectNotFound(object.clone()))
    }

    fn set_object_placement(&mut self, object: &ObjectId, placement: Placement) {
        if let Some(o) = self.object_mut(object) {
            o.placement = placement;
            self.placement_writes += 1;
        }
    }

    fn is_object_fixed(&self, object: &ObjectId) -> bool {
        self.object(object).is_some_and(|o| o.fixed)
    }
}

impl ConstraintProvider for InMemoryDocument {
    fn list_constraints(&self) -> Vec<ConstraintRecord> {
        self.constraints.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mate_kernel::Quaternion;
    use std::f64::consts::FRAC_PI_2;

    fn doc_with_plate() -> InMemoryDocument {
        let mut features = BTreeMap::new();
        features.insert(
            "Face1".to_string(),
            LocalFeature::new(FeatureKind::PlanarFace, Point3d::new(0.0, 0.0, 1.0), Some(Vec3::Z)),
        );
        features.insert(
            "Vertex1".to_string(),
            LocalFeature::new(FeatureKind::Vertex, Point3d::new(1.0, 0.0, 0.0), None),
        );
        let mut doc = InMemoryDocument::new();
        doc.add_object(DocumentObject {
            id: ObjectId::new("Plate"),
            placement: Placement::new(
                Point3d::new(0.0, 0.0, 5.0),
                Quaternion::from_axis_angle(Vec3::X, FRAC_PI_2),
            ),
            fixed: false,
            features,
        });
        doc
    }

    #[test]
    fn feature_geometry_follows_placement() {
        let doc = doc_with_plate();
        let id = ObjectId::new("Plate");
        let p = doc.feature_position(&id, "Face1").unwrap();
        assert!(p.distance_to(&Point3d::new(0.0, -1.0, 5.0)) < 1e-12);
        let n = doc.feature_axis(&id, "Face1").unwrap();
        assert!((n - (-Vec3::Y)).length() < 1e-12);
    }

    #[test]
    fn vertex_has_no_axis() {
        let doc = doc_with_plate();
        let err = doc.feature_axis(&ObjectId::new("Plate"), "Vertex1").unwrap_err();
        assert!(matches!(err, GeometryError::NotImplemented { query: "axis", .. }));
    }

    #[test]
    fn missing_feature_is_reported() {
        let doc = doc_with_plate();
        let err = doc.feature_kind(&ObjectId::new("Plate"), "Face9").unwrap_err();
        assert!(matches!(err, GeometryError::FeatureNotFound { .. }));
    }

    #[test]
    fn placement_writes_are_counted() {
        let mut doc = doc_with_plate();
        doc.set_object_placement(&ObjectId::new("Plate"), Placement::identity());
        doc.set_object_placement(&ObjectId::new("Missing"), Placement::identity());
        assert_eq!(doc.placement_writes(), 1);
    }

    #[test]
    fn deserialized_document_needs_reindex() {
        let doc = doc_with_plate();
        let json = serde_json::to_string(&doc).unwrap();
        let mut back: InMemoryDocument = serde_json::from_str(&json).unwrap();
        back.reindex();
        assert!(back.contains_object(&ObjectId::new("Plate")));
    }
}
