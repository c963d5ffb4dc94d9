use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a part in the host document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Name of a classified feature on a part, e.g. `"Face3"` or `"Edge7"`.
pub type FeatureRef = String;

/// Category assigned to a feature by the geometry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    PlanarFace,
    CylindricalFace,
    CircularEdge,
    LinearEdge,
    Vertex,
    SphericalFace,
}

impl FeatureKind {
    /// Point-like features carry a position but no usable axis.
    pub fn is_point_like(&self) -> bool {
        matches!(self, FeatureKind::Vertex | FeatureKind::SphericalFace)
    }
}

/// Constraint type tag as authored by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    #[serde(rename = "plane")]
    Plane,
    #[serde(rename = "axial")]
    Axial,
    #[serde(rename = "circularEdge")]
    CircularEdge,
    #[serde(rename = "angle_between_planes")]
    AngleBetweenPlanes,
    #[serde(rename = "sphericalSurface")]
    SphericalSurface,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ConstraintKind::Plane => "plane",
            ConstraintKind::Axial => "axial",
            ConstraintKind::CircularEdge => "circularEdge",
            ConstraintKind::AngleBetweenPlanes => "angle_between_planes",
            ConstraintKind::SphericalSurface => "sphericalSurface",
        };
        f.write_str(tag)
    }
}

/// Required relative sense of the two feature axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionConstraint {
    /// Either sense satisfies the constraint.
    #[default]
    None,
    Aligned,
    Opposed,
}

/// One side of a constraint: an object and a feature on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSelection {
    pub object: ObjectId,
    pub feature: FeatureRef,
}

impl FeatureSelection {
    pub fn new(object: impl Into<String>, feature: impl Into<String>) -> Self {
        Self {
            object: ObjectId::new(object),
            feature: feature.into(),
        }
    }
}

/// Immutable description of one mating constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRecord {
    /// Document label, used in diagnostics.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConstraintKind,
    pub first: FeatureSelection,
    pub second: FeatureSelection,
    /// Plane offset along the first feature's normal.
    #[serde(default)]
    pub offset: f64,
    /// Angle between plane normals, in degrees.
    #[serde(default)]
    pub angle: f64,
    #[serde(default)]
    pub direction: DirectionConstraint,
    #[serde(default)]
    pub lock_rotation: bool,
}

impl ConstraintRecord {
    fn with_kind(
        name: &str,
        kind: ConstraintKind,
        first: FeatureSelection,
        second: FeatureSelection,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            first,
            second,
            offset: 0.0,
            angle: 0.0,
            direction: DirectionConstraint::None,
            lock_rotation: false,
        }
    }

    pub fn plane(
        name: &str,
        first: FeatureSelection,
        second: FeatureSelection,
        offset: f64,
        direction: DirectionConstraint,
    ) -> Self {
        Self {
            offset,
            direction,
            ..Self::with_kind(name, ConstraintKind::Plane, first, second)
        }
    }

    pub fn axial(
        name: &str,
        first: FeatureSelection,
        second: FeatureSelection,
        direction: DirectionConstraint,
        lock_rotation: bool,
    ) -> Self {
        Self {
            direction,
            lock_rotation,
            ..Self::with_kind(name, ConstraintKind::Axial, first, second)
        }
    }

    pub fn circular_edge(
        name: &str,
        first: FeatureSelection,
        second: FeatureSelection,
        offset: f64,
        direction: DirectionConstraint,
        lock_rotation: bool,
    ) -> Self {
        Self {
            offset,
            direction,
            lock_rotation,
            ..Self::with_kind(name, ConstraintKind::CircularEdge, first, second)
        }
    }

    pub fn angle_between_planes(
        name: &str,
        first: FeatureSelection,
        second: FeatureSelection,
        angle_degrees: f64,
    ) -> Self {
        Self {
            angle: angle_degrees,
            ..Self::with_kind(name, ConstraintKind::AngleBetweenPlanes, first, second)
        }
    }

    pub fn spherical_surface(name: &str, first: FeatureSelection, second: FeatureSelection) -> Self {
        Self::with_kind(name, ConstraintKind::SphericalSurface, first, second)
    }

    pub fn angle_radians(&self) -> f64 {
        self.angle.to_radians()
    }

    pub fn objects(&self) -> [&ObjectId; 2] {
        [&self.first.object, &self.second.object]
    }
}

impl fmt::Display for ConstraintRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}: {}.{} -> {}.{})",
            self.name,
            self.kind,
            self.first.object,
            self.first.feature,
            self.second.object,
            self.second.feature
        )
    }
}
