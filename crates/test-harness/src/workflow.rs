//! AssemblyBuilder: a fluent API for scripting assembly solves in tests.
//!
//! Wraps an [`InMemoryDocument`] and calls the real `solve_constraints`
//! entry point. Parts and constraints are addressed by name.

use mate_kernel::{Placement, Quaternion};
use mate_solver::variables::placement_to_slots;
use mate_solver::{
    solve_constraints, ConstraintProvider, ConstraintRecord, DirectionConstraint, DocumentModel, DocumentObject,
    FeatureSelection, InMemoryDocument, ObjectId, SolvedPlacements, SolverCache, SolverConfig, SolverEngine,
    SLOTS_PER_OBJECT,
};
use tracing::debug;

use crate::helpers::*;

/// A fluent builder for constructing and solving assemblies in tests.
pub struct AssemblyBuilder {
    doc: InMemoryDocument,
    config: SolverConfig,
    engine: SolverEngine,
    cache: Option<SolverCache>,
    history: Vec<(String, String)>,
}

impl Default for AssemblyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AssemblyBuilder {
    pub fn new() -> Self {
        Self::from_document(InMemoryDocument::new())
    }

    pub fn from_document(doc: InMemoryDocument) -> Self {
        Self {
            doc,
            config: SolverConfig::default(),
            engine: SolverEngine::DofReduction,
            cache: None,
            history: Vec::new(),
        }
    }

    /// Load a JSON fixture (see [`load_document_json`]).
    pub fn from_json(json: &str) -> Result<Self, HarnessError> {
        Ok(Self::from_document(load_document_json(json)?))
    }

    pub fn with_engine(mut self, engine: SolverEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Keep a solver cache across calls to [`AssemblyBuilder::solve`].
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(SolverCache::new());
        self
    }

    // ── Parts ───────────────────────────────────────────────────────────

    pub fn add_part(&mut self, part: DocumentObject) -> Result<&mut Self, HarnessError> {
        if self.doc.contains_object(&part.id) {
            return Err(HarnessError::DuplicateName {
                name: part.id.to_string(),
            });
        }
        self.history.push(("AddPart".into(), part.id.to_string()));
        self.doc.add_object(part);
        Ok(self)
    }

    pub fn add_box(&mut self, name: &str, size: [f64; 3], at: [f64; 3], fixed: bool) -> Result<&mut Self, HarnessError> {
        self.add_part(box_part(name, size, at, fixed))
    }

    pub fn add_cylinder(
        &mut self,
        name: &str,
        height: f64,
        at: [f64; 3],
        rotation: Quaternion,
        fixed: bool,
    ) -> Result<&mut Self, HarnessError> {
        self.add_part(cylinder_part(name, height, at, rotation, fixed))
    }

    pub fn add_plate_with_hole(
        &mut self,
        name: &str,
        size: [f64; 3],
        hole: [f64; 2],
        at: [f64; 3],
        fixed: bool,
    ) -> Result<&mut Self, HarnessError> {
        self.add_part(plate_with_hole(name, size, hole, at, fixed))
    }

    pub fn add_sphere(&mut self, name: &str, at: [f64; 3], fixed: bool) -> Result<&mut Self, HarnessError> {
        self.add_part(sphere_part(name, at, fixed))
    }

    pub fn set_fixed(&mut self, name: &str, fixed: bool) -> Result<&mut Self, HarnessError> {
        let id = self.object_id(name)?;
        self.doc.set_fixed(&id, fixed);
        self.history.push(("SetFixed".into(), format!("{name}={fixed}")));
        Ok(self)
    }

    /// Move a part by hand, as a user dragging it would.
    pub fn move_part(&mut self, name: &str, placement: Placement) -> Result<&mut Self, HarnessError> {
        let id = self.object_id(name)?;
        self.doc.set_object_placement(&id, placement);
        self.history.push(("MovePart".into(), name.to_string()));
        Ok(self)
    }

    // ── Constraints ─────────────────────────────────────────────────────

    pub fn add_constraint(&mut self, constraint: ConstraintRecord) -> Result<&mut Self, HarnessError> {
        if self.doc.list_constraints().iter().any(|c| c.name == constraint.name) {
            return Err(HarnessError::DuplicateName { name: constraint.name });
        }
        self.history.push(("AddConstraint".into(), constraint.to_string()));
        self.doc.add_constraint(constraint);
        Ok(self)
    }

    pub fn plane(
        &mut self,
        name: &str,
        first: (&str, &str),
        second: (&str, &str),
        offset: f64,
        direction: DirectionConstraint,
    ) -> Result<&mut Self, HarnessError> {
        self.add_constraint(ConstraintRecord::plane(name, sel(first), sel(second), offset, direction))
    }

    pub fn axial(
        &mut self,
        name: &str,
        first: (&str, &str),
        second: (&str, &str),
        direction: DirectionConstraint,
        lock_rotation: bool,
    ) -> Result<&mut Self, HarnessError> {
        self.add_constraint(ConstraintRecord::axial(name, sel(first), sel(second), direction, lock_rotation))
    }

    pub fn circular_edge(
        &mut self,
        name: &str,
        first: (&str, &str),
        second: (&str, &str),
        offset: f64,
        direction: DirectionConstraint,
        lock_rotation: bool,
    ) -> Result<&mut Self, HarnessError> {
        self.add_constraint(ConstraintRecord::circular_edge(
            name,
            sel(first),
            sel(second),
            offset,
            direction,
            lock_rotation,
        ))
    }

    pub fn angle(
        &mut self,
        name: &str,
        first: (&str, &str),
        second: (&str, &str),
        degrees: f64,
    ) -> Result<&mut Self, HarnessError> {
        self.add_constraint(ConstraintRecord::angle_between_planes(name, sel(first), sel(second), degrees))
    }

    pub fn spherical(&mut self, name: &str, first: (&str, &str), second: (&str, &str)) -> Result<&mut Self, HarnessError> {
        self.add_constraint(ConstraintRecord::spherical_surface(name, sel(first), sel(second)))
    }

    /// Edit an existing constraint in place.
    pub fn edit_constraint(
        &mut self,
        name: &str,
        edit: impl FnOnce(&mut ConstraintRecord),
    ) -> Result<&mut Self, HarnessError> {
        let c = self
            .doc
            .constraints_mut()
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| HarnessError::UnknownObject { name: name.to_string() })?;
        edit(c);
        self.history.push(("EditConstraint".into(), name.to_string()));
        Ok(self)
    }

    // ── Solving ─────────────────────────────────────────────────────────

    /// Run the configured engine over the whole document.
    pub fn solve(&mut self) -> Result<SolvedPlacements, HarnessError> {
        let result = solve_constraints(&mut self.doc, self.engine, self.cache.as_mut(), &self.config);
        match &result {
            Ok(s) => {
                debug!(dof = s.dof, written = s.written, "harness solve ok");
                self.history
                    .push(("Solve".into(), format!("{:?} dof={} resumed={}", s.engine, s.dof, s.resume_index)));
            }
            Err(e) => self.history.push(("Solve".into(), format!("failed: {e}"))),
        }
        Ok(result?)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    fn object_id(&self, name: &str) -> Result<ObjectId, HarnessError> {
        let id = ObjectId::new(name);
        if self.doc.contains_object(&id) {
            Ok(id)
        } else {
            Err(HarnessError::UnknownObject { name: name.to_string() })
        }
    }

    pub fn placement(&self, name: &str) -> Result<Placement, HarnessError> {
        let id = self.object_id(name)?;
        Ok(self.doc.object_placement(&id).map_err(mate_solver::SolverError::from)?)
    }

    /// Six canonical slots per named part, taken from the document.
    pub fn vector(&self, names: &[&str]) -> Result<Vec<f64>, HarnessError> {
        let mut out = Vec::with_capacity(names.len() * SLOTS_PER_OBJECT);
        for name in names {
            out.extend_from_slice(&placement_to_slots(&self.placement(name)?));
        }
        Ok(out)
    }

    pub fn document(&self) -> &InMemoryDocument {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut InMemoryDocument {
        &mut self.doc
    }

    pub fn cache(&self) -> Option<&SolverCache> {
        self.cache.as_ref()
    }

    pub fn cache_mut(&mut self) -> Option<&mut SolverCache> {
        self.cache.as_mut()
    }

    pub fn history(&self) -> &[(String, String)] {
        &self.history
    }

    pub fn to_json(&self) -> Result<String, HarnessError> {
        document_to_json(&self.doc)
    }
}

fn sel((object, feature): (&str, &str)) -> FeatureSelection {
    FeatureSelection::new(object, feature)
}
