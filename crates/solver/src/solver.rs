//! Top-level solve entry point, its configuration and its errors.

use std::f64::consts::PI;

use mate_kernel::Placement;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::assembly::{solve_legacy, LegacyConfig};
use crate::cache::{CacheInput, RootIdentity, SolverCache};
use crate::constraint::ObjectId;
use crate::document::{AssemblyDocument, GeometryError};
use crate::numeric::NewtonConfig;
use crate::system::{build_constraint_system, capture_constraint_features, select_root_object};
use crate::variables::{placement_to_slots, VariableManager, SLOTS_PER_OBJECT};

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("constraint {constraint} references missing object {object}")]
    BrokenReference { constraint: String, object: ObjectId },

    #[error("constraint {constraint} could not be satisfied (residual {residual:.3e})\n{trace}")]
    ConstraintUnsolvable {
        constraint: String,
        residual: f64,
        trace: String,
    },

    #[error("{union} cannot reduce this configuration: {detail}\n{trace}")]
    NotImplemented {
        union: &'static str,
        detail: String,
        trace: String,
    },

    #[error("numerical degeneracy: {context}")]
    NumericalDegeneracy { context: String },

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("solver did not converge after {attempts} attempts (residual: {residual:.3e})")]
    DidNotConverge { attempts: usize, residual: f64 },
}

/// Thresholds used across the solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Accepted error of a constraint equation.
    pub constraint: f64,
    /// Accepted distance of a point from an axis.
    pub axis_distance: f64,
    pub cache_position: f64,
    /// Cached axes match when their dot product is within this of 1.
    pub cache_axis: f64,
    pub write_translation: f64,
    /// Per quaternion component.
    pub write_rotation: f64,
    pub legacy_residual: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            constraint: 1e-9,
            axis_distance: 1e-4,
            cache_position: 1e-5,
            cache_axis: 1e-5,
            write_translation: 1e-8,
            write_rotation: 1e-6,
            legacy_residual: 1e-4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub tolerances: Tolerances,
    pub newton: NewtonConfig,
    /// Largest Newton step for a translational freedom.
    pub max_translation_step: f64,
    /// Largest Newton step for a rotational freedom, in radians.
    pub max_rotation_step: f64,
    pub legacy: LegacyConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerances: Tolerances::default(),
            newton: NewtonConfig::default(),
            max_translation_step: 10.0,
            max_rotation_step: PI / 5.0,
            legacy: LegacyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverEngine {
    /// Incremental DOF reduction over the constraint-system tree.
    #[default]
    DofReduction,
    /// Whole-system damped least squares with random restarts.
    NewtonSlsqp,
}

/// Outcome of a successful solve. Placements are already written back.
#[derive(Debug, Clone)]
pub struct SolvedPlacements {
    pub engine: SolverEngine,
    /// Every constrained object with its solved placement.
    pub placements: Vec<(ObjectId, Placement)>,
    /// Remaining degrees of freedom.
    pub dof: usize,
    /// Objects whose document placement actually changed.
    pub written: usize,
    /// Constraints reused from the cache.
    pub resume_index: usize,
    /// Dump of the constraint-system chain; empty for the legacy engine.
    pub trace: String,
}

impl SolvedPlacements {
    pub fn placement(&self, object: &ObjectId) -> Option<&Placement> {
        self.placements.iter().find(|(id, _)| id == object).map(|(_, p)| p)
    }

    /// Six canonical slots per listed object, fixed objects included.
    pub fn as_vector(&self, objects: &[ObjectId]) -> Vec<f64> {
        let mut out = Vec::with_capacity(objects.len() * SLOTS_PER_OBJECT);
        for id in objects {
            let p = self.placement(id).copied().unwrap_or_else(Placement::identity);
            out.extend_from_slice(&placement_to_slots(&p));
        }
        out
    }
}

/// Ordered distinct objects referenced by the constraints, after checking
/// that each exists in the document.
fn referenced_objects<D: AssemblyDocument + ?Sized>(
    document: &D,
    constraints: &[crate::constraint::ConstraintRecord],
) -> Result<Vec<ObjectId>, SolverError> {
    let mut objects: Vec<ObjectId> = Vec::new();
    for c in constraints {
        for id in c.objects() {
            if !document.contains_object(id) {
                return Err(SolverError::BrokenReference {
                    constraint: c.name.clone(),
                    object: id.clone(),
                });
            }
            if !objects.contains(id) {
                objects.push(id.clone());
            }
        }
    }
    Ok(objects)
}

/// Solve every constraint of `document` and write the new placements back.
///
/// Nothing is written when the solve fails. With the DOF-reduction engine a
/// `cache` lets a re-solve skip the unchanged prefix of the constraint list.
#[instrument(skip_all, fields(engine = ?engine))]
pub fn solve_constraints<D: AssemblyDocument + ?Sized>(
    document: &mut D,
    engine: SolverEngine,
    cache: Option<&mut SolverCache>,
    config: &SolverConfig,
) -> Result<SolvedPlacements, SolverError> {
    let constraints = document.list_constraints();
    let objects = referenced_objects(document, &constraints)?;
    let vm = VariableManager::new(document, &objects)?;
    let features = capture_constraint_features(document, &constraints, &vm)?;

    let (x, dof, resume_index, trace) = match engine {
        SolverEngine::DofReduction => {
            let root = select_root_object(&constraints, &vm);
            let identity = root.map(|r| RootIdentity::new(&vm, r));
            let inputs: Vec<CacheInput> = constraints
                .iter()
                .zip(&features)
                .map(|(c, f)| CacheInput::new(c, f))
                .collect();
            let mut cache = cache;
            let resume = match (cache.as_deref_mut(), &identity) {
                (Some(cache), Some(identity)) => cache.retrieve(identity, &inputs, &vm, &config.tolerances),
                _ => None,
            };
            let resume_index = resume.as_ref().map_or(0, |s| s.checkpoints().len());
            let system = build_constraint_system(&constraints, &features, &vm, config, resume)?;
            if let (Some(cache), Some(identity)) = (cache, identity) {
                cache.record(identity, inputs, &system, &vm);
                cache.commit();
            }
            let trace = system.trace(&|o| vm.object_id(o).to_string());
            (system.x().to_vec(), system.dof_count(), resume_index, trace)
        }
        SolverEngine::NewtonSlsqp => {
            let outcome = solve_legacy(&vm, &constraints, &features, config)?;
            (outcome.x, outcome.dof, 0, String::new())
        }
    };

    if x.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::NumericalDegeneracy {
            context: "solved placement vector is not finite".to_string(),
        });
    }
    let written = vm.update_document_values(
        document,
        &x,
        config.tolerances.write_translation,
        config.tolerances.write_rotation,
    )?;
    info!(
        engine = ?engine,
        constraints = constraints.len(),
        dof,
        written,
        resume_index,
        "solve complete"
    );
    Ok(SolvedPlacements {
        engine,
        placements: vm.placements(&x),
        dof,
        written,
        resume_index,
        trace,
    })
}
