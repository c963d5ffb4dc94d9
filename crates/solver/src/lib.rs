//! Assembly constraint solving for rigid parts.
//!
//! [`solve_constraints`] is the entry point: it reads the ordered constraint
//! list from an [`AssemblyDocument`], solves every free part's placement and
//! writes the result back. The default engine builds a chain of constraint
//! systems ([`system`]) that removes degrees of freedom one equation at a
//! time; [`assembly`] holds the whole-system fallback.

pub mod assembly;
pub mod cache;
pub mod constraint;
pub mod document;
pub mod dof;
pub mod numeric;
pub mod solver;
pub mod system;
pub mod variables;

pub use assembly::{solve_legacy, LegacyConfig, LegacyOutcome};
pub use cache::{CacheInput, RootIdentity, ShapeElementInfo, SolverCache};
pub use constraint::*;
pub use document::{
    AssemblyDocument, ConstraintProvider, DocumentModel, DocumentObject, GeometryAccessor, GeometryError,
    InMemoryDocument, LocalFeature,
};
pub use dof::{Dof, DofKind};
pub use numeric::{NewtonConfig, NewtonOutcome};
pub use solver::*;
pub use system::{ConstraintSystem, SolveMethod, SystemKind, SystemNode};
pub use variables::{ObjectIndex, VariableManager, SLOTS_PER_OBJECT};
