//! Structured text reports of a solved assembly.
//!
//! Reports are plain text meant for reading in test output: one line per
//! part placement, the constraint list with oracle verdicts and the solver's
//! constraint-system trace.

use std::fmt;

use mate_solver::variables::placement_to_slots;
use mate_solver::{ConstraintProvider, InMemoryDocument, SolvedPlacements};

use crate::oracle::{self, OracleVerdict};

/// One part's solved placement.
pub struct PartEntry {
    pub name: String,
    pub fixed: bool,
    /// `[x, y, z, azimuth, elevation, angle]`.
    pub slots: [f64; 6],
}

/// A complete assembly report with all sections.
pub struct AssemblyReport {
    pub engine: String,
    pub dof: usize,
    pub written: usize,
    pub resume_index: usize,
    pub parts: Vec<PartEntry>,
    pub constraints: Vec<String>,
    pub oracle_results: Vec<OracleVerdict>,
    pub trace: String,
}

impl AssemblyReport {
    /// Collect a report from a document right after `solved` was produced.
    pub fn generate(doc: &InMemoryDocument, solved: &SolvedPlacements, tol: f64) -> Self {
        let parts = doc
            .objects()
            .iter()
            .map(|o| PartEntry {
                name: o.id.to_string(),
                fixed: o.fixed,
                slots: placement_to_slots(&o.placement),
            })
            .collect();
        Self {
            engine: format!("{:?}", solved.engine),
            dof: solved.dof,
            written: solved.written,
            resume_index: solved.resume_index,
            parts,
            constraints: doc.list_constraints().iter().map(|c| c.to_string()).collect(),
            oracle_results: oracle::check_all_constraints(doc, tol),
            trace: solved.trace.clone(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.oracle_results.iter().all(|v| v.passed)
    }

    /// Format the report as text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Assembly Solve Report ===\n\n");
        out.push_str(&format!(
            "Engine: {} | DOF: {} | written: {} | resumed after: {}\n",
            self.engine, self.dof, self.written, self.resume_index,
        ));

        out.push_str(&format!("\nParts ({}):\n", self.parts.len()));
        for p in &self.parts {
            let [x, y, z, az, el, angle] = p.slots;
            let tag = if p.fixed { " [FIXED]" } else { "" };
            out.push_str(&format!(
                "  \"{}\"{}: pos=({:.4}, {:.4}, {:.4}) axis(az={:.4}, el={:.4}) angle={:.4}\n",
                p.name, tag, x, y, z, az, el, angle,
            ));
        }

        out.push_str(&format!("\nConstraints ({}):\n", self.constraints.len()));
        for (i, c) in self.constraints.iter().enumerate() {
            out.push_str(&format!("  [{i}] {c}\n"));
        }

        if !self.oracle_results.is_empty() {
            out.push_str(&format!("\nOracle Results ({} checks):\n", self.oracle_results.len()));
            for v in &self.oracle_results {
                let status = if v.passed { "PASS" } else { "FAIL" };
                out.push_str(&format!("  [{}] {}: {}\n", status, v.oracle_name, v.detail));
            }
        }

        if !self.trace.is_empty() {
            out.push_str("\nConstraint Systems:\n");
            out.push_str(&self.trace);
        }
        out
    }
}

impl fmt::Display for AssemblyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}
