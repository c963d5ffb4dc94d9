//! Rich assertion helpers with diagnostic output.
//!
//! Every failure carries expected vs actual values and, where a solve is
//! involved, the solver's constraint-system trace.

use mate_kernel::Placement;
use mate_solver::{InMemoryDocument, SolvedPlacements};

use crate::helpers::{max_abs_difference, HarnessError};
use crate::oracle;

/// Assert a placement vector matches component-wise within `tol`.
pub fn assert_vector_close(actual: &[f64], expected: &[f64], tol: f64, ctx: &str) -> Result<(), HarnessError> {
    let diff = max_abs_difference(actual, expected);
    if diff <= tol {
        return Ok(());
    }
    let fmt = |v: &[f64]| v.iter().map(|x| format!("{x:.8}")).collect::<Vec<_>>().join(", ");
    Err(HarnessError::AssertionFailed {
        detail: format!(
            "[{}] vectors differ by {:.3e} (tol={})\n  expected: [{}]\n  actual:   [{}]",
            ctx,
            diff,
            tol,
            fmt(expected),
            fmt(actual),
        ),
    })
}

/// Assert two placements describe the same rigid transform.
pub fn assert_placement_close(
    actual: &Placement,
    expected: &Placement,
    tol: f64,
    ctx: &str,
) -> Result<(), HarnessError> {
    if actual.is_close(expected, tol, tol) {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!("[{}] expected {:?}, got {:?} (tol={})", ctx, expected, actual, tol),
        })
    }
}

/// Assert every constraint in the document holds within `tol`.
pub fn assert_constraints_hold(
    doc: &InMemoryDocument,
    solved: Option<&SolvedPlacements>,
    tol: f64,
) -> Result<(), HarnessError> {
    let failures: Vec<String> = oracle::check_all_constraints(doc, tol)
        .into_iter()
        .filter(|v| !v.passed)
        .map(|v| format!("  {}", v.detail))
        .collect();
    if failures.is_empty() {
        return Ok(());
    }
    let trace = solved.map(|s| s.trace.as_str()).unwrap_or("");
    Err(HarnessError::OracleFailure {
        oracle: "constraint_satisfied".to_string(),
        detail: format!("{} constraints violated:\n{}\n{}", failures.len(), failures.join("\n"), trace),
    })
}
