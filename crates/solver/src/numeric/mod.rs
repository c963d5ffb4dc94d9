//! Generic damped Newton root finder and its building blocks.
//!
//! Everything here works on plain `&[f64]` vectors and closures so it can be
//! reused by both the constraint-system tree and tests.

pub mod gradient;
pub mod line_search;
pub mod newton;

use serde::{Deserialize, Serialize};

pub use gradient::{approximate_jacobian, GradientMethod};
pub use line_search::{golden_section_search, quadratic_fit_search, LineSearchMethod};
pub use newton::{solve_via_newtons_method, NewtonOutcome, Termination};

/// Tuning of [`solve_via_newtons_method`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    pub max_iterations: usize,
    /// Stop when the accepted step is shorter than this (max norm).
    pub x_tol: f64,
    /// Stop when the residual norm is below this.
    pub f_tol: f64,
    /// Random restarts allowed when the search cycles or stalls.
    pub random_perturbations: usize,
    pub line_search_iterations: usize,
    pub gradient: GradientMethod,
    pub line_search: LineSearchMethod,
    pub seed: u64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            x_tol: 1e-12,
            f_tol: 1e-10,
            random_perturbations: 2,
            line_search_iterations: 10,
            gradient: GradientMethod::Central,
            line_search: LineSearchMethod::QuadraticFit,
            seed: 0x5eed,
        }
    }
}

/// Euclidean norm.
pub fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Largest absolute component.
pub fn max_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |m, x| m.max(x.abs()))
}
