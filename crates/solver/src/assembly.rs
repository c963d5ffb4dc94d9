//! Whole-system placement solver.
//!
//! Every free object contributes six unknowns `[dx, dy, dz, rx, ry, rz]`: a
//! translation and a rotation vector applied on top of its initial
//! placement. All constraint equations are solved at once with
//! Levenberg-Marquardt damping; when a run stalls the solve restarts from a
//! random perturbation. There is no DOF bookkeeping: the remaining freedom
//! is estimated from the rank of the Jacobian at the solution.

use std::f64::consts::PI;

use mate_kernel::{Placement, Quaternion, Vec3};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::constraint::ConstraintRecord;
use crate::numeric::{approximate_jacobian, norm, GradientMethod};
use crate::solver::{SolverConfig, SolverError};
use crate::system::{constraint_equations, ConstraintFeatures, UnionGeometry};
use crate::variables::{ObjectIndex, VariableManager, SLOTS_PER_OBJECT};

/// Levenberg-Marquardt settings of the whole-system engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Iterations per attempt.
    pub max_iterations: usize,
    pub lambda_initial: f64,
    pub lambda_factor: f64,
    /// Attempts after the first, each from a random start.
    pub restarts: usize,
    /// Translation range of a random start.
    pub restart_translation: f64,
    pub seed: u64,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            lambda_initial: 1e-3,
            lambda_factor: 10.0,
            restarts: 5,
            restart_translation: 10.0,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LegacyOutcome {
    /// Solved placement vector in the variable manager's layout.
    pub x: Vec<f64>,
    /// Numeric DOF estimate.
    pub dof: usize,
    pub residual: f64,
    pub attempts: usize,
    pub iterations: usize,
}

/// The flattened problem: equations over per-object increments.
struct Problem<'a> {
    vm: &'a VariableManager,
    equations: Vec<UnionGeometry>,
    /// Free objects in parameter order.
    free: Vec<ObjectIndex>,
    initial: Vec<Placement>,
}

impl<'a> Problem<'a> {
    fn new(vm: &'a VariableManager, constraints: &[ConstraintRecord], features: &[ConstraintFeatures]) -> Self {
        let equations = constraints
            .iter()
            .zip(features)
            .flat_map(|(c, f)| constraint_equations(c, f))
            .collect();
        let free: Vec<ObjectIndex> = (0..vm.object_count()).filter(|&o| !vm.is_fixed(o)).collect();
        let initial = free.iter().map(|&o| vm.placement(o, vm.x0())).collect();
        Self {
            vm,
            equations,
            free,
            initial,
        }
    }

    fn parameter_count(&self) -> usize {
        self.free.len() * SLOTS_PER_OBJECT
    }

    /// Placement vector for the increments `params`.
    fn placements(&self, params: &[f64]) -> Vec<f64> {
        let mut x = self.vm.x0().to_vec();
        for (k, (&object, start)) in self.free.iter().zip(&self.initial).enumerate() {
            let p = &params[k * SLOTS_PER_OBJECT..(k + 1) * SLOTS_PER_OBJECT];
            let rv = Vec3::new(p[3], p[4], p[5]);
            let turn = match rv.normalized() {
                Some(axis) => Quaternion::from_axis_angle(axis, rv.length()),
                None => Quaternion::IDENTITY,
            };
            let placement = Placement::new(
                start.position + Vec3::new(p[0], p[1], p[2]),
                (turn * start.rotation).normalized(),
            );
            self.vm.set_placement(object, &mut x, &placement);
        }
        x
    }

    fn residuals(&self, params: &[f64]) -> Vec<f64> {
        let x = self.placements(params);
        self.equations.iter().flat_map(|e| e.residual(self.vm, &x)).collect()
    }
}

/// Numerical rank of a Jacobian; singular values below `relative` times the
/// largest count as zero.
fn jacobian_rank(jac: &DMatrix<f64>, relative: f64) -> usize {
    if jac.is_empty() {
        return 0;
    }
    let sv = jac.clone().svd(false, false).singular_values;
    let max_sv = sv.iter().cloned().fold(0.0_f64, f64::max);
    if max_sv == 0.0 {
        return 0;
    }
    sv.iter().filter(|&&s| s > max_sv * relative).count()
}

/// One damped least-squares run from `params`. Returns the final parameters,
/// their residual norm and the iterations used.
fn levenberg_marquardt(
    problem: &Problem,
    mut params: Vec<f64>,
    config: &LegacyConfig,
    f_tol: f64,
    rng: &mut StdRng,
) -> (Vec<f64>, f64, usize) {
    let n = params.len();
    let f = |p: &[f64]| problem.residuals(p);
    let mut residuals = f(&params);
    let mut current = norm(&residuals);
    let mut lambda = config.lambda_initial;

    for iteration in 0..config.max_iterations {
        if current < f_tol || !current.is_finite() {
            return (params, current, iteration);
        }
        let jac = approximate_jacobian(&f, &params, &residuals, GradientMethod::Central, rng);
        let r = DVector::from_column_slice(&residuals);
        let jtr = jac.transpose() * &r;
        let jtj = jac.transpose() * &jac;

        let mut found_better = false;
        for _ in 0..10 {
            let mut damped = jtj.clone();
            for i in 0..n {
                damped[(i, i)] += lambda;
            }
            if let Some(dx) = damped.lu().solve(&jtr) {
                let trial: Vec<f64> = params.iter().zip(dx.iter()).map(|(p, d)| p - d).collect();
                let trial_residuals = f(&trial);
                let trial_norm = norm(&trial_residuals);
                if trial_norm < current {
                    params = trial;
                    residuals = trial_residuals;
                    current = trial_norm;
                    lambda = (lambda / config.lambda_factor).max(1e-15);
                    found_better = true;
                    break;
                }
            }
            lambda *= config.lambda_factor;
        }
        if !found_better {
            return (params, current, iteration + 1);
        }
    }
    (params, current, config.max_iterations)
}

/// Solve all constraints simultaneously.
#[instrument(skip_all, fields(constraints = constraints.len()))]
pub fn solve_legacy(
    vm: &VariableManager,
    constraints: &[ConstraintRecord],
    features: &[ConstraintFeatures],
    config: &SolverConfig,
) -> Result<LegacyOutcome, SolverError> {
    let problem = Problem::new(vm, constraints, features);
    let n = problem.parameter_count();
    let legacy = &config.legacy;
    let accept = config.tolerances.legacy_residual;
    let mut rng = StdRng::seed_from_u64(legacy.seed);

    let mut best: Option<(Vec<f64>, f64)> = None;
    let mut iterations = 0;
    let mut attempts = 0;
    for attempt in 0..=legacy.restarts {
        attempts = attempt + 1;
        let start: Vec<f64> = if attempt == 0 {
            vec![0.0; n]
        } else {
            (0..n)
                .map(|i| {
                    let range = if i % SLOTS_PER_OBJECT < 3 {
                        legacy.restart_translation
                    } else {
                        PI
                    };
                    rng.gen_range(-1.0..1.0) * range
                })
                .collect()
        };
        let (params, residual, used) =
            levenberg_marquardt(&problem, start, legacy, config.newton.f_tol, &mut rng);
        iterations += used;
        debug!(attempt, residual, iterations = used, "legacy attempt finished");
        if residual.is_finite() && best.as_ref().is_none_or(|(_, r)| residual < *r) {
            best = Some((params, residual));
        }
        if residual < accept {
            break;
        }
    }

    let Some((params, residual)) = best else {
        return Err(SolverError::NumericalDegeneracy {
            context: "every legacy attempt produced a non-finite residual".to_string(),
        });
    };
    if residual >= accept {
        return Err(SolverError::DidNotConverge { attempts, residual });
    }

    let fx = problem.residuals(&params);
    let jac = approximate_jacobian(&|p: &[f64]| problem.residuals(p), &params, &fx, GradientMethod::Central, &mut rng);
    let dof = n.saturating_sub(jacobian_rank(&jac, 1e-6));
    debug!(dof, residual, attempts, "legacy solve converged");
    Ok(LegacyOutcome {
        x: problem.placements(&params),
        dof,
        residual,
        attempts,
        iterations,
    })
}
