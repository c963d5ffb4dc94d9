//! Damped Gauss-Newton with step clamping, line search and random kicks.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use super::gradient::approximate_jacobian;
use super::line_search::{golden_section_search, quadratic_fit_search, LineSearchMethod};
use super::{max_norm, norm, NewtonConfig};

/// Why the iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    ResidualBelowTolerance,
    StepBelowTolerance,
    MaxIterations,
    /// The residual became NaN or infinite.
    NonFinite,
}

#[derive(Debug, Clone)]
pub struct NewtonOutcome {
    /// Best iterate seen.
    pub x: Vec<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
    pub perturbations: usize,
    pub termination: Termination,
}

impl NewtonOutcome {
    pub fn converged(&self, tolerance: f64) -> bool {
        self.residual_norm < tolerance
    }
}

/// Drive `f(x)` towards zero starting from `x0`.
///
/// `max_step[i]` bounds the magnitude of each step component; the whole step
/// is scaled uniformly so its direction is preserved. The caller decides
/// whether the final residual is good enough.
pub fn solve_via_newtons_method<F>(
    f: F,
    x0: &[f64],
    max_step: &[f64],
    config: &NewtonConfig,
) -> NewtonOutcome
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = x0.len();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut x = x0.to_vec();
    let mut fx = f(&x);
    let mut fnorm = norm(&fx);
    let mut best = (x.clone(), fnorm);
    let mut history: Vec<Vec<f64>> = vec![x.clone()];
    let mut perturbations = 0;

    let finish = |best: (Vec<f64>, f64), iterations, perturbations, termination| NewtonOutcome {
        x: best.0,
        residual_norm: best.1,
        iterations,
        perturbations,
        termination,
    };

    if n == 0 {
        let t = if fnorm < config.f_tol {
            Termination::ResidualBelowTolerance
        } else {
            Termination::StepBelowTolerance
        };
        return finish(best, 0, 0, t);
    }

    for iteration in 0..config.max_iterations {
        if !fnorm.is_finite() {
            return finish(best, iteration, perturbations, Termination::NonFinite);
        }
        if fnorm < config.f_tol {
            return finish(best, iteration, perturbations, Termination::ResidualBelowTolerance);
        }

        let jac = approximate_jacobian(&f, &x, &fx, config.gradient, &mut rng);
        let mut step = least_squares_step(jac, &fx);
        clamp_step(&mut step, max_step);

        let trial = |t: f64| {
            let xt: Vec<f64> = x.iter().zip(&step).map(|(xi, si)| xi + t * si).collect();
            let v = norm(&f(&xt));
            if v.is_finite() { v } else { f64::INFINITY }
        };
        let (mut t, mut t_norm) = match config.line_search {
            LineSearchMethod::QuadraticFit => quadratic_fit_search(&trial, config.line_search_iterations),
            LineSearchMethod::GoldenSection => {
                golden_section_search(&trial, 0.0, 1.0, config.line_search_iterations)
            }
        };
        if t_norm >= fnorm && config.line_search == LineSearchMethod::QuadraticFit {
            (t, t_norm) = golden_section_search(&trial, 0.0, 1.0, config.line_search_iterations);
        }

        let improved = t_norm < fnorm;
        let accepted: Vec<f64> = if improved {
            x.iter().zip(&step).map(|(xi, si)| xi + t * si).collect()
        } else {
            x.clone()
        };
        let step_len = if improved { t * max_norm(&step) } else { 0.0 };

        let revisited = improved
            && history
                .iter()
                .any(|h| h.iter().zip(&accepted).all(|(a, b)| (a - b).abs() <= config.x_tol * 10.0));
        let stalled = step_len < config.x_tol;

        if (revisited || stalled) && perturbations < config.random_perturbations {
            perturbations += 1;
            let scale = 0.5 * (1.0 - iteration as f64 / config.max_iterations as f64);
            x = accepted
                .iter()
                .zip(max_step)
                .map(|(xi, m)| xi + rng.gen_range(-1.0..1.0) * m * scale)
                .collect();
            trace!(iteration, perturbations, scale, "newton perturbation");
        } else if stalled {
            return finish(best, iteration + 1, perturbations, Termination::StepBelowTolerance);
        } else {
            x = accepted;
        }

        fx = f(&x);
        fnorm = norm(&fx);
        if fnorm < best.1 {
            best = (x.clone(), fnorm);
        }
        history.push(x.clone());
    }

    let termination = if best.1 < config.f_tol {
        Termination::ResidualBelowTolerance
    } else {
        Termination::MaxIterations
    };
    finish(best, config.max_iterations, perturbations, termination)
}

/// Minimum-norm solution of `J dx = -f` via SVD.
fn least_squares_step(jac: DMatrix<f64>, fx: &[f64]) -> Vec<f64> {
    let n = jac.ncols();
    let rhs = -DVector::from_column_slice(fx);
    let svd = jac.svd(true, true);
    let max_sv = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let eps = (max_sv * 1e-12).max(1e-300);
    match svd.solve(&rhs, eps) {
        Ok(dx) if dx.iter().all(|v| v.is_finite()) => dx.iter().copied().collect(),
        _ => vec![0.0; n],
    }
}

/// Scale `step` uniformly so no component exceeds its bound.
fn clamp_step(step: &mut [f64], max_step: &[f64]) {
    let mut scale = 1.0_f64;
    for (s, m) in step.iter().zip(max_step) {
        if s.abs() > *m && *m > 0.0 {
            scale = scale.min(m / s.abs());
        }
    }
    if scale < 1.0 {
        for s in step.iter_mut() {
            *s *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::GradientMethod;

    #[test]
    fn solves_linear_system_in_one_step() {
        let f = |x: &[f64]| vec![2.0 * x[0] - 4.0, x[1] + 1.0];
        let out = solve_via_newtons_method(f, &[0.0, 0.0], &[10.0, 10.0], &NewtonConfig::default());
        assert_eq!(out.termination, Termination::ResidualBelowTolerance);
        assert!((out.x[0] - 2.0).abs() < 1e-8);
        assert!((out.x[1] + 1.0).abs() < 1e-8);
        assert!(out.iterations <= 2);
    }

    #[test]
    fn step_clamp_limits_progress_per_iteration() {
        let f = |x: &[f64]| vec![x[0] - 100.0];
        let config = NewtonConfig {
            max_iterations: 3,
            random_perturbations: 0,
            ..NewtonConfig::default()
        };
        let out = solve_via_newtons_method(f, &[0.0], &[10.0], &config);
        assert_eq!(out.termination, Termination::MaxIterations);
        assert!((out.x[0] - 30.0).abs() < 1e-6);
    }

    #[test]
    fn underdetermined_system_takes_minimum_norm_step() {
        let f = |x: &[f64]| vec![x[0] + x[1] - 2.0];
        let out = solve_via_newtons_method(f, &[0.0, 0.0], &[10.0, 10.0], &NewtonConfig::default());
        assert!(out.converged(1e-9));
        assert!((out.x[0] - 1.0).abs() < 1e-6);
        assert!((out.x[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nonlinear_circle_intersection() {
        let f = |x: &[f64]| vec![x[0] * x[0] + x[1] * x[1] - 4.0, x[0] - x[1]];
        for gradient in [GradientMethod::Forward, GradientMethod::Central, GradientMethod::RandomPoint] {
            let config = NewtonConfig {
                gradient,
                ..NewtonConfig::default()
            };
            let out = solve_via_newtons_method(f, &[1.0, 0.5], &[1.0, 1.0], &config);
            assert!(out.converged(1e-8), "{gradient:?}: {out:?}");
            assert!((out.x[0] - 2f64.sqrt()).abs() < 1e-6);
        }
    }

    #[test]
    fn inconsistent_system_reports_residual() {
        let f = |x: &[f64]| vec![x[0] - 1.0, x[0] + 1.0];
        let out = solve_via_newtons_method(f, &[5.0], &[10.0], &NewtonConfig::default());
        assert!(!out.converged(1e-4));
        assert!((out.residual_norm - 2f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn clamp_preserves_direction() {
        let mut s = vec![20.0, -5.0];
        clamp_step(&mut s, &[10.0, 10.0]);
        assert_eq!(s, vec![10.0, -2.5]);
    }
}
