//! Finite-difference Jacobian approximations.

use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the Jacobian of a residual function is approximated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientMethod {
    Forward,
    /// Better conditioned than forward differences at twice the cost.
    #[default]
    Central,
    /// Least-squares fit of a linear model through random nearby samples.
    RandomPoint,
}

const FORWARD_STEP: f64 = 1e-7;
const CENTRAL_STEP: f64 = 1e-6;
const RANDOM_RADIUS: f64 = 1e-6;

/// `m x n` Jacobian of `f` at `x`, where `fx = f(x)` is already known.
pub fn approximate_jacobian<F, R>(
    f: &F,
    x: &[f64],
    fx: &[f64],
    method: GradientMethod,
    rng: &mut R,
) -> DMatrix<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
    R: Rng,
{
    let m = fx.len();
    let n = x.len();
    let mut jac = DMatrix::zeros(m, n);
    match method {
        GradientMethod::Forward => {
            let mut probe = x.to_vec();
            for j in 0..n {
                probe[j] = x[j] + FORWARD_STEP;
                let fp = f(&probe);
                probe[j] = x[j];
                for i in 0..m {
                    jac[(i, j)] = (fp[i] - fx[i]) / FORWARD_STEP;
                }
            }
        }
        GradientMethod::Central => {
            let mut probe = x.to_vec();
            for j in 0..n {
                probe[j] = x[j] + CENTRAL_STEP;
                let fp = f(&probe);
                probe[j] = x[j] - CENTRAL_STEP;
                let fm = f(&probe);
                probe[j] = x[j];
                for i in 0..m {
                    jac[(i, j)] = (fp[i] - fm[i]) / (2.0 * CENTRAL_STEP);
                }
            }
        }
        GradientMethod::RandomPoint => {
            // Fit  f(x + d) - f(x) ≈ J d  over 2n samples.
            let samples = 2 * n.max(1);
            let mut dx = DMatrix::zeros(samples, n);
            let mut df = DMatrix::zeros(samples, m);
            let mut probe = vec![0.0; n];
            for s in 0..samples {
                for j in 0..n {
                    let d = rng.gen_range(-RANDOM_RADIUS..RANDOM_RADIUS);
                    dx[(s, j)] = d;
                    probe[j] = x[j] + d;
                }
                let fp = f(&probe);
                for i in 0..m {
                    df[(s, i)] = fp[i] - fx[i];
                }
            }
            let svd = dx.svd(true, true);
            if let Ok(jt) = svd.solve(&df, 1e-18) {
                jac = jt.transpose();
            }
        }
    }
    jac
}
