//! One-dimensional minimisation of the residual norm along a search direction.
//!
//! Both searches work on `t ∈ [0, 1]` and return the best evaluated point
//! together with its value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSearchMethod {
    GoldenSection,
    /// Parabolic interpolation, bisecting when the fit is degenerate.
    #[default]
    QuadraticFit,
}

const INV_PHI: f64 = 0.618_033_988_749_894_9;

/// Golden-section search for a minimum of `phi` on `[lo, hi]`.
pub fn golden_section_search<F>(phi: F, lo: f64, hi: f64, iterations: usize) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    let (mut a, mut b) = (lo, hi);
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = phi(c);
    let mut fd = phi(d);
    for _ in 0..iterations {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = phi(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = phi(d);
        }
    }
    let mut best = if fc < fd { (c, fc) } else { (d, fd) };
    // The end points are cheap candidates and often the answer for Newton steps.
    for t in [lo, hi] {
        let v = phi(t);
        if v < best.1 {
            best = (t, v);
        }
    }
    best
}

/// Successive parabolic interpolation on `[0, 1]`.
pub fn quadratic_fit_search<F>(phi: F, iterations: usize) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    let mut pts: [(f64, f64); 3] = [(0.0, phi(0.0)), (0.5, phi(0.5)), (1.0, phi(1.0))];
    let mut best = pts
        .iter()
        .copied()
        .fold((0.0, f64::INFINITY), |b, p| if p.1 < b.1 { p } else { b });

    for _ in 0..iterations {
        let [(a, fa), (b, fb), (c, fc)] = pts;
        let num = (b - a).powi(2) * (fb - fc) - (b - c).powi(2) * (fb - fa);
        let den = (b - a) * (fb - fc) - (b - c) * (fb - fa);
        let convex = fa - fb > 0.0 || fc - fb > 0.0;
        let t = if den.abs() > 1e-300 && convex {
            (b - 0.5 * num / den).clamp(0.0, 1.0)
        } else if fa < fc {
            0.5 * (a + b)
        } else {
            0.5 * (b + c)
        };
        if (t - b).abs() < 1e-12 {
            break;
        }
        let ft = phi(t);
        if ft < best.1 {
            best = (t, ft);
        }
        // Keep the three lowest points, sorted by t.
        let mut cand = [(a, fa), (b, fb), (c, fc), (t, ft)];
        cand.sort_by(|p, q| p.1.total_cmp(&q.1));
        let mut next = [cand[0], cand[1], cand[2]];
        next.sort_by(|p, q| p.0.total_cmp(&q.0));
        if (next[0].0 - next[1].0).abs() < 1e-15 || (next[1].0 - next[2].0).abs() < 1e-15 {
            break;
        }
        pts = next;
    }
    best
}
