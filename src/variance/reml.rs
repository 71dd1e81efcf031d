//! Variance components of a random-intercept linear mixed model, by REML.
//!
//! Model:
//!
//! ```text
//! y = 1·μ + Σₖ Zₖ·uₖ + e,    uₖ ~ N(0, σₖ²·I),   e ~ N(0, σₑ²·I)
//! V = Σₖ σₖ²·Vₖ + σₑ²·I,     Vₖ = ZₖZₖᵀ
//! ```
//!
//! where `Zₖ` is the 0/1 incidence matrix of grouping factor `k`. With
//! `P = V⁻¹ − V⁻¹X (XᵀV⁻¹X)⁻¹ XᵀV⁻¹` the restricted-likelihood score and expected
//! information are
//!
//! ```text
//! sₖ   = ½ ( yᵀP Vₖ P y − tr(P Vₖ) )
//! Fₖₗ  = ½ tr(P Vₖ P Vₗ)
//! ```
//!
//! Fisher scoring updates `θ ← θ + F⁻¹s`. Components are kept non-negative with an active set:
//! a component at zero whose score points further down is held at zero and left out of the
//! solve. When `F` is not positive definite, the EM-REML step `Δσₖ² = σₖ⁴/qₖ · 2sₖ` is taken
//! instead (`qₖ` levels, `n` for the residual). A residual step that would cross zero is
//! replaced by a tenfold shrink.
//!
//! A component that ends below `SINGULAR_TOL × total` is reported as zero and the fit flagged
//! singular.
use nalgebra::{Cholesky, DMatrix, DVector};
use tracing::debug;

use crate::constants::SINGULAR_TOL;
use crate::ichnos_errors::IchnosError;

const REML_MAX_ITER: usize = 500;
const REML_TOL: f64 = 1e-10;

/// One random-intercept grouping factor.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomTerm {
    pub name: String,
    /// Level index of every observation, in `0..n_levels`.
    pub levels: Vec<usize>,
    pub n_levels: usize,
}

impl RandomTerm {
    /// `ZZᵀ`: 1 where two observations share a level.
    fn incidence_product(&self) -> DMatrix<f64> {
        let n = self.levels.len();
        DMatrix::from_fn(n, n, |i, j| {
            if self.levels[i] == self.levels[j] {
                1.0
            } else {
                0.0
            }
        })
    }
}

/// Fitted variance components.
#[derive(Debug, Clone, PartialEq)]
pub struct RemlFit {
    pub intercept: f64,
    /// One variance per term, in input order.
    pub sigma2: Vec<f64>,
    pub residual: f64,
    pub iterations: usize,
    pub converged: bool,
    pub singular: bool,
}

/// `P` and `V⁻¹` for variance components `theta` (residual last) over matrices `vs`.
fn projection(vs: &[DMatrix<f64>], theta: &[f64]) -> Option<(DMatrix<f64>, DMatrix<f64>)> {
    let n = vs.first()?.nrows();
    let mut v = DMatrix::<f64>::zeros(n, n);
    for (m, s) in vs.iter().zip(theta) {
        v += m * *s;
    }
    let v_inv = Cholesky::new(v)?.inverse();
    let vx = v_inv.column_sum();
    let xvx = vx.sum();
    if !(xvx > 0.0) {
        return None;
    }
    let p = &v_inv - (&vx * vx.transpose()) / xvx;
    Some((p, v_inv))
}

/// Fit variance components by REML.
///
/// Arguments
/// -----------------
/// * `y`: Response, one value per observation.
/// * `terms`: Random-intercept factors (each with `levels.len() == y.len()`).
///
/// Return
/// ----------
/// * A [`RemlFit`]. When `y` has zero variance every component is zero.
///
/// Errors
/// -----------------
/// * [`IchnosError::ShapeMismatch`] if a term does not cover every observation.
/// * [`IchnosError::NotEnoughTrackways`] with fewer than two observations.
/// * [`IchnosError::NumericDegeneracy`] if the marginal covariance becomes singular.
pub fn fit_reml(y: &DVector<f64>, terms: &[RandomTerm]) -> Result<RemlFit, IchnosError> {
    let n = y.len();
    if n < 2 {
        return Err(IchnosError::NotEnoughTrackways {
            required: 2,
            found: n,
        });
    }
    if let Some(t) = terms.iter().find(|t| t.levels.len() != n) {
        return Err(IchnosError::ShapeMismatch(format!(
            "term {} has {} levels for {n} observations",
            t.name,
            t.levels.len()
        )));
    }

    let mean = y.mean();
    let var_y = y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    if !(var_y > 0.0) {
        return Ok(RemlFit {
            intercept: mean,
            sigma2: vec![0.0; terms.len()],
            residual: 0.0,
            iterations: 0,
            converged: true,
            singular: false,
        });
    }

    let k = terms.len();
    let mut vs: Vec<DMatrix<f64>> = terms.iter().map(|t| t.incidence_product()).collect();
    vs.push(DMatrix::identity(n, n));
    let q: Vec<f64> = terms
        .iter()
        .map(|t| t.n_levels.max(1) as f64)
        .chain(std::iter::once(n as f64))
        .collect();
    let residual_floor = var_y * 1e-12;

    let mut theta = vec![var_y / (k + 1) as f64; k + 1];
    let mut iterations = 0;
    let mut converged = false;
    let degenerate =
        || IchnosError::NumericDegeneracy("marginal covariance is not positive definite".into());

    while iterations < REML_MAX_ITER {
        iterations += 1;
        let (p, _) = projection(&vs, &theta).ok_or_else(degenerate)?;
        let py = &p * y;
        let pv: Vec<DMatrix<f64>> = vs.iter().map(|m| &p * m).collect();
        let score: Vec<f64> = (0..=k)
            .map(|a| 0.5 * (py.dot(&(&vs[a] * &py)) - pv[a].trace()))
            .collect();

        let active: Vec<usize> = (0..=k)
            .filter(|&a| a == k || theta[a] > 0.0 || score[a] > 0.0)
            .collect();
        let m = active.len();
        let info = DMatrix::from_fn(m, m, |r, c| {
            0.5 * pv[active[r]]
                .component_mul(&pv[active[c]].transpose())
                .sum()
        });
        let s = DVector::from_iterator(m, active.iter().map(|&a| score[a]));
        let step = match Cholesky::new(info) {
            Some(chol) => chol.solve(&s),
            None => DVector::from_iterator(
                m,
                active
                    .iter()
                    .map(|&a| theta[a] * theta[a] / q[a] * 2.0 * score[a]),
            ),
        };

        let mut next = vec![0.0; k + 1];
        for (r, &a) in active.iter().enumerate() {
            let proposed = theta[a] + step[r];
            next[a] = if a == k && proposed < residual_floor {
                // keep V positive definite
                (0.1 * theta[a]).max(residual_floor)
            } else {
                proposed.max(0.0)
            };
        }
        let change = theta
            .iter()
            .zip(&next)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        theta = next;
        if change <= REML_TOL * var_y {
            converged = true;
            break;
        }
    }

    let (_, v_inv) = projection(&vs, &theta).ok_or_else(degenerate)?;
    let vx = v_inv.column_sum();
    let intercept = vx.dot(y) / vx.sum();

    let mut residual = theta.pop().unwrap_or(0.0);
    let mut sigma2 = theta;
    let total: f64 = sigma2.iter().sum::<f64>() + residual;
    let mut singular = false;
    for s in sigma2.iter_mut().chain(std::iter::once(&mut residual)) {
        if *s < SINGULAR_TOL * total {
            *s = 0.0;
            singular = true;
        }
    }

    debug!(iterations, converged, singular, ?sigma2, residual, "REML fit");
    Ok(RemlFit {
        intercept,
        sigma2,
        residual,
        iterations,
        converged,
        singular,
    })
}
