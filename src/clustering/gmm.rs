//! Model-based clustering with Gaussian mixtures.
//!
//! A mixture of `G` Gaussians is fitted by Expectation–Maximisation for every `G` in
//! `1..=max_clusters` and every covariance parameterisation, and the pair with the largest
//! Bayesian Information Criterion is kept:
//!
//! ```text
//! BIC = 2·logLik − npar·ln(n)
//! ```
//!
//! Covariance parameterisations (volume / shape / orientation):
//!
//! | model | Σₖ              | covariance parameters |
//! |-------|-----------------|-----------------------|
//! | `EII` | λ·I             | 1                     |
//! | `VII` | λₖ·I            | G                     |
//! | `EEI` | diag(δ)         | d                     |
//! | `VVI` | diag(δₖ)        | G·d                   |
//! | `EEE` | Σ               | d(d+1)/2              |
//! | `VVV` | Σₖ              | G·d(d+1)/2            |
//! | `E`   | σ² (1-D)        | 1                     |
//! | `V`   | σₖ² (1-D)       | G                     |
//!
//! plus `G − 1` mixing proportions and `G·d` means.
//!
//! EM starts from a hard partition obtained by cutting a Ward hierarchical tree of the data
//! into `G` groups, so fits are deterministic. A fit fails (and is recorded as missing in the
//! BIC table) when a component empties or a covariance becomes singular.
use std::fmt;

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use tracing::debug;

use crate::clustering::hierarchical::{distance_matrix, hclust, DistanceMetric, Linkage};
use crate::constants::SINGULAR_TOL;
use crate::ichnos_errors::IchnosError;

const EM_MAX_ITER: usize = 500;
const EM_TOL: f64 = 1e-8;

/// Covariance parameterisation of a Gaussian mixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CovarianceModel {
    E,
    V,
    EII,
    VII,
    EEI,
    VVI,
    EEE,
    VVV,
}

impl CovarianceModel {
    pub const UNIVARIATE: [CovarianceModel; 2] = [CovarianceModel::E, CovarianceModel::V];
    pub const MULTIVARIATE: [CovarianceModel; 6] = [
        CovarianceModel::EII,
        CovarianceModel::VII,
        CovarianceModel::EEI,
        CovarianceModel::VVI,
        CovarianceModel::EEE,
        CovarianceModel::VVV,
    ];

    pub fn is_univariate(&self) -> bool {
        matches!(self, CovarianceModel::E | CovarianceModel::V)
    }

    /// Models applicable to data with `d` working variables.
    ///
    /// `d` counts working-matrix columns, so a single circular variable (sine and cosine
    /// columns) gets the multivariate models.
    pub fn for_dimension(d: usize) -> &'static [CovarianceModel] {
        if d == 1 {
            &Self::UNIVARIATE
        } else {
            &Self::MULTIVARIATE
        }
    }

    /// Number of free parameters of a `g`-component mixture in `d` dimensions.
    pub fn n_params(&self, g: usize, d: usize) -> usize {
        let cov = match self {
            CovarianceModel::E | CovarianceModel::EII => 1,
            CovarianceModel::V | CovarianceModel::VII => g,
            CovarianceModel::EEI => d,
            CovarianceModel::VVI => g * d,
            CovarianceModel::EEE => d * (d + 1) / 2,
            CovarianceModel::VVV => g * d * (d + 1) / 2,
        };
        (g - 1) + g * d + cov
    }
}

impl fmt::Display for CovarianceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One fitted mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct GmmFit {
    pub model: CovarianceModel,
    pub g: usize,
    pub loglik: f64,
    pub n_params: usize,
    pub bic: f64,
    pub proportions: Vec<f64>,
    pub means: Vec<DVector<f64>>,
    pub covariances: Vec<DMatrix<f64>>,
    /// Posterior membership probabilities, `n × G`.
    pub z: DMatrix<f64>,
    pub iterations: usize,
}

/// BIC of every (model, G) combination tried; `None` where the fit failed.
#[derive(Debug, Clone, PartialEq)]
pub struct BicTable {
    pub models: Vec<CovarianceModel>,
    pub g_values: Vec<usize>,
    /// `values[gi][mi]` for `g_values[gi]` and `models[mi]`.
    pub values: Vec<Vec<Option<f64>>>,
}

impl BicTable {
    pub fn get(&self, model: CovarianceModel, g: usize) -> Option<f64> {
        let mi = self.models.iter().position(|m| *m == model)?;
        let gi = self.g_values.iter().position(|v| *v == g)?;
        self.values[gi][mi]
    }
}

impl fmt::Display for BicTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}", "G")?;
        for m in &self.models {
            write!(f, " {:>12}", m.to_string())?;
        }
        writeln!(f)?;
        for (g, row) in self.g_values.iter().zip(&self.values) {
            write!(f, "{g:>4}")?;
            for v in row {
                match v {
                    Some(b) => write!(f, " {b:>12.3}")?,
                    None => write!(f, " {:>12}", "NA")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Selected mixture with its assignments and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct GmmResult {
    pub best: GmmFit,
    pub bic: BicTable,
    /// MAP component per observation.
    pub classification: Vec<usize>,
    /// `1 − max posterior` per observation.
    pub uncertainty: Vec<f64>,
}

impl fmt::Display for GmmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Gaussian mixture {} with {} component(s): logLik = {:.3}, BIC = {:.3}",
            self.best.model, self.best.g, self.best.loglik, self.best.bic
        )?;
        if f.alternate() {
            write!(f, "{}", self.bic)?;
        }
        Ok(())
    }
}

struct Components {
    proportions: Vec<f64>,
    means: Vec<DVector<f64>>,
    covariances: Vec<DMatrix<f64>>,
}

fn observation(x: &DMatrix<f64>, i: usize) -> DVector<f64> {
    x.row(i).transpose()
}

/// M-step: proportions, means and covariances from membership weights.
fn m_step(
    x: &DMatrix<f64>,
    z: &DMatrix<f64>,
    model: CovarianceModel,
    var_floor: f64,
) -> Option<Components> {
    let (n, d) = x.shape();
    let g = z.ncols();
    let nf = n as f64;

    let nk: Vec<f64> = (0..g).map(|k| z.column(k).sum()).collect();
    if nk.iter().any(|&v| v < 1e-8) {
        return None;
    }
    let means: Vec<DVector<f64>> = (0..g)
        .map(|k| {
            (0..n).fold(DVector::zeros(d), |acc, i| acc + observation(x, i) * z[(i, k)]) / nk[k]
        })
        .collect();
    let scatter: Vec<DMatrix<f64>> = (0..g)
        .map(|k| {
            (0..n).fold(DMatrix::zeros(d, d), |acc, i| {
                let r = observation(x, i) - &means[k];
                acc + (&r * r.transpose()) * z[(i, k)]
            })
        })
        .collect();
    let pooled = || scatter.iter().fold(DMatrix::zeros(d, d), |acc, w| acc + w);
    let eye = DMatrix::<f64>::identity(d, d);

    let covariances: Vec<DMatrix<f64>> = match model {
        CovarianceModel::E | CovarianceModel::EII => {
            let lambda = pooled().trace() / (nf * d as f64);
            vec![&eye * lambda; g]
        }
        CovarianceModel::V | CovarianceModel::VII => scatter
            .iter()
            .zip(&nk)
            .map(|(w, &n_k)| &eye * (w.trace() / (n_k * d as f64)))
            .collect(),
        CovarianceModel::EEI => {
            let diag = pooled().diagonal() / nf;
            vec![DMatrix::from_diagonal(&diag); g]
        }
        CovarianceModel::VVI => scatter
            .iter()
            .zip(&nk)
            .map(|(w, &n_k)| DMatrix::from_diagonal(&(w.diagonal() / n_k)))
            .collect(),
        CovarianceModel::EEE => vec![pooled() / nf; g],
        CovarianceModel::VVV => scatter
            .iter()
            .zip(&nk)
            .map(|(w, &n_k)| w / n_k)
            .collect(),
    };
    if covariances
        .iter()
        .any(|c| c.diagonal().iter().any(|&v| !(v > var_floor)))
    {
        return None;
    }

    Some(Components {
        proportions: nk.iter().map(|v| v / nf).collect(),
        means,
        covariances,
    })
}

/// E-step: posterior memberships and log-likelihood.
fn e_step(x: &DMatrix<f64>, comps: &Components, var_floor: f64) -> Option<(DMatrix<f64>, f64)> {
    let (n, d) = x.shape();
    let g = comps.means.len();
    let ln_2pi = (2.0 * std::f64::consts::PI).ln();

    let mut factors: Vec<(Cholesky<f64, Dyn>, f64)> = Vec::with_capacity(g);
    for cov in &comps.covariances {
        let chol = Cholesky::new(cov.clone())?;
        let diag = chol.l_dirty().diagonal();
        if diag.iter().any(|&l| !(l * l > var_floor)) {
            return None;
        }
        let log_det = 2.0 * diag.iter().map(|l| l.ln()).sum::<f64>();
        factors.push((chol, log_det));
    }

    let mut z = DMatrix::zeros(n, g);
    let mut loglik = 0.0;
    let mut log_p = vec![0.0; g];
    for i in 0..n {
        let xi = observation(x, i);
        for k in 0..g {
            let r = &xi - &comps.means[k];
            let (chol, log_det) = &factors[k];
            let quad = r.dot(&chol.solve(&r));
            log_p[k] = comps.proportions[k].ln() - 0.5 * (d as f64 * ln_2pi + log_det + quad);
        }
        let max = log_p.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lse = max + log_p.iter().map(|v| (v - max).exp()).sum::<f64>().ln();
        if !lse.is_finite() {
            return None;
        }
        for k in 0..g {
            z[(i, k)] = (log_p[k] - lse).exp();
        }
        loglik += lse;
    }
    Some((z, loglik))
}

/// Run EM for one (model, G) pair from a hard initial partition.
fn fit_one(
    x: &DMatrix<f64>,
    init: &[usize],
    g: usize,
    model: CovarianceModel,
    var_floor: f64,
) -> Option<GmmFit> {
    let n = x.nrows();
    let mut z = DMatrix::from_fn(n, g, |i, k| if init[i] == k { 1.0 } else { 0.0 });
    let mut prev = f64::NEG_INFINITY;

    for iter in 1..=EM_MAX_ITER {
        let comps = m_step(x, &z, model, var_floor)?;
        let (new_z, loglik) = e_step(x, &comps, var_floor)?;
        z = new_z;
        let converged = (loglik - prev).abs() <= EM_TOL * (1.0 + loglik.abs());
        if converged || iter == EM_MAX_ITER {
            let n_params = model.n_params(g, x.ncols());
            return Some(GmmFit {
                model,
                g,
                loglik,
                n_params,
                bic: 2.0 * loglik - n_params as f64 * (n as f64).ln(),
                proportions: comps.proportions,
                means: comps.means,
                covariances: comps.covariances,
                z,
                iterations: iter,
            });
        }
        prev = loglik;
    }
    None
}

/// Fit mixtures over `1..=max_clusters` components and keep the best BIC.
///
/// Arguments
/// -----------------
/// * `data`: Working matrix, `n × d`.
/// * `max_clusters`: Largest number of components tried (capped at `n`).
/// * `models`: Parameterisations to try; those not applicable to `d` are skipped. An empty
///   slice means every applicable model.
///
/// Errors
/// -----------------
/// * [`IchnosError::NotEnoughTrackways`] with fewer than two observations.
/// * [`IchnosError::InvalidParameter`] if `max_clusters == 0` or no requested model applies.
/// * [`IchnosError::NumericDegeneracy`] if every fit failed.
pub fn fit_gmm(
    data: &DMatrix<f64>,
    max_clusters: usize,
    models: &[CovarianceModel],
) -> Result<GmmResult, IchnosError> {
    let (n, d) = data.shape();
    if n < 2 {
        return Err(IchnosError::NotEnoughTrackways {
            required: 2,
            found: n,
        });
    }
    if max_clusters == 0 {
        return Err(IchnosError::InvalidParameter(
            "max_clusters must be >= 1".into(),
        ));
    }
    let applicable = CovarianceModel::for_dimension(d);
    let models: Vec<CovarianceModel> = if models.is_empty() {
        applicable.to_vec()
    } else {
        models
            .iter()
            .copied()
            .filter(|m| applicable.contains(m))
            .collect()
    };
    if models.is_empty() {
        return Err(IchnosError::InvalidParameter(format!(
            "models: none applies to {d} working variable(s)"
        )));
    }

    let total_var = (0..d)
        .map(|j| {
            let col = data.column(j);
            let mean = col.mean();
            col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64
        })
        .sum::<f64>()
        / d as f64;
    let var_floor = SINGULAR_TOL * total_var.max(f64::MIN_POSITIVE);

    let labels: Vec<String> = (0..n).map(|i| i.to_string()).collect();
    let tree = hclust(
        &distance_matrix(data, DistanceMetric::Euclidean),
        labels,
        Linkage::WardD2,
    )?;

    let g_values: Vec<usize> = (1..=max_clusters.min(n)).collect();
    let mut values = Vec::with_capacity(g_values.len());
    let mut best: Option<GmmFit> = None;
    for &g in &g_values {
        let init = tree.cut(g)?;
        let mut row = Vec::with_capacity(models.len());
        for &model in &models {
            let fit = fit_one(data, &init, g, model, var_floor);
            match &fit {
                Some(f) => debug!(model = %model, g, bic = f.bic, iterations = f.iterations, "mixture fitted"),
                None => debug!(model = %model, g, "mixture fit failed"),
            }
            row.push(fit.as_ref().map(|f| f.bic));
            if let Some(f) = fit {
                if best.as_ref().map_or(true, |b| f.bic > b.bic) {
                    best = Some(f);
                }
            }
        }
        values.push(row);
    }

    let best = best.ok_or_else(|| {
        IchnosError::NumericDegeneracy("no Gaussian mixture could be fitted".into())
    })?;
    let (classification, uncertainty) = (0..n)
        .map(|i| {
            let row = best.z.row(i);
            let (k, p) = row
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |(bk, bp), (k, &p)| {
                    if p > bp {
                        (k, p)
                    } else {
                        (bk, bp)
                    }
                });
            (k, 1.0 - p)
        })
        .unzip();

    Ok(GmmResult {
        best,
        bic: BicTable {
            models,
            g_values,
            values,
        },
        classification,
        uncertainty,
    })
}

#[cfg(test)]
mod gmm_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn two_blobs() -> DMatrix<f64> {
        let offsets = [
            (0.1, -0.2),
            (-0.15, 0.05),
            (0.2, 0.1),
            (-0.05, -0.1),
            (0.0, 0.2),
            (0.12, -0.03),
            (-0.2, -0.15),
            (0.07, 0.16),
        ];
        let mut pts = Vec::new();
        for (cx, cy) in [(0.0, 0.0), (6.0, 6.0)] {
            for (dx, dy) in offsets {
                pts.push((cx + dx, cy + dy));
            }
        }
        DMatrix::from_fn(pts.len(), 2, |i, j| if j == 0 { pts[i].0 } else { pts[i].1 })
    }

    #[test]
    fn test_two_blobs_selected() {
        let x = two_blobs();
        let res = fit_gmm(&x, 4, &[]).unwrap();
        assert_eq!(res.best.g, 2);
        let first = res.classification[0];
        assert!(res.classification[..8].iter().all(|&c| c == first));
        assert!(res.classification[8..].iter().all(|&c| c != first));
        assert!(res.uncertainty.iter().all(|&u| (0.0..0.01).contains(&u)));
        for i in 0..x.nrows() {
            assert_abs_diff_eq!(res.best.z.row(i).sum(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_univariate_models_only() {
        let x = DMatrix::from_column_slice(6, 1, &[0.0, 0.1, 0.2, 5.0, 5.1, 5.3]);
        let res = fit_gmm(&x, 3, &[]).unwrap();
        assert_eq!(res.bic.models, CovarianceModel::UNIVARIATE.to_vec());
        assert!(res.best.model.is_univariate());
        assert!(matches!(
            fit_gmm(&x, 3, &[CovarianceModel::VVV]),
            Err(IchnosError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_single_component_bic() {
        let x = DMatrix::from_column_slice(4, 1, &[-1.0, 0.0, 0.0, 1.0]);
        let res = fit_gmm(&x, 1, &[CovarianceModel::E]).unwrap();
        // MLE variance 0.5, 2 parameters
        let ll = -2.0 * (2.0 * std::f64::consts::PI * 0.5).ln() - 2.0;
        assert_abs_diff_eq!(res.best.loglik, ll, epsilon = 1e-9);
        assert_abs_diff_eq!(res.best.bic, 2.0 * ll - 2.0 * 4.0_f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn test_failed_fits_are_missing() {
        let x = DMatrix::from_column_slice(3, 1, &[0.0, 1.0, 2.0]);
        let res = fit_gmm(&x, 3, &[]).unwrap();
        // three singleton components have zero variance
        assert_eq!(res.bic.get(CovarianceModel::V, 3), None);
        assert!(res.bic.get(CovarianceModel::E, 1).is_some());
    }

    #[test]
    fn test_n_params() {
        assert_eq!(CovarianceModel::VVV.n_params(2, 3), 1 + 6 + 12);
        assert_eq!(CovarianceModel::EII.n_params(1, 2), 3);
    }
}
