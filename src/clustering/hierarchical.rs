//! Agglomerative hierarchical clustering.
//!
//! Dissimilarities are computed between the rows of the working matrix and merged by the
//! Lance–Williams recurrence. After clusters `i` and `j` (sizes `nᵢ`, `nⱼ`) merge, the
//! dissimilarity to any other cluster `k` is
//!
//! ```text
//! d(k, i∪j) = αᵢ·d(k,i) + αⱼ·d(k,j) + β·d(i,j) + γ·|d(k,i) − d(k,j)|
//! ```
//!
//! | linkage    | αᵢ                  | β                    | γ     |
//! |------------|---------------------|----------------------|-------|
//! | `Single`   | 1/2                 | 0                    | −1/2  |
//! | `Complete` | 1/2                 | 0                    | +1/2  |
//! | `Average`  | nᵢ/(nᵢ+nⱼ)          | 0                    | 0     |
//! | `McQuitty` | 1/2                 | 0                    | 0     |
//! | `WardD`    | (nᵢ+nₖ)/(nᵢ+nⱼ+nₖ)  | −nₖ/(nᵢ+nⱼ+nₖ)       | 0     |
//! | `Centroid` | nᵢ/(nᵢ+nⱼ)          | −nᵢnⱼ/(nᵢ+nⱼ)²       | 0     |
//! | `Median`   | 1/2                 | −1/4                 | 0     |
//!
//! `WardD2`, `Centroid` and `Median` run the recurrence on squared dissimilarities and report
//! merge heights on the original scale (square root). `WardD` runs it on the dissimilarities
//! as given.
use std::fmt;

use nalgebra::DMatrix;

use crate::ichnos_errors::IchnosError;

/// Dissimilarity between two rows of the working matrix.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
    /// Chebyshev (largest coordinate difference).
    Maximum,
    Canberra,
    Minkowski(f64),
}

impl DistanceMetric {
    pub fn between(&self, a: &[f64], b: &[f64]) -> f64 {
        let diffs = a.iter().zip(b).map(|(x, y)| (x - y).abs());
        match self {
            DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            DistanceMetric::Manhattan => diffs.sum(),
            DistanceMetric::Maximum => diffs.fold(0.0, f64::max),
            DistanceMetric::Canberra => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let den = x.abs() + y.abs();
                    if den > 0.0 {
                        (x - y).abs() / den
                    } else {
                        0.0
                    }
                })
                .sum(),
            DistanceMetric::Minkowski(p) => diffs.map(|d| d.powf(*p)).sum::<f64>().powf(1.0 / p),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => f.write_str("euclidean"),
            DistanceMetric::Manhattan => f.write_str("manhattan"),
            DistanceMetric::Maximum => f.write_str("maximum"),
            DistanceMetric::Canberra => f.write_str("canberra"),
            DistanceMetric::Minkowski(p) => write!(f, "minkowski(p = {p})"),
        }
    }
}

/// Agglomeration rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Linkage {
    #[default]
    Complete,
    Single,
    Average,
    McQuitty,
    WardD,
    WardD2,
    Centroid,
    Median,
}

impl Linkage {
    fn squares_input(&self) -> bool {
        matches!(self, Linkage::WardD2 | Linkage::Centroid | Linkage::Median)
    }

    /// Lance–Williams coefficients `(αᵢ, αⱼ, β, γ)`.
    fn coefficients(&self, ni: f64, nj: f64, nk: f64) -> (f64, f64, f64, f64) {
        match self {
            Linkage::Single => (0.5, 0.5, 0.0, -0.5),
            Linkage::Complete => (0.5, 0.5, 0.0, 0.5),
            Linkage::Average => (ni / (ni + nj), nj / (ni + nj), 0.0, 0.0),
            Linkage::McQuitty => (0.5, 0.5, 0.0, 0.0),
            Linkage::WardD | Linkage::WardD2 => {
                let t = ni + nj + nk;
                ((ni + nk) / t, (nj + nk) / t, -nk / t, 0.0)
            }
            Linkage::Centroid => {
                let s = ni + nj;
                (ni / s, nj / s, -ni * nj / (s * s), 0.0)
            }
            Linkage::Median => (0.5, 0.5, -0.25, 0.0),
        }
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Linkage::Complete => "complete",
            Linkage::Single => "single",
            Linkage::Average => "average",
            Linkage::McQuitty => "mcquitty",
            Linkage::WardD => "ward.D",
            Linkage::WardD2 => "ward.D2",
            Linkage::Centroid => "centroid",
            Linkage::Median => "median",
        };
        f.write_str(s)
    }
}

/// Either an original observation or the cluster formed at an earlier merge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Leaf(usize),
    Merged(usize),
}

/// One agglomeration step.
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub left: Node,
    pub right: Node,
    pub height: f64,
    /// Number of observations in the merged cluster.
    pub size: usize,
}

/// Merge tree over `n` labelled observations (`n - 1` merges).
#[derive(Debug, Clone, PartialEq)]
pub struct Dendrogram {
    pub labels: Vec<String>,
    pub merges: Vec<Merge>,
    pub linkage: Linkage,
}

/// Symmetric dissimilarity matrix between the rows of `data`.
pub fn distance_matrix(data: &DMatrix<f64>, metric: DistanceMetric) -> DMatrix<f64> {
    let n = data.nrows();
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| data.row(i).iter().copied().collect())
        .collect();
    let mut d = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let v = metric.between(&rows[i], &rows[j]);
            d[(i, j)] = v;
            d[(j, i)] = v;
        }
    }
    d
}

/// Agglomerate a dissimilarity matrix.
///
/// Arguments
/// -----------------
/// * `dissimilarity`: Square symmetric matrix, zero diagonal.
/// * `labels`: One label per observation.
/// * `linkage`: Agglomeration rule.
///
/// Return
/// ----------
/// * The [`Dendrogram`]. At each step the closest pair of active clusters is merged; ties go
///   to the pair found first in row-major order.
///
/// Errors
/// -----------------
/// * [`IchnosError::NotEnoughTrackways`] with fewer than two observations.
/// * [`IchnosError::ShapeMismatch`] if the matrix is not square or does not match `labels`.
pub fn hclust(
    dissimilarity: &DMatrix<f64>,
    labels: Vec<String>,
    linkage: Linkage,
) -> Result<Dendrogram, IchnosError> {
    let n = labels.len();
    if dissimilarity.nrows() != n || dissimilarity.ncols() != n {
        return Err(IchnosError::ShapeMismatch(format!(
            "dissimilarity is {}x{} for {n} labels",
            dissimilarity.nrows(),
            dissimilarity.ncols()
        )));
    }
    if n < 2 {
        return Err(IchnosError::NotEnoughTrackways {
            required: 2,
            found: n,
        });
    }

    let mut d = if linkage.squares_input() {
        dissimilarity.map(|v| v * v)
    } else {
        dissimilarity.clone()
    };
    let mut active: Vec<bool> = vec![true; n];
    let mut size: Vec<usize> = vec![1; n];
    let mut node: Vec<Node> = (0..n).map(Node::Leaf).collect();
    let mut merges = Vec::with_capacity(n - 1);

    for step in 0..(n - 1) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in (0..n).filter(|&i| active[i]) {
            for j in ((i + 1)..n).filter(|&j| active[j]) {
                if best.map_or(true, |(_, _, b)| d[(i, j)] < b) {
                    best = Some((i, j, d[(i, j)]));
                }
            }
        }
        let Some((i, j, dij)) = best else {
            break;
        };

        let (ni, nj) = (size[i] as f64, size[j] as f64);
        for k in (0..n).filter(|&k| active[k] && k != i && k != j) {
            let (ai, aj, beta, gamma) = linkage.coefficients(ni, nj, size[k] as f64);
            let (dki, dkj) = (d[(k, i)], d[(k, j)]);
            let v = ai * dki + aj * dkj + beta * dij + gamma * (dki - dkj).abs();
            d[(k, i)] = v;
            d[(i, k)] = v;
        }

        let height = if linkage.squares_input() {
            dij.max(0.0).sqrt()
        } else {
            dij
        };
        merges.push(Merge {
            left: node[i],
            right: node[j],
            height,
            size: size[i] + size[j],
        });
        // cluster i now holds the union
        size[i] += size[j];
        node[i] = Node::Merged(step);
        active[j] = false;
    }

    Ok(Dendrogram {
        labels,
        merges,
        linkage,
    })
}

impl Dendrogram {
    pub fn n_leaves(&self) -> usize {
        self.labels.len()
    }

    pub fn heights(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.height).collect()
    }

    fn leaves_of(&self, node: Node, out: &mut Vec<usize>) {
        match node {
            Node::Leaf(i) => out.push(i),
            Node::Merged(m) => {
                self.leaves_of(self.merges[m].left, out);
                self.leaves_of(self.merges[m].right, out);
            }
        }
    }

    /// Cut the tree into `k` groups.
    ///
    /// Return
    /// ----------
    /// * One label in `0..k` per observation; labels are numbered in order of first
    ///   appearance along the observations.
    ///
    /// Errors
    /// -----------------
    /// * [`IchnosError::InvalidParameter`] unless `1 ≤ k ≤ n`.
    pub fn cut(&self, k: usize) -> Result<Vec<usize>, IchnosError> {
        let n = self.n_leaves();
        if k == 0 || k > n {
            return Err(IchnosError::InvalidParameter(format!(
                "k must be in 1..={n}, got {k}"
            )));
        }
        let mut group: Vec<usize> = (0..n).collect();
        for merge in self.merges.iter().take(n - k) {
            let mut left = Vec::new();
            let mut right = Vec::new();
            self.leaves_of(merge.left, &mut left);
            self.leaves_of(merge.right, &mut right);
            let target = group[left[0]];
            for leaf in right {
                group[leaf] = target;
            }
            for leaf in left {
                group[leaf] = target;
            }
        }

        let mut relabel: Vec<Option<usize>> = vec![None; n];
        let mut next = 0;
        Ok(group
            .into_iter()
            .map(|g| {
                *relabel[g].get_or_insert_with(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect())
    }
}

impl fmt::Display for Dendrogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Hierarchical clustering ({} linkage, {} observations)",
            self.linkage,
            self.n_leaves()
        )?;
        let show = |node: Node| match node {
            Node::Leaf(i) => self.labels[i].clone(),
            Node::Merged(m) => format!("#{}", m + 1),
        };
        for (s, m) in self.merges.iter().enumerate() {
            writeln!(
                f,
                "  #{:<3} {:>10} + {:<10} height = {:.4} (size {})",
                s + 1,
                show(m.left),
                show(m.right),
                m.height,
                m.size
            )?;
        }
        Ok(())
    }
}
