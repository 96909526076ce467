use nalgebra::DMatrix;

use crate::error::{ArbError, Result};
use crate::model::ReturnsWindow;

/// Column dispersion below this is treated as constant.
const MIN_COLUMN_NORM: f64 = 1e-12;

/// Undirected weighted graph over assets. An edge carries the Pearson
/// correlation of its endpoints when that correlation clears the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationGraph {
    adjacency: DMatrix<f64>,
    correlation: DMatrix<f64>,
    degenerate: Vec<usize>,
    threshold: f64,
}

impl CorrelationGraph {
    pub fn build(window: &ReturnsWindow, threshold: f64) -> Self {
        let (correlation, degenerate) = pearson_correlation(window.data());
        Self::from_parts(correlation, degenerate, threshold)
    }

    /// Build from an already computed correlation matrix.
    pub fn from_correlation(correlation: DMatrix<f64>, threshold: f64) -> Result<Self> {
        if !correlation.is_square() {
            return Err(ArbError::data("correlation matrix must be square"));
        }
        if correlation.iter().any(|v| !v.is_finite()) {
            return Err(ArbError::numerical("correlation matrix has non-finite entries"));
        }
        if (&correlation - correlation.transpose()).amax() > 1e-9 {
            return Err(ArbError::numerical("correlation matrix is not symmetric"));
        }
        Ok(Self::from_parts(correlation, Vec::new(), threshold))
    }

    fn from_parts(correlation: DMatrix<f64>, degenerate: Vec<usize>, threshold: f64) -> Self {
        let n = correlation.nrows();
        let adjacency = DMatrix::from_fn(n, n, |i, j| {
            let w = correlation[(i, j)];
            if i != j && w >= threshold && w > 0.0 {
                w
            } else {
                0.0
            }
        });
        Self {
            adjacency,
            correlation,
            degenerate,
            threshold,
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.adjacency.nrows()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Thresholded weights, zero diagonal.
    pub fn adjacency(&self) -> &DMatrix<f64> {
        &self.adjacency
    }

    /// Full correlation matrix before thresholding.
    pub fn correlation(&self) -> &DMatrix<f64> {
        &self.correlation
    }

    /// Assets whose return column had no dispersion over the window.
    pub fn degenerate_assets(&self) -> &[usize] {
        &self.degenerate
    }

    pub fn has_edge(&self, i: usize, j: usize) -> bool {
        self.adjacency[(i, j)] > 0.0
    }

    /// Edges as `(i, j, weight)` with `i < j`.
    pub fn edges(&self) -> Vec<(usize, usize, f64)> {
        let n = self.n_nodes();
        let mut out = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let w = self.adjacency[(i, j)];
                if w > 0.0 {
                    out.push((i, j, w));
                }
            }
        }
        out
    }

    pub fn edge_count(&self) -> usize {
        self.edges().len()
    }

    pub fn degrees(&self) -> Vec<f64> {
        self.adjacency.row_iter().map(|row| row.sum()).collect()
    }
}

/// Pearson correlation of the columns of `data`.
///
/// Constant columns have no defined correlation; they get 0 against every
/// other asset (1 on the diagonal) and are reported in the second value.
pub fn pearson_correlation(data: &DMatrix<f64>) -> (DMatrix<f64>, Vec<usize>) {
    let n = data.ncols();
    let mut centered = data.clone();
    let mut norms = vec![0.0; n];
    for (j, mut col) in centered.column_iter_mut().enumerate() {
        let mean = col.mean();
        col.add_scalar_mut(-mean);
        norms[j] = col.norm();
    }

    let degenerate: Vec<usize> = (0..n).filter(|&j| norms[j] < MIN_COLUMN_NORM).collect();
    let gram = centered.transpose() * &centered;
    let corr = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else if norms[i] < MIN_COLUMN_NORM || norms[j] < MIN_COLUMN_NORM {
            0.0
        } else {
            (gram[(i, j)] / (norms[i] * norms[j])).clamp(-1.0, 1.0)
        }
    });
    (corr, degenerate)
}
