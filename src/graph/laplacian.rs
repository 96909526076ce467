use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::error::{ArbError, Result};
use crate::graph::correlation::CorrelationGraph;

/// Smallest |1 - alpha * lambda| accepted before the system counts as singular.
const SINGULAR_PIVOT: f64 = 1e-10;
/// Condition number beyond which the diffusion system is rejected.
const MAX_CONDITION: f64 = 1e12;

/// `L = I - D^(-1/2) A D^(-1/2)`, with all-zero rows/columns for isolated nodes.
#[derive(Debug, Clone)]
pub struct NormalizedLaplacian {
    matrix: DMatrix<f64>,
    eigenvalues: DVector<f64>,
}

impl NormalizedLaplacian {
    pub fn from_graph(graph: &CorrelationGraph) -> Result<Self> {
        let adjacency = graph.adjacency();
        let n = graph.n_nodes();
        let inv_sqrt_degree: Vec<f64> = graph
            .degrees()
            .into_iter()
            .map(|d| if d > 0.0 { 1.0 / d.sqrt() } else { 0.0 })
            .collect();

        let matrix = DMatrix::from_fn(n, n, |i, j| {
            let scaled = inv_sqrt_degree[i] * adjacency[(i, j)] * inv_sqrt_degree[j];
            if i == j {
                if inv_sqrt_degree[i] > 0.0 {
                    1.0 - scaled
                } else {
                    0.0
                }
            } else {
                -scaled
            }
        });

        let eigen = SymmetricEigen::try_new(matrix.clone(), f64::EPSILON, 0).ok_or_else(|| {
            ArbError::numerical("laplacian eigen-decomposition did not converge")
        })?;

        Ok(Self {
            matrix,
            eigenvalues: eigen.eigenvalues,
        })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn eigenvalues(&self) -> &DVector<f64> {
        &self.eigenvalues
    }

    pub fn n(&self) -> usize {
        self.matrix.nrows()
    }

    /// Condition number of `I - alpha * L`, infinite when singular.
    pub fn condition_number(&self, alpha: f64) -> f64 {
        let (lo, hi) = self
            .eigenvalues
            .iter()
            .map(|lambda| (1.0 - alpha * lambda).abs())
            .fold((f64::INFINITY, 0.0_f64), |(lo, hi), m| (lo.min(m), hi.max(m)));
        if lo < SINGULAR_PIVOT {
            f64::INFINITY
        } else {
            hi / lo
        }
    }
}

/// Equilibrium diffusion `h` solving `(I - alpha * L) h = x`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffusionSignal {
    pub values: DVector<f64>,
    pub alpha: f64,
    /// Set when the system could not be solved and `h = x` was returned.
    pub fallback: Option<String>,
}

impl DiffusionSignal {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Raw anomaly `e = x - h`.
    pub fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        x - &self.values
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiffusionSolver {
    base_alpha: f64,
}

impl DiffusionSolver {
    pub fn new(base_alpha: f64) -> Self {
        Self { base_alpha }
    }

    pub fn base_alpha(&self) -> f64 {
        self.base_alpha
    }

    /// Solve for the diffusion signal. A singular or ill-conditioned system
    /// yields `h = x` with the reason recorded in `fallback`; only a shape
    /// mismatch is an error.
    pub fn solve(
        &self,
        laplacian: &NormalizedLaplacian,
        x: &DVector<f64>,
        alpha_override: Option<f64>,
    ) -> Result<DiffusionSignal> {
        let n = laplacian.n();
        if x.len() != n {
            return Err(ArbError::data(format!(
                "return vector has {} assets, laplacian has {}",
                x.len(),
                n
            )));
        }
        let alpha = alpha_override.unwrap_or(self.base_alpha);

        match try_solve(laplacian, x, alpha) {
            Ok(values) => Ok(DiffusionSignal {
                values,
                alpha,
                fallback: None,
            }),
            Err(err) => {
                tracing::debug!(alpha, error = %err, "diffusion fell back to identity");
                Ok(DiffusionSignal {
                    values: x.clone(),
                    alpha,
                    fallback: Some(err.to_string()),
                })
            }
        }
    }
}

fn try_solve(
    laplacian: &NormalizedLaplacian,
    x: &DVector<f64>,
    alpha: f64,
) -> Result<DVector<f64>> {
    if alpha == 0.0 {
        return Ok(x.clone());
    }
    let cond = laplacian.condition_number(alpha);
    if !cond.is_finite() || cond > MAX_CONDITION {
        return Err(ArbError::numerical(format!(
            "diffusion system ill-conditioned (alpha {}, cond {:e})",
            alpha, cond
        )));
    }
    let n = laplacian.n();
    let system = DMatrix::<f64>::identity(n, n) - laplacian.matrix() * alpha;
    let h = system
        .lu()
        .solve(x)
        .ok_or_else(|| ArbError::numerical("diffusion system is singular"))?;
    if h.iter().any(|v| !v.is_finite()) {
        return Err(ArbError::numerical("diffusion solution is not finite"));
    }
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_plus_isolated() -> CorrelationGraph {
        let corr = DMatrix::from_row_slice(
            4,
            4,
            &[
                1.0, 0.8, 0.7, 0.0, //
                0.8, 1.0, 0.9, 0.1, //
                0.7, 0.9, 1.0, 0.0, //
                0.0, 0.1, 0.0, 1.0,
            ],
        );
        CorrelationGraph::from_correlation(corr, 0.5).unwrap()
    }

    #[test]
    fn laplacian_is_symmetric_psd_with_zero_isolated_row() {
        let l = NormalizedLaplacian::from_graph(&triangle_plus_isolated()).unwrap();
        let m = l.matrix();
        assert!((m - m.transpose()).amax() < 1e-12);
        assert!(l.eigenvalues().iter().all(|v| *v >= -1e-10));
        assert!(m.row(3).iter().all(|v| *v == 0.0));
        assert!(m.column(3).iter().all(|v| *v == 0.0));
        assert!((m[(0, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_alpha_is_identity() {
        let l = NormalizedLaplacian::from_graph(&triangle_plus_isolated()).unwrap();
        let x = DVector::from_vec(vec![0.01, -0.02, 0.03, 0.005]);
        let h = DiffusionSolver::new(0.0).solve(&l, &x, None).unwrap();
        assert!((&h.values - &x).amax() < 1e-15);
        assert!(!h.is_fallback());
        assert!(h.residuals(&x).amax() < 1e-15);
    }

    #[test]
    fn singular_system_falls_back_to_identity() {
        // Two nodes joined by one edge: eigenvalues {0, 2}, so alpha = 0.5 is singular.
        let corr = DMatrix::from_row_slice(2, 2, &[1.0, 0.9, 0.9, 1.0]);
        let g = CorrelationGraph::from_correlation(corr, 0.5).unwrap();
        let l = NormalizedLaplacian::from_graph(&g).unwrap();
        let x = DVector::from_vec(vec![0.02, -0.01]);
        let h = DiffusionSolver::new(0.3).solve(&l, &x, Some(0.5)).unwrap();
        assert!(h.is_fallback());
        assert_eq!(h.values, x);
        assert!((h.alpha - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn override_alpha_changes_solution() {
        let l = NormalizedLaplacian::from_graph(&triangle_plus_isolated()).unwrap();
        let x = DVector::from_vec(vec![0.05, 0.0, 0.0, 0.01]);
        let solver = DiffusionSolver::new(0.3);
        let base = solver.solve(&l, &x, None).unwrap();
        let weak = solver.solve(&l, &x, Some(0.05)).unwrap();
        assert!((base.values[0] - x[0]).abs() > (weak.values[0] - x[0]).abs());
        // isolated node is untouched by diffusion
        assert!((base.values[3] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let l = NormalizedLaplacian::from_graph(&triangle_plus_isolated()).unwrap();
        let x = DVector::from_vec(vec![0.0; 3]);
        assert!(DiffusionSolver::new(0.3).solve(&l, &x, None).is_err());
    }
}
