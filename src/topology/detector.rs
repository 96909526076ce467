use nalgebra::DMatrix;

use crate::error::{ArbError, Result};
use crate::model::RegimeMetrics;
use crate::topology::betti::{betti_curves, BettiCurves};
use crate::topology::distance::correlation_distance;
use crate::topology::persistence::{vietoris_rips_persistence, PersistenceDiagram};

/// Turns a window's correlation matrix into regime metrics. An error makes
/// the caller fall back to the last metrics it computed.
pub trait RegimeDetector: std::fmt::Debug + Send + Sync {
    fn detect(&self, correlation: &DMatrix<f64>) -> Result<RegimeMetrics>;
}

/// Classifies the correlation regime from the loop structure of the
/// correlation-distance space.
#[derive(Debug, Clone, Copy)]
pub struct TopologyRegimeDetector {
    max_dimension: usize,
}

impl TopologyRegimeDetector {
    pub fn new(max_dimension: usize) -> Result<Self> {
        if max_dimension < 1 {
            return Err(ArbError::config("max_dimension must be >= 1"));
        }
        Ok(Self { max_dimension })
    }

    pub fn max_dimension(&self) -> usize {
        self.max_dimension
    }

    pub fn distance_matrix(&self, correlation: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        correlation_distance(correlation)
    }

    pub fn persistence_diagrams(
        &self,
        correlation: &DMatrix<f64>,
    ) -> Result<Vec<PersistenceDiagram>> {
        let dist = self.distance_matrix(correlation)?;
        vietoris_rips_persistence(&dist, self.max_dimension)
    }

    pub fn betti_curves(
        &self,
        correlation: &DMatrix<f64>,
        resolution: usize,
    ) -> Result<BettiCurves> {
        Ok(betti_curves(&self.persistence_diagrams(correlation)?, resolution))
    }

    /// Regime metrics from the finite H1 pairs of `diagrams`.
    pub fn regime_metrics(diagrams: &[PersistenceDiagram]) -> RegimeMetrics {
        diagrams
            .iter()
            .find(|d| d.dimension == 1)
            .map(|h1| RegimeMetrics::from_lifetimes(&h1.finite_lifetimes()))
            .unwrap_or_default()
    }

    pub fn detect(&self, correlation: &DMatrix<f64>) -> Result<RegimeMetrics> {
        let diagrams = self.persistence_diagrams(correlation)?;
        let metrics = Self::regime_metrics(&diagrams);
        tracing::trace!(
            loops = metrics.num_loops,
            max_persistence = metrics.max_persistence_h1,
            entropy = metrics.persistence_entropy_h1,
            "regime detected"
        );
        Ok(metrics)
    }
}

impl RegimeDetector for TopologyRegimeDetector {
    fn detect(&self, correlation: &DMatrix<f64>) -> Result<RegimeMetrics> {
        TopologyRegimeDetector::detect(self, correlation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_correlation_has_no_finite_loops() {
        // all points at distance sqrt(2): every cycle is filled at the same scale
        let det = TopologyRegimeDetector::new(1).unwrap();
        let m = det.detect(&DMatrix::identity(5, 5)).unwrap();
        assert_eq!(m, RegimeMetrics::default());
    }

    #[test]
    fn four_cycle_of_correlations_yields_one_loop() {
        // neighbours at rho = 0.5 (d = 1), opposite corners at rho = -0.125 (d = 1.5)
        let c = -0.125;
        let corr = DMatrix::from_row_slice(
            4,
            4,
            &[
                1.0, 0.5, c, 0.5, //
                0.5, 1.0, 0.5, c, //
                c, 0.5, 1.0, 0.5, //
                0.5, c, 0.5, 1.0,
            ],
        );
        let det = TopologyRegimeDetector::new(1).unwrap();
        let m = det.detect(&corr).unwrap();
        assert_eq!(m.num_loops, 1);
        assert!((m.max_persistence_h1 - 0.5).abs() < 1e-9);
        assert_eq!(m.persistence_entropy_h1, 0.0);
    }

    #[test]
    fn rejects_zero_max_dimension() {
        assert!(TopologyRegimeDetector::new(0).is_err());
    }

    #[test]
    fn non_finite_correlation_is_numerical_error() {
        let det = TopologyRegimeDetector::new(1).unwrap();
        let corr = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, f64::NAN, 1.0]);
        assert!(det.detect(&corr).unwrap_err().is_numerical());
    }
}
