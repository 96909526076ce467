use serde::{Deserialize, Serialize};

/// Scalar summary of the finite H1 (loop) persistence features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegimeMetrics {
    pub max_persistence_h1: f64,
    pub total_persistence_h1: f64,
    pub avg_persistence_h1: f64,
    pub num_loops: usize,
    pub persistence_entropy_h1: f64,
}

impl RegimeMetrics {
    /// Metrics from H1 lifetimes (`death - birth`, finite only).
    pub fn from_lifetimes(lifetimes: &[f64]) -> Self {
        if lifetimes.is_empty() {
            return Self::default();
        }
        let total: f64 = lifetimes.iter().sum();
        let max = lifetimes.iter().copied().fold(0.0, f64::max);
        Self {
            max_persistence_h1: max,
            total_persistence_h1: total,
            avg_persistence_h1: total / lifetimes.len() as f64,
            num_loops: lifetimes.len(),
            persistence_entropy_h1: persistence_entropy(lifetimes),
        }
    }
}

/// Shannon entropy (base 2) of lifetimes normalised to a distribution.
pub fn persistence_entropy(lifetimes: &[f64]) -> f64 {
    let total: f64 = lifetimes.iter().sum();
    if lifetimes.is_empty() || total <= 0.0 || !total.is_finite() {
        return 0.0;
    }
    -lifetimes
        .iter()
        .map(|l| l / total)
        .filter(|p| *p > 0.0)
        .map(|p| p * p.log2())
        .sum::<f64>()
}
