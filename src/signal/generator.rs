use nalgebra::DVector;
use serde::Serialize;

use crate::config::SimulationConfig;
use crate::model::RegimeMetrics;
use crate::risk_profile::RiskProfile;
use crate::signal::policy::StabilityGate;

/// Dispersion below this fraction of the largest magnitude counts as none.
const MIN_RELATIVE_STD: f64 = 1e-12;

/// Signed per-asset weights plus the exposure figures they were built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetWeights {
    pub weights: Vec<f64>,
    pub longs: Vec<usize>,
    pub shorts: Vec<usize>,
    pub final_long_weight: f64,
    pub final_short_weight: f64,
    pub regime_multiplier: f64,
}

impl TargetWeights {
    pub fn flat(n_assets: usize) -> Self {
        Self {
            weights: vec![0.0; n_assets],
            longs: Vec::new(),
            shorts: Vec::new(),
            final_long_weight: 0.0,
            final_short_weight: 0.0,
            regime_multiplier: 1.0,
        }
    }

    pub fn gross_exposure(&self) -> f64 {
        self.weights.iter().map(|w| w.abs()).sum()
    }

    pub fn net_exposure(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// Cross-sectional ranking of residuals into a long/short book.
///
/// Pure: the same residuals and regime metrics always give the same weights.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    net_exposure: f64,
    risk_profile: RiskProfile,
    gate: StabilityGate,
    z_threshold: f64,
    top_n: usize,
}

impl SignalGenerator {
    pub fn new(
        net_exposure: f64,
        risk_profile: RiskProfile,
        gate: StabilityGate,
        z_threshold: f64,
        top_n: usize,
    ) -> Self {
        Self {
            net_exposure,
            risk_profile,
            gate,
            z_threshold,
            top_n,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(
            config.net_exposure,
            config.risk_profile,
            StabilityGate::from_config(&config.regime),
            config.regime.z_threshold,
            config.regime.top_n,
        )
    }

    /// `(final_long_weight, final_short_weight, regime_multiplier)`.
    pub fn exposure(&self, metrics: &RegimeMetrics) -> (f64, f64, f64) {
        let multiplier = self.gate.multiplier(metrics);
        let scale = self.risk_profile.leverage_multiplier * multiplier;
        let base_long = (1.0 + self.net_exposure) / 2.0;
        let base_short = (1.0 - self.net_exposure) / 2.0;
        (base_long * scale, base_short * scale, multiplier)
    }

    pub fn generate(&self, residuals: &DVector<f64>, metrics: &RegimeMetrics) -> TargetWeights {
        let n = residuals.len();
        let Some(z) = zscores(residuals) else {
            return TargetWeights::flat(n);
        };

        let mut candidates: Vec<usize> =
            (0..n).filter(|&i| z[i].abs() > self.z_threshold).collect();
        if candidates.is_empty() {
            candidates = (0..n).collect();
        }
        // descending z, ties by asset index
        candidates.sort_by(|&a, &b| z[b].total_cmp(&z[a]).then(a.cmp(&b)));

        let longs: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| z[i] > 0.0)
            .take(self.top_n)
            .collect();
        let shorts: Vec<usize> = candidates
            .iter()
            .rev()
            .copied()
            .filter(|&i| z[i] < 0.0)
            .take(self.top_n)
            .collect();

        let (final_long_weight, final_short_weight, regime_multiplier) = self.exposure(metrics);
        let mut weights = vec![0.0; n];
        if !longs.is_empty() {
            let each = final_long_weight / longs.len() as f64;
            for &i in &longs {
                weights[i] = each;
            }
        }
        if !shorts.is_empty() {
            let each = -final_short_weight / shorts.len() as f64;
            for &i in &shorts {
                weights[i] = each;
            }
        }

        TargetWeights {
            weights,
            longs,
            shorts,
            final_long_weight,
            final_short_weight,
            regime_multiplier,
        }
    }
}

/// Cross-sectional z-scores with sample standard deviation. `None` when
/// there are fewer than two assets or no dispersion.
pub fn zscores(values: &DVector<f64>) -> Option<DVector<f64>> {
    let n = values.len();
    if n < 2 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let mean = values.mean();
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = var.sqrt();
    if !std.is_finite() || std <= MIN_RELATIVE_STD * values.amax() {
        return None;
    }
    Some(values.map(|v| (v - mean) / std))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk_profile::RiskMode;

    fn stable() -> RegimeMetrics {
        RegimeMetrics {
            max_persistence_h1: 0.4,
            ..RegimeMetrics::default()
        }
    }

    fn generator(net: f64, leverage: f64) -> SignalGenerator {
        let profile = RiskProfile {
            stop_loss_pct: 0.02,
            max_drawdown_limit: 0.05,
            leverage_multiplier: leverage,
        };
        SignalGenerator::new(net, profile, StabilityGate::default(), 0.5, 10)
    }

    #[test]
    fn zscores_use_sample_std() {
        let z = zscores(&DVector::from_vec(vec![1.0, 2.0, 3.0])).unwrap();
        assert!((z[0] + 1.0).abs() < 1e-12);
        assert!(z[1].abs() < 1e-12);
        assert!((z[2] - 1.0).abs() < 1e-12);
        assert!(zscores(&DVector::from_vec(vec![0.3, 0.3])).is_none());
        assert!(zscores(&DVector::from_vec(vec![0.3])).is_none());
    }

    #[test]
    fn constant_residuals_give_flat_book() {
        let w = generator(0.5, 1.0).generate(&DVector::from_element(6, 0.01), &stable());
        assert_eq!(w.weights, vec![0.0; 6]);
        assert!(w.longs.is_empty() && w.shorts.is_empty());
    }

    #[test]
    fn small_dispersion_falls_back_to_full_set() {
        // |z| = 0.707 for both assets, below the 5.0 cut
        let profile = RiskMode::Standard.profile();
        let g = SignalGenerator::new(0.0, profile, StabilityGate::default(), 5.0, 10);
        let w = g.generate(&DVector::from_vec(vec![0.02, -0.02]), &stable());
        assert_eq!(w.longs, vec![0]);
        assert_eq!(w.shorts, vec![1]);
        assert!((w.weights[0] - 0.5).abs() < 1e-12);
        assert!((w.weights[1] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn top_n_caps_each_side() {
        let residuals = DVector::from_fn(30, |i, _| i as f64 - 14.5);
        let w = generator(0.0, 1.0).generate(&residuals, &stable());
        assert_eq!(w.longs.len(), 10);
        assert_eq!(w.shorts.len(), 10);
        assert_eq!(w.longs[0], 29);
        assert_eq!(w.shorts[0], 0);
        assert_eq!(w.weights.iter().filter(|v| **v != 0.0).count(), 20);
        assert!(w.net_exposure().abs() < 1e-12);
    }

    #[test]
    fn unstable_regime_halves_exposure() {
        let g = generator(0.5, 1.5);
        let (long, short, mult) = g.exposure(&RegimeMetrics::default());
        assert_eq!(mult, 0.5);
        assert!((long - 0.75 * 1.5 * 0.5).abs() < 1e-12);
        assert!((short - 0.25 * 1.5 * 0.5).abs() < 1e-12);
    }
}
