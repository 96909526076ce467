use crate::config::RegimeConfig;
use crate::model::RegimeMetrics;

/// Maps the detected regime to the diffusion strength used for a step.
pub trait AlphaPolicy: std::fmt::Debug + Send + Sync {
    fn alpha(&self, base_alpha: f64, metrics: &RegimeMetrics) -> f64;
}

/// Diffuse less when loop lifetimes are spread across many features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropyGatedAlpha {
    pub entropy_threshold: f64,
    pub unstable_alpha: f64,
}

impl Default for EntropyGatedAlpha {
    fn default() -> Self {
        Self {
            entropy_threshold: 0.5,
            unstable_alpha: 0.05,
        }
    }
}

impl EntropyGatedAlpha {
    pub fn from_config(regime: &RegimeConfig) -> Self {
        Self {
            entropy_threshold: regime.entropy_threshold,
            unstable_alpha: regime.unstable_alpha,
        }
    }
}

impl AlphaPolicy for EntropyGatedAlpha {
    fn alpha(&self, base_alpha: f64, metrics: &RegimeMetrics) -> f64 {
        if metrics.persistence_entropy_h1 > self.entropy_threshold {
            self.unstable_alpha
        } else {
            base_alpha
        }
    }
}

/// Always the configured alpha.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAlpha;

impl AlphaPolicy for FixedAlpha {
    fn alpha(&self, base_alpha: f64, _metrics: &RegimeMetrics) -> f64 {
        base_alpha
    }
}

/// Exposure scaling from topological stability: without a dominant loop the
/// book is cut by `unstable_multiplier`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityGate {
    pub min_max_persistence: f64,
    pub unstable_multiplier: f64,
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self {
            min_max_persistence: 0.1,
            unstable_multiplier: 0.5,
        }
    }
}

impl StabilityGate {
    pub fn from_config(regime: &RegimeConfig) -> Self {
        Self {
            min_max_persistence: regime.min_max_persistence,
            unstable_multiplier: regime.unstable_multiplier,
        }
    }

    pub fn multiplier(&self, metrics: &RegimeMetrics) -> f64 {
        if metrics.max_persistence_h1 < self.min_max_persistence {
            self.unstable_multiplier
        } else {
            1.0
        }
    }
}
