//! One window through the full signal chain:
//! graph, laplacian, regime metrics, alpha policy, diffusion, residual, weights.

use std::fmt;

use nalgebra::DVector;
use serde::Serialize;

use crate::config::SimulationConfig;
use crate::error::{ArbError, Result};
use crate::graph::{CorrelationGraph, DiffusionSignal, DiffusionSolver, NormalizedLaplacian};
use crate::model::{RegimeMetrics, ReturnsMatrix, ReturnsWindow};
use crate::signal::{AlphaPolicy, EntropyGatedAlpha, FixedAlpha, SignalGenerator, TargetWeights};
use crate::topology::{RegimeDetector, TopologyRegimeDetector};

/// Everything computed for a window before residual smoothing.
#[derive(Debug, Clone)]
pub struct WindowSignal {
    pub metrics: RegimeMetrics,
    /// Set when regime detection failed and `metrics` are the cached ones.
    pub regime_error: Option<String>,
    pub alpha: f64,
    pub diffusion: DiffusionSignal,
    pub raw_residual: DVector<f64>,
    pub edge_count: usize,
    pub degenerate_assets: Vec<usize>,
}

impl WindowSignal {
    /// `Computed`, or every fallback taken while analysing the window.
    pub fn status(&self) -> StepStatus {
        let reason = match (&self.regime_error, &self.diffusion.fallback) {
            (None, None) => return StepStatus::Computed,
            (Some(regime), None) => DegradeReason::RegimeDetection(regime.clone()),
            (None, Some(diffusion)) => DegradeReason::DiffusionFallback(diffusion.clone()),
            (Some(regime), Some(diffusion)) => DegradeReason::RegimeAndDiffusion {
                regime: regime.clone(),
                diffusion: diffusion.clone(),
            },
        };
        StepStatus::Degraded(reason)
    }
}

/// Why a step ran on fallback values instead of a full recomputation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum DegradeReason {
    /// Persistence failed; cached regime metrics were used.
    RegimeDetection(String),
    /// Diffusion system unsolvable; `h = x`.
    DiffusionFallback(String),
    /// Both of the above in the same window.
    RegimeAndDiffusion { regime: String, diffusion: String },
    /// The chain failed outright; zero residual and cached metrics.
    Pipeline(String),
}

impl DegradeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegimeDetection(_) => "regime_detection",
            Self::DiffusionFallback(_) => "diffusion_fallback",
            Self::RegimeAndDiffusion { .. } => "regime_and_diffusion",
            Self::Pipeline(_) => "pipeline",
        }
    }
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegimeDetection(msg) | Self::DiffusionFallback(msg) | Self::Pipeline(msg) => {
                f.write_str(msg)
            }
            Self::RegimeAndDiffusion { regime, diffusion } => {
                write!(f, "regime detection: {}; diffusion: {}", regime, diffusion)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "degrade", rename_all = "snake_case")]
pub enum StepStatus {
    Computed,
    Held,
    Degraded(DegradeReason),
}

impl StepStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

#[derive(Debug)]
pub struct SignalPipeline {
    correlation_threshold: f64,
    lookback_window: usize,
    detector: Box<dyn RegimeDetector>,
    solver: DiffusionSolver,
    alpha_policy: Box<dyn AlphaPolicy>,
    generator: SignalGenerator,
}

impl SignalPipeline {
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            correlation_threshold: config.correlation_threshold,
            lookback_window: config.lookback_window,
            detector: Box::new(TopologyRegimeDetector::new(config.max_dimension)?),
            solver: DiffusionSolver::new(config.alpha),
            alpha_policy: Box::new(EntropyGatedAlpha::from_config(&config.regime)),
            generator: SignalGenerator::from_config(config),
        })
    }

    pub fn with_alpha_policy(mut self, policy: Box<dyn AlphaPolicy>) -> Self {
        self.alpha_policy = policy;
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn RegimeDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn generator(&self) -> &SignalGenerator {
        &self.generator
    }

    pub fn base_alpha(&self) -> f64 {
        self.solver.base_alpha()
    }

    /// Graph, regime and diffusion for `window`. A regime detection failure
    /// falls back to `cached_metrics`; a laplacian failure or an alpha that is
    /// not a finite non-negative number is an error.
    pub fn analyze(
        &self,
        window: &ReturnsWindow,
        cached_metrics: &RegimeMetrics,
    ) -> Result<WindowSignal> {
        self.analyze_with(window, cached_metrics, self.alpha_policy.as_ref())
    }

    fn analyze_with(
        &self,
        window: &ReturnsWindow,
        cached_metrics: &RegimeMetrics,
        alpha_policy: &dyn AlphaPolicy,
    ) -> Result<WindowSignal> {
        let graph = CorrelationGraph::build(window, self.correlation_threshold);
        let laplacian = NormalizedLaplacian::from_graph(&graph)?;

        let (metrics, regime_error) = match self.detector.detect(graph.correlation()) {
            Ok(metrics) => (metrics, None),
            Err(err) => (*cached_metrics, Some(err.to_string())),
        };

        let alpha = alpha_policy.alpha(self.solver.base_alpha(), &metrics);
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(ArbError::numerical(format!(
                "alpha policy produced {}, expected a finite value >= 0",
                alpha
            )));
        }
        let x = window.latest();
        let diffusion = self.solver.solve(&laplacian, &x, Some(alpha))?;
        let raw_residual = diffusion.residuals(&x);

        Ok(WindowSignal {
            metrics,
            regime_error,
            alpha,
            diffusion,
            raw_residual,
            edge_count: graph.edge_count(),
            degenerate_assets: graph.degenerate_assets().to_vec(),
        })
    }

    pub fn weights(&self, residual: &DVector<f64>, metrics: &RegimeMetrics) -> TargetWeights {
        self.generator.generate(residual, metrics)
    }

    /// One computation on the latest `lookback_window` periods (or all of
    /// them when fewer are available), using base alpha and raw residuals.
    pub fn single_pass(&self, returns: &ReturnsMatrix) -> Result<SignalSnapshot> {
        let n = returns.n_periods();
        if n < 2 {
            return Err(ArbError::data(format!(
                "single pass needs at least 2 periods of returns, got {}",
                n
            )));
        }
        let window = returns.window(n - 1, self.lookback_window.min(n))?;
        let signal = self.analyze_with(&window, &RegimeMetrics::default(), &FixedAlpha)?;
        let weights = self.weights(&signal.raw_residual, &signal.metrics);
        let status = signal.status();
        tracing::info!(
            edges = signal.edge_count,
            loops = signal.metrics.num_loops,
            longs = weights.longs.len(),
            shorts = weights.shorts.len(),
            "single pass complete"
        );

        Ok(SignalSnapshot {
            date: returns.dates()[n - 1].to_string(),
            tickers: returns.tickers().to_vec(),
            metrics: signal.metrics,
            alpha: signal.alpha,
            residuals: signal.raw_residual.iter().copied().collect(),
            weights,
            edge_count: signal.edge_count,
            status,
        })
    }
}

/// Result of a single live pass over the latest window.
#[derive(Debug, Clone, Serialize)]
pub struct SignalSnapshot {
    pub date: String,
    pub tickers: Vec<String>,
    pub metrics: RegimeMetrics,
    pub alpha: f64,
    pub residuals: Vec<f64>,
    pub weights: TargetWeights,
    pub edge_count: usize,
    pub status: StepStatus,
}

impl SignalSnapshot {
    /// `(ticker, weight)` for every asset with a nonzero target.
    pub fn active_positions(&self) -> Vec<(&str, f64)> {
        self.tickers
            .iter()
            .zip(&self.weights.weights)
            .filter(|(_, w)| **w != 0.0)
            .map(|(t, w)| (t.as_str(), *w))
            .collect()
    }
}
