use chrono::NaiveDate;
use nalgebra::DVector;
use serde::Serialize;
use uuid::Uuid;

use crate::backtest::performance::{DatedReturn, PerformanceReport, StepCounts};
use crate::config::SimulationConfig;
use crate::error::{ArbError, Result};
use crate::model::{RegimeMetrics, ReturnsMatrix};
use crate::pipeline::{DegradeReason, SignalPipeline, StepStatus};
use crate::signal::{AlphaPolicy, ResidualSmoother};
use crate::topology::RegimeDetector;

const PROGRESS_EVERY: usize = 50;

/// Outcome of one simulation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub index: usize,
    /// Date of the realised return the step was scored on.
    pub date: NaiveDate,
    pub status: StepStatus,
    pub weights: Vec<f64>,
    pub turnover: f64,
    pub cost: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub portfolio_value: f64,
    pub drawdown: f64,
    pub within_drawdown_limit: bool,
    /// Diffusion strength used; `None` on hold steps.
    pub alpha: Option<f64>,
}

/// Book state carried from one step to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub value: f64,
    pub peak: f64,
    pub weights: Vec<f64>,
    pub values: Vec<f64>,
    pub returns: Vec<DatedReturn>,
}

impl PortfolioState {
    pub fn new(n_assets: usize) -> Self {
        Self {
            value: 1.0,
            peak: 1.0,
            weights: vec![0.0; n_assets],
            values: vec![1.0],
            returns: Vec::new(),
        }
    }

    pub fn turnover(&self, target: &[f64]) -> f64 {
        target
            .iter()
            .zip(&self.weights)
            .map(|(new, old)| (new - old).abs())
            .sum()
    }

    pub fn drawdown(&self) -> f64 {
        if self.peak > 0.0 {
            (1.0 - self.value / self.peak).max(0.0)
        } else {
            0.0
        }
    }

    fn apply(&mut self, date: NaiveDate, weights: Vec<f64>, net_pnl: f64) {
        self.value *= 1.0 + net_pnl;
        self.peak = self.peak.max(self.value);
        self.values.push(self.value);
        self.returns.push(DatedReturn {
            date,
            net_return: net_pnl,
        });
        self.weights = weights;
    }
}

/// Runs the signal pipeline over a returns history. Holds only immutable
/// configuration; each run owns its own state through [`BacktestRun`].
#[derive(Debug)]
pub struct SimulationDriver {
    config: SimulationConfig,
    pipeline: SignalPipeline,
}

impl SimulationDriver {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let pipeline = SignalPipeline::new(&config)?;
        Ok(Self { config, pipeline })
    }

    pub fn with_alpha_policy(mut self, policy: Box<dyn AlphaPolicy>) -> Self {
        self.pipeline = self.pipeline.with_alpha_policy(policy);
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn RegimeDetector>) -> Self {
        self.pipeline = self.pipeline.with_detector(detector);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &SignalPipeline {
        &self.pipeline
    }

    /// Begin a run with fresh state. Fails when the history is too short
    /// for a single step.
    pub fn start<'a>(&'a self, returns: &'a ReturnsMatrix) -> Result<BacktestRun<'a>> {
        let window = self.config.lookback_window;
        if returns.n_assets() < 2 {
            return Err(ArbError::data(format!(
                "backtest needs at least 2 assets, got {}",
                returns.n_assets()
            )));
        }
        if returns.n_periods() < window + 1 {
            return Err(ArbError::data(format!(
                "backtest needs at least {} periods for a {}-period lookback, got {}",
                window + 1,
                window,
                returns.n_periods()
            )));
        }

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("backtest", run_id = %run_id);
        span.in_scope(|| {
            tracing::info!(
                periods = returns.n_periods(),
                assets = returns.n_assets(),
                lookback = window,
                rebalance_frequency = self.config.rebalance_frequency,
                risk_mode = %self.config.risk_mode,
                "backtest started"
            );
        });

        Ok(BacktestRun {
            driver: self,
            returns,
            run_id,
            span,
            next_index: window - 1,
            last_index: returns.n_periods() - 2,
            smoother: ResidualSmoother::new(self.config.regime.smoothing_weight)?,
            cached_metrics: RegimeMetrics::default(),
            portfolio: PortfolioState::new(returns.n_assets()),
            counts: StepCounts::default(),
        })
    }

    pub fn run(&self, returns: &ReturnsMatrix) -> Result<PerformanceReport> {
        self.start(returns)?.finish()
    }
}

/// State of one backtest. Dropped when the run ends, so nothing carries
/// over into the next run.
#[derive(Debug)]
pub struct BacktestRun<'a> {
    driver: &'a SimulationDriver,
    returns: &'a ReturnsMatrix,
    run_id: Uuid,
    span: tracing::Span,
    next_index: usize,
    last_index: usize,
    smoother: ResidualSmoother,
    cached_metrics: RegimeMetrics,
    portfolio: PortfolioState,
    counts: StepCounts,
}

impl<'a> BacktestRun<'a> {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    pub fn cached_metrics(&self) -> &RegimeMetrics {
        &self.cached_metrics
    }

    pub fn smoothed_residual(&self) -> Option<&DVector<f64>> {
        self.smoother.value()
    }

    pub fn is_done(&self) -> bool {
        self.next_index > self.last_index
    }

    /// Advance one period. `Ok(None)` once every step has run.
    pub fn next_step(&mut self) -> Result<Option<StepRecord>> {
        if self.is_done() {
            return Ok(None);
        }
        let i = self.next_index;
        let span = self.span.clone();
        let _entered = span.enter();

        let driver = self.driver;
        let config = &driver.config;
        let (weights, status, alpha) = if i % config.rebalance_frequency == 0 {
            self.rebalance(i)?
        } else {
            (self.portfolio.weights.clone(), StepStatus::Held, None)
        };

        let next_returns = self.returns.row(i + 1);
        let turnover = self.portfolio.turnover(&weights);
        let cost = turnover * config.transaction_cost_bps;
        let gross_pnl: f64 = weights.iter().zip(next_returns.iter()).map(|(w, r)| w * r).sum();
        let net_pnl = gross_pnl - cost;
        let date = self.returns.dates()[i + 1];

        self.portfolio.apply(date, weights.clone(), net_pnl);
        let drawdown = self.portfolio.drawdown();
        let within_drawdown_limit = config.risk_profile.within_drawdown_limit(drawdown);

        match &status {
            StepStatus::Computed => self.counts.computed += 1,
            StepStatus::Held => self.counts.held += 1,
            StepStatus::Degraded(reason) => {
                self.counts.degraded += 1;
                tracing::warn!(
                    step = i,
                    reason = reason.as_str(),
                    error = %reason,
                    "step degraded"
                );
            }
        }
        if !within_drawdown_limit {
            tracing::debug!(step = i, drawdown, "drawdown beyond risk profile limit");
        }
        if i % PROGRESS_EVERY == 0 {
            tracing::debug!(
                step = i,
                last = self.last_index,
                value = self.portfolio.value,
                "backtest progress"
            );
        }

        self.next_index += 1;
        Ok(Some(StepRecord {
            index: i,
            date,
            status,
            weights,
            turnover,
            cost,
            gross_pnl,
            net_pnl,
            portfolio_value: self.portfolio.value,
            drawdown,
            within_drawdown_limit,
            alpha,
        }))
    }

    fn rebalance(&mut self, i: usize) -> Result<(Vec<f64>, StepStatus, Option<f64>)> {
        let driver = self.driver;
        let pipeline = &driver.pipeline;
        let window = self.returns.window(i, driver.config.lookback_window)?;

        let signal = match pipeline.analyze(&window, &self.cached_metrics) {
            Ok(signal) => signal,
            Err(err @ ArbError::Data(_)) => return Err(err),
            Err(err) => {
                // zero residual, cached regime, smoothed state untouched
                let zero = DVector::zeros(window.n_assets());
                let target = pipeline.weights(&zero, &self.cached_metrics);
                let status = StepStatus::Degraded(DegradeReason::Pipeline(err.to_string()));
                return Ok((target.weights, status, Some(pipeline.base_alpha())));
            }
        };

        if signal.regime_error.is_none() {
            self.cached_metrics = signal.metrics;
        }
        let smoothed = self.smoother.push(&signal.raw_residual)?;
        let target = pipeline.weights(smoothed, &signal.metrics);
        Ok((target.weights, signal.status(), Some(signal.alpha)))
    }

    /// Run the remaining steps and aggregate.
    pub fn finish(mut self) -> Result<PerformanceReport> {
        while self.next_step()?.is_some() {}
        let report = PerformanceReport::from_series(
            self.run_id.to_string(),
            self.portfolio.values,
            self.portfolio.returns,
            self.counts,
        );
        self.span.in_scope(|| {
            tracing::info!(
                sharpe = report.sharpe,
                total_return = report.total_return,
                max_drawdown = report.max_drawdown,
                computed = report.steps.computed,
                held = report.steps.held,
                degraded = report.steps.degraded,
                "backtest finished"
            );
        });
        Ok(report)
    }

    /// Run the remaining steps, keeping every record.
    pub fn collect(mut self) -> Result<(Vec<StepRecord>, PerformanceReport)> {
        let mut records = Vec::new();
        while let Some(record) = self.next_step()? {
            records.push(record);
        }
        Ok((records, self.finish()?))
    }
}
