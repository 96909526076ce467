use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ArbError;
use crate::risk_profile::{RiskMode, RiskProfile};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub data: DataConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub alpha: f64,
    pub correlation_threshold: f64,
    pub max_dimension: usize,
    pub net_exposure: f64,
    pub lookback_window: usize,
    pub rebalance_frequency: usize,
    /// Cost per unit of turnover, as a fraction (0.0010 = 10bp).
    pub transaction_cost_bps: f64,
    pub risk_mode: String,
}

/// Regime policy constants.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RegimeConfig {
    #[serde(default = "default_entropy_threshold")]
    pub entropy_threshold: f64,
    #[serde(default = "default_unstable_alpha")]
    pub unstable_alpha: f64,
    #[serde(default = "default_min_max_persistence")]
    pub min_max_persistence: f64,
    #[serde(default = "default_unstable_multiplier")]
    pub unstable_multiplier: f64,
    #[serde(default = "default_smoothing_weight")]
    pub smoothing_weight: f64,
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_entropy_threshold() -> f64 {
    0.5
}

fn default_unstable_alpha() -> f64 {
    0.05
}

fn default_min_max_persistence() -> f64 {
    0.1
}

fn default_unstable_multiplier() -> f64 {
    0.5
}

fn default_smoothing_weight() -> f64 {
    0.2
}

fn default_z_threshold() -> f64 {
    0.5
}

fn default_top_n() -> usize {
    10
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: default_entropy_threshold(),
            unstable_alpha: default_unstable_alpha(),
            min_max_persistence: default_min_max_persistence(),
            unstable_multiplier: default_unstable_multiplier(),
            smoothing_weight: default_smoothing_weight(),
            z_threshold: default_z_threshold(),
            top_n: default_top_n(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_prices_csv")]
    pub prices_csv: PathBuf,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Empty means every asset present in the source.
    #[serde(default)]
    pub tickers: Vec<String>,
}

fn default_prices_csv() -> PathBuf {
    PathBuf::from("data/prices.csv")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("data/market_cache.sqlite")
}

fn default_period() -> String {
    "10y".to_string()
}

fn default_interval() -> String {
    "1d".to_string()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            prices_csv: default_prices_csv(),
            cache_path: default_cache_path(),
            period: default_period(),
            interval: default_interval(),
            tickers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Immutable per-run configuration. Built once, validated, then handed to a
/// driver by value; nothing in a run mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub alpha: f64,
    pub correlation_threshold: f64,
    pub max_dimension: usize,
    pub risk_mode: RiskMode,
    pub risk_profile: RiskProfile,
    pub net_exposure: f64,
    pub lookback_window: usize,
    pub rebalance_frequency: usize,
    pub transaction_cost_bps: f64,
    pub regime: RegimeConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let risk_mode = RiskMode::Aggressive;
        Self {
            alpha: 0.5,
            correlation_threshold: 0.6,
            max_dimension: 1,
            risk_mode,
            risk_profile: risk_mode.profile(),
            net_exposure: 0.5,
            lookback_window: 120,
            rebalance_frequency: 5,
            transaction_cost_bps: 0.0010,
            regime: RegimeConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_sections(
        strategy: &StrategyConfig,
        regime: &RegimeConfig,
    ) -> Result<Self, ArbError> {
        let risk_mode: RiskMode = strategy.risk_mode.parse()?;
        let cfg = Self {
            alpha: strategy.alpha,
            correlation_threshold: strategy.correlation_threshold,
            max_dimension: strategy.max_dimension,
            risk_mode,
            risk_profile: risk_mode.profile(),
            net_exposure: strategy.net_exposure,
            lookback_window: strategy.lookback_window,
            rebalance_frequency: strategy.rebalance_frequency,
            transaction_cost_bps: strategy.transaction_cost_bps,
            regime: *regime,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_risk_mode(mut self, mode: RiskMode) -> Self {
        self.risk_mode = mode;
        self.risk_profile = mode.profile();
        self
    }

    pub fn validate(&self) -> Result<(), ArbError> {
        if !self.alpha.is_finite() {
            return Err(ArbError::config("alpha must be finite"));
        }
        if !(0.0..=1.0).contains(&self.correlation_threshold) {
            return Err(ArbError::config(format!(
                "correlation_threshold {} outside [0, 1]",
                self.correlation_threshold
            )));
        }
        if self.max_dimension < 1 {
            return Err(ArbError::config(
                "max_dimension must be >= 1 so loop (H1) features are computed",
            ));
        }
        if !(-1.0..=1.0).contains(&self.net_exposure) {
            return Err(ArbError::config(format!(
                "net_exposure {} outside [-1, 1]",
                self.net_exposure
            )));
        }
        if self.lookback_window < 2 {
            return Err(ArbError::config("lookback_window must be >= 2"));
        }
        if self.rebalance_frequency == 0 {
            return Err(ArbError::config("rebalance_frequency must be > 0"));
        }
        if !self.transaction_cost_bps.is_finite() || self.transaction_cost_bps < 0.0 {
            return Err(ArbError::config("transaction_cost_bps must be >= 0"));
        }
        let w = self.regime.smoothing_weight;
        if !(w > 0.0 && w <= 1.0) {
            return Err(ArbError::config(format!(
                "regime.smoothing_weight {} outside (0, 1]",
                w
            )));
        }
        if self.regime.top_n == 0 {
            return Err(ArbError::config("regime.top_n must be > 0"));
        }
        let p = &self.risk_profile;
        if p.leverage_multiplier < 0.0 || p.max_drawdown_limit < 0.0 || p.stop_loss_pct < 0.0 {
            return Err(ArbError::config("risk profile values must be >= 0"));
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("TOPO_ARB_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        config
            .simulation_config()
            .context("strategy section is invalid")?;

        Ok(config)
    }

    pub fn simulation_config(&self) -> Result<SimulationConfig> {
        Ok(SimulationConfig::from_sections(&self.strategy, &self.regime)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
[strategy]
alpha = 0.3
correlation_threshold = 0.7
max_dimension = 1
net_exposure = 0.7
lookback_window = 80
rebalance_frequency = 10
transaction_cost_bps = 0.0010
risk_mode = "standard"

[logging]
level = "info"
"#;

    #[test]
    fn parse_minimal_toml_uses_regime_defaults() {
        let config: Config = toml::from_str(TOML).unwrap();
        assert_eq!(config.regime, RegimeConfig::default());
        assert_eq!(config.data.period, "10y");
        let sim = config.simulation_config().unwrap();
        assert_eq!(sim.risk_mode, RiskMode::Standard);
        assert!((sim.risk_profile.leverage_multiplier - 1.0).abs() < f64::EPSILON);
        assert_eq!(sim.lookback_window, 80);
    }

    #[test]
    fn unknown_risk_mode_fails_before_any_run() {
        let toml_str = TOML.replace("\"standard\"", "\"reckless\"");
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(config.simulation_config().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let base = SimulationConfig::default();
        assert!(base.validate().is_ok());

        let cfg = SimulationConfig {
            net_exposure: 1.5,
            ..base.clone()
        };
        assert!(matches!(cfg.validate(), Err(ArbError::Config(_))));

        let cfg = SimulationConfig {
            rebalance_frequency: 0,
            ..base.clone()
        };
        assert!(cfg.validate().is_err());

        let cfg = SimulationConfig {
            max_dimension: 0,
            ..base.clone()
        };
        assert!(cfg.validate().is_err());

        let cfg = SimulationConfig {
            transaction_cost_bps: -0.1,
            ..base
        };
        assert!(cfg.validate().is_err());
    }
}
