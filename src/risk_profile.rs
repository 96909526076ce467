use std::fmt;
use std::str::FromStr;

use crate::error::ArbError;

/// Named risk modes. Each resolves to a fixed [`RiskProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskMode {
    HyperAggressive,
    Aggressive,
    Growth,
    Standard,
    Balanced,
    Institutional,
    PensionFund,
    Conservative,
    UltraConservative,
    Cautious,
}

impl RiskMode {
    pub const ALL: [RiskMode; 10] = [
        Self::HyperAggressive,
        Self::Aggressive,
        Self::Growth,
        Self::Standard,
        Self::Balanced,
        Self::Institutional,
        Self::PensionFund,
        Self::Conservative,
        Self::UltraConservative,
        Self::Cautious,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HyperAggressive => "HYPER_AGGRESSIVE",
            Self::Aggressive => "AGGRESSIVE",
            Self::Growth => "GROWTH",
            Self::Standard => "STANDARD",
            Self::Balanced => "BALANCED",
            Self::Institutional => "INSTITUTIONAL",
            Self::PensionFund => "PENSION_FUND",
            Self::Conservative => "CONSERVATIVE",
            Self::UltraConservative => "ULTRA_CONSERVATIVE",
            Self::Cautious => "CAUTIOUS",
        }
    }

    pub fn profile(self) -> RiskProfile {
        let (stop_loss_pct, max_drawdown_limit, leverage_multiplier) = match self {
            Self::HyperAggressive => (0.15, 0.50, 3.0),
            Self::Aggressive => (0.05, 0.25, 1.5),
            Self::Growth => (0.07, 0.30, 2.0),
            Self::Standard => (0.02, 0.05, 1.0),
            Self::Balanced => (0.03, 0.08, 1.0),
            Self::Institutional => (0.03, 0.15, 1.2),
            Self::PensionFund => (0.01, 0.10, 0.25),
            Self::Conservative => (0.01, 0.03, 0.25),
            Self::UltraConservative => (0.005, 0.01, 0.0),
            Self::Cautious => (0.01, 0.02, 0.5),
        };
        RiskProfile {
            stop_loss_pct,
            max_drawdown_limit,
            leverage_multiplier,
        }
    }
}

impl FromStr for RiskMode {
    type Err = ArbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == key)
            .ok_or_else(|| {
                ArbError::config(format!(
                    "unknown risk mode '{}', expected one of {}",
                    s,
                    Self::ALL.map(RiskMode::as_str).join("/")
                ))
            })
    }
}

impl fmt::Display for RiskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskProfile {
    /// Per-position stop distance, as a fraction of entry value.
    pub stop_loss_pct: f64,
    /// Peak-to-trough loss beyond which trading should stop.
    pub max_drawdown_limit: f64,
    /// Gross exposure scale applied to both book sides.
    pub leverage_multiplier: f64,
}

impl RiskProfile {
    /// Returns `false` once `drawdown` (a positive fraction) exceeds the limit.
    pub fn within_drawdown_limit(&self, drawdown: f64) -> bool {
        drawdown <= self.max_drawdown_limit
    }
}
