use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Trading periods per year used to annualise Sharpe.
pub const PERIODS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedReturn {
    pub date: NaiveDate,
    pub net_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyPerformance {
    pub year: i32,
    /// Sum of the year's net returns.
    pub total_return: f64,
    pub sharpe: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepCounts {
    pub computed: usize,
    pub held: usize,
    pub degraded: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub run_id: String,
    /// Starts at 1.0; one entry per step after that.
    pub portfolio_values: Vec<f64>,
    pub returns: Vec<DatedReturn>,
    pub sharpe: f64,
    pub yearly: Vec<YearlyPerformance>,
    pub average_annual_return: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub steps: StepCounts,
}

impl PerformanceReport {
    pub fn from_series(
        run_id: String,
        portfolio_values: Vec<f64>,
        returns: Vec<DatedReturn>,
        steps: StepCounts,
    ) -> Self {
        let series: Vec<f64> = returns.iter().map(|r| r.net_return).collect();
        let yearly = yearly_breakdown(&returns);
        let average_annual_return = if yearly.is_empty() {
            0.0
        } else {
            yearly.iter().map(|y| y.total_return).sum::<f64>() / yearly.len() as f64
        };
        let total_return = portfolio_values.last().map_or(0.0, |v| v - 1.0);
        Self {
            run_id,
            sharpe: annualized_sharpe(&series),
            max_drawdown: max_drawdown(&portfolio_values),
            portfolio_values,
            returns,
            yearly,
            average_annual_return,
            total_return,
            steps,
        }
    }

    pub fn final_value(&self) -> f64 {
        self.portfolio_values.last().copied().unwrap_or(1.0)
    }
}

/// `sqrt(252) * mean / std` with sample std; 0.0 for fewer than two
/// returns or zero dispersion.
pub fn annualized_sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if !std.is_finite() || std <= 0.0 {
        return 0.0;
    }
    PERIODS_PER_YEAR.sqrt() * mean / std
}

/// Largest peak-to-trough decline of a value series, as a positive fraction.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.max(1.0 - v / peak);
        }
    }
    worst
}

/// Per calendar year, in date order.
pub fn yearly_breakdown(returns: &[DatedReturn]) -> Vec<YearlyPerformance> {
    let mut out: Vec<YearlyPerformance> = Vec::new();
    let mut bucket: Vec<f64> = Vec::new();
    let mut current: Option<i32> = None;

    for r in returns {
        let year = r.date.year();
        if current.is_some_and(|y| y != year) {
            out.extend(current.map(|y| summarize_year(y, &bucket)));
            bucket.clear();
        }
        current = Some(year);
        bucket.push(r.net_return);
    }
    out.extend(current.map(|y| summarize_year(y, &bucket)));
    out
}

fn summarize_year(year: i32, returns: &[f64]) -> YearlyPerformance {
    YearlyPerformance {
        year,
        total_return: returns.iter().sum(),
        sharpe: annualized_sharpe(returns),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dated(y: i32, m: u32, d: u32, r: f64) -> DatedReturn {
        DatedReturn {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            net_return: r,
        }
    }

    #[test]
    fn sharpe_matches_sample_formula() {
        let s = annualized_sharpe(&[0.01, 0.03]);
        // mean 0.02, sample std sqrt(0.0002)
        let expected = 252f64.sqrt() * 0.02 / 0.0002f64.sqrt();
        assert!((s - expected).abs() < 1e-9);
        assert_eq!(annualized_sharpe(&[0.01]), 0.0);
        assert_eq!(annualized_sharpe(&[0.01, 0.01, 0.01]), 0.0);
    }

    #[test]
    fn drawdown_from_running_peak() {
        assert!((max_drawdown(&[1.0, 1.2, 0.9, 1.3, 1.0]) - 0.25).abs() < 1e-12);
        assert_eq!(max_drawdown(&[1.0, 1.1, 1.2]), 0.0);
    }

    #[test]
    fn yearly_groups_by_calendar_year() {
        let rets = vec![
            dated(2022, 12, 29, 0.01),
            dated(2022, 12, 30, 0.02),
            dated(2023, 1, 3, -0.01),
        ];
        let years = yearly_breakdown(&rets);
        assert_eq!(years.len(), 2);
        assert_eq!(years[0].year, 2022);
        assert!((years[0].total_return - 0.03).abs() < 1e-12);
        assert_eq!(years[1].sharpe, 0.0);

        let report = PerformanceReport::from_series(
            "t".to_string(),
            vec![1.0, 1.01, 1.0302, 1.019898],
            rets,
            StepCounts::default(),
        );
        assert!((report.average_annual_return - 0.01).abs() < 1e-12);
        assert!((report.total_return - 0.019898).abs() < 1e-12);
    }
}
