use chrono::{Days, NaiveDate};
use nalgebra::DMatrix;

use topo_arb::config::SimulationConfig;
use topo_arb::error::ArbError;
use topo_arb::model::ReturnsMatrix;
use topo_arb::pipeline::{SignalPipeline, StepStatus};

struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64 - 0.5
    }
}

fn sector_returns(periods: usize, assets: usize, seed: u64) -> ReturnsMatrix {
    let mut rng = Lcg(seed);
    let start = NaiveDate::from_ymd_opt(2023, 3, 1).expect("valid date");
    let dates = (0..periods)
        .map(|t| start.checked_add_days(Days::new(t as u64)).expect("date in range"))
        .collect();
    let mut data = DMatrix::zeros(periods, assets);
    for t in 0..periods {
        let sectors = [rng.next_f64(), rng.next_f64(), rng.next_f64()];
        for j in 0..assets {
            data[(t, j)] = 0.015 * (sectors[j % 3] + 0.5 * rng.next_f64());
        }
    }
    let tickers = (0..assets).map(|j| format!("S{}", j)).collect();
    ReturnsMatrix::new(dates, tickers, data).expect("returns should be valid")
}

fn config() -> SimulationConfig {
    SimulationConfig {
        correlation_threshold: 0.5,
        lookback_window: 60,
        ..SimulationConfig::default()
    }
}

#[test]
/// The snapshot is stamped with the last available date, covers every
/// asset, and uses the configured base alpha.
fn snapshot_covers_latest_window() {
    let returns = sector_returns(200, 12, 8);
    let pipeline = SignalPipeline::new(&config()).expect("valid config");
    let snapshot = pipeline.single_pass(&returns).expect("single pass");

    assert_eq!(snapshot.date, "2023-09-16");
    assert_eq!(snapshot.date, returns.dates()[199].to_string());
    assert_eq!(snapshot.tickers.len(), 12);
    assert_eq!(snapshot.residuals.len(), 12);
    assert_eq!(snapshot.weights.weights.len(), 12);
    assert!((snapshot.alpha - 0.5).abs() < f64::EPSILON);
    assert!(snapshot.residuals.iter().all(|r| r.is_finite()));
    // sector members clear 0.5 correlation with each other
    assert!(snapshot.edge_count > 0);
    assert_ne!(snapshot.status, StepStatus::Held);
}

#[test]
/// Long and short sides sum to the exposures the generator reported, and
/// the active position list matches the nonzero weights.
fn snapshot_weights_are_consistent() {
    let returns = sector_returns(150, 15, 31);
    let pipeline = SignalPipeline::new(&config()).expect("valid config");
    let snapshot = pipeline.single_pass(&returns).expect("single pass");
    let target = &snapshot.weights;

    let long_sum: f64 = target.weights.iter().filter(|w| **w > 0.0).sum();
    let short_sum: f64 = target.weights.iter().filter(|w| **w < 0.0).map(|w| -w).sum();
    if !target.longs.is_empty() {
        assert!((long_sum - target.final_long_weight).abs() < 1e-9);
    }
    if !target.shorts.is_empty() {
        assert!((short_sum - target.final_short_weight).abs() < 1e-9);
    }
    assert!((target.gross_exposure() - (long_sum + short_sum)).abs() < 1e-12);

    let active = snapshot.active_positions();
    assert_eq!(active.len(), target.longs.len() + target.shorts.len());
    for (ticker, weight) in active {
        let j = snapshot
            .tickers
            .iter()
            .position(|t| t == ticker)
            .expect("active ticker is known");
        assert_eq!(target.weights[j], weight);
    }
}

#[test]
/// Shorter histories than the lookback use every available period.
fn short_history_uses_all_periods() {
    let returns = sector_returns(20, 6, 2);
    let pipeline = SignalPipeline::new(&config()).expect("valid config");
    let snapshot = pipeline.single_pass(&returns).expect("single pass");
    assert_eq!(snapshot.residuals.len(), 6);

    let one_period = sector_returns(1, 6, 2);
    assert!(matches!(
        pipeline.single_pass(&one_period),
        Err(ArbError::Data(_))
    ));
}

#[test]
/// The snapshot serializes with the status tag the report consumers read.
fn snapshot_serializes_to_json() {
    let returns = sector_returns(90, 9, 4);
    let pipeline = SignalPipeline::new(&config()).expect("valid config");
    let snapshot = pipeline.single_pass(&returns).expect("single pass");
    let json = serde_json::to_value(&snapshot).expect("serialize");

    assert_eq!(json["date"], snapshot.date.as_str());
    assert!(json["status"]["status"].is_string());
    assert_eq!(
        json["weights"]["weights"].as_array().map(Vec::len),
        Some(9)
    );
}
