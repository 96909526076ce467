use anyhow::{Context, Result};
use serde::Serialize;

use topo_arb::backtest::{PerformanceReport, SimulationDriver, StepCounts, YearlyPerformance};
use topo_arb::config::Config;
use topo_arb::data::{CachedPriceSource, CsvPriceSource, PriceCache, PriceRequest, PriceSource};
use topo_arb::model::ReturnsMatrix;
use topo_arb::run_store;

/// Console summary; the full series goes to the run report file.
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    run_id: &'a str,
    risk_mode: &'static str,
    final_value: f64,
    total_return: f64,
    sharpe: f64,
    max_drawdown: f64,
    average_annual_return: f64,
    yearly: &'a [YearlyPerformance],
    steps: &'a StepCounts,
}

impl<'a> RunSummary<'a> {
    fn new(report: &'a PerformanceReport, risk_mode: &'static str) -> Self {
        Self {
            run_id: &report.run_id,
            risk_mode,
            final_value: report.final_value(),
            total_return: report.total_return,
            sharpe: report.sharpe,
            max_drawdown: report.max_drawdown,
            average_annual_return: report.average_annual_return,
            yearly: &report.yearly,
            steps: &report.steps,
        }
    }
}

fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set TOPO_ARB_CONFIG or create config/default.toml");
            std::process::exit(1);
        }
    };

    // Init tracing (log to file so stdout stays machine-readable)
    let log_file = std::fs::File::create("topo-arb.log")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();

    let sim = config.simulation_config()?;
    tracing::info!(
        prices = %config.data.prices_csv.display(),
        risk_mode = %sim.risk_mode,
        alpha = sim.alpha,
        threshold = sim.correlation_threshold,
        "Starting topo-arb"
    );

    let source = CachedPriceSource::new(
        CsvPriceSource::new(&config.data.prices_csv),
        PriceCache::new(&config.data.cache_path),
    );
    let request = PriceRequest::new(
        config.data.tickers.clone(),
        config.data.period.clone(),
        config.data.interval.clone(),
    );
    let prices = source
        .fetch(&request)
        .context("failed to load market data")?
        .cleaned();
    let returns = ReturnsMatrix::from_prices(&prices).context("failed to build returns")?;
    tracing::info!(
        periods = returns.n_periods(),
        assets = returns.n_assets(),
        "market data ready"
    );

    let risk_mode = sim.risk_mode.as_str();
    let driver = SimulationDriver::new(sim)?;
    let mode = std::env::var("TOPO_ARB_MODE").unwrap_or_else(|_| "backtest".to_string());

    let stdout = std::io::stdout();
    if mode.eq_ignore_ascii_case("single") {
        let snapshot = driver.pipeline().single_pass(&returns)?;
        serde_json::to_writer_pretty(stdout.lock(), &snapshot)?;
        println!();
        return Ok(());
    }

    let run = driver.start(&returns)?;
    let run_id = run.run_id().to_string();
    let (records, report) = run.collect()?;

    if let Ok(path) = std::env::var("TOPO_ARB_WEIGHTS_OUT") {
        let path = std::path::PathBuf::from(path);
        run_store::write_weight_lines(&path, &run_id, returns.tickers(), &records)?;
    }
    let report_path = run_store::run_report_path();
    run_store::persist_run_report_to_path(&report_path, &report)?;
    tracing::info!(path = %report_path.display(), "run report written");

    serde_json::to_writer_pretty(stdout.lock(), &RunSummary::new(&report, risk_mode))?;
    println!();
    Ok(())
}
