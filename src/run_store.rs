use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::backtest::{PerformanceReport, StepRecord};

/// One line of the per-step target weight stream.
#[derive(Debug, Serialize)]
struct WeightLine<'a> {
    run_id: &'a str,
    index: usize,
    date: String,
    status: &'a crate::backtest::StepStatus,
    weights: Vec<(&'a str, f64)>,
}

pub fn run_report_path() -> PathBuf {
    std::env::var("TOPO_ARB_REPORT_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/run_report.json"))
}

pub fn persist_run_report_to_path(path: &Path, report: &PerformanceReport) -> Result<()> {
    create_parent(path)?;
    let json =
        serde_json::to_string_pretty(report).context("failed to serialize run report json")?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn load_run_report_from_path(path: &Path) -> Result<Option<PerformanceReport>> {
    if !path.exists() {
        return Ok(None);
    }
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let report: PerformanceReport =
        serde_json::from_str(&payload).context("failed to parse run report json")?;
    Ok(Some(report))
}

/// Write each step's nonzero targets as one JSON object per line.
pub fn write_weight_lines(
    path: &Path,
    run_id: &str,
    tickers: &[String],
    records: &[StepRecord],
) -> Result<()> {
    create_parent(path)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    for record in records {
        let line = WeightLine {
            run_id,
            index: record.index,
            date: record.date.to_string(),
            status: &record.status,
            weights: tickers
                .iter()
                .zip(&record.weights)
                .filter(|(_, w)| **w != 0.0)
                .map(|(t, w)| (t.as_str(), *w))
                .collect(),
        };
        serde_json::to_writer(&mut out, &line).context("failed to serialize weight line")?;
        out.write_all(b"\n")?;
    }
    out.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}
