use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ArbError, Result};
use crate::model::PriceTable;

/// What to fetch: a ticker set over a lookback period at a bar interval
/// (e.g. `"10y"`, `"1d"`). An empty ticker list means everything available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub tickers: Vec<String>,
    pub period: String,
    pub interval: String,
}

impl PriceRequest {
    pub fn new(
        tickers: Vec<String>,
        period: impl Into<String>,
        interval: impl Into<String>,
    ) -> Self {
        Self {
            tickers,
            period: period.into(),
            interval: interval.into(),
        }
    }
}

/// Supplier of raw (possibly gappy) close prices.
pub trait PriceSource {
    fn fetch(&self, request: &PriceRequest) -> Result<PriceTable>;
}

/// Reads `date,TICKER1,TICKER2,...` files. Empty cells are gaps.
#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    path: PathBuf,
}

impl CsvPriceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PriceSource for CsvPriceSource {
    fn fetch(&self, request: &PriceRequest) -> Result<PriceTable> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            ArbError::data(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let table = parse_price_csv(&text)?;
        if request.tickers.is_empty() {
            Ok(table)
        } else {
            Ok(table.select(&request.tickers))
        }
    }
}

/// Parse a wide price file. The first column holds `%Y-%m-%d` dates; empty
/// and `NaN` cells are gaps.
pub fn parse_price_csv(text: &str) -> Result<PriceTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let tickers: Vec<String> = reader
        .headers()?
        .iter()
        .skip(1)
        .map(str::to_string)
        .collect();
    if tickers.is_empty() {
        return Err(ArbError::data("price csv header has no tickers"));
    }

    let mut dates = Vec::new();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let date = NaiveDate::parse_from_str(record.get(0).unwrap_or_default(), "%Y-%m-%d")?;
        let row: Vec<Option<f64>> = record
            .iter()
            .skip(1)
            .map(parse_price_cell)
            .collect::<Result<_>>()?;
        if row.len() != tickers.len() {
            return Err(ArbError::data(format!(
                "line {} has {} prices, header has {} tickers",
                line,
                row.len(),
                tickers.len()
            )));
        }
        dates.push(date);
        rows.push(row);
    }
    if dates.is_empty() {
        return Err(ArbError::data("price csv has no rows"));
    }
    PriceTable::new(dates, tickers, rows)
}

fn parse_price_cell(cell: &str) -> Result<Option<f64>> {
    match cell {
        "" | "NaN" | "nan" => Ok(None),
        v => Ok(Some(v.parse::<f64>()?)),
    }
}
