use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ArbError, Result};

/// Adjusted closes indexed by date. `None` marks a gap.
///
/// Deserialization goes through [`PriceTable::new`], so a stored payload
/// with ragged rows or unsorted dates is rejected rather than loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPriceTable")]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

#[derive(Deserialize)]
struct RawPriceTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl TryFrom<RawPriceTable> for PriceTable {
    type Error = ArbError;

    fn try_from(raw: RawPriceTable) -> Result<Self> {
        Self::new(raw.dates, raw.tickers, raw.rows)
    }
}

impl PriceTable {
    pub fn new(
        dates: Vec<NaiveDate>,
        tickers: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        if dates.len() != rows.len() {
            return Err(ArbError::data(format!(
                "price table has {} dates but {} rows",
                dates.len(),
                rows.len()
            )));
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != tickers.len())
        {
            return Err(ArbError::data(format!(
                "price row {} has {} values, expected {}",
                i,
                row.len(),
                tickers.len()
            )));
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ArbError::data("price dates must be strictly increasing"));
        }
        Ok(Self {
            dates,
            tickers,
            rows,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.tickers.is_empty()
    }

    /// Carry the last observed close forward over gaps.
    pub fn forward_fill(&mut self) {
        let mut last: Vec<Option<f64>> = vec![None; self.tickers.len()];
        for row in &mut self.rows {
            for (j, cell) in row.iter_mut().enumerate() {
                match cell {
                    Some(v) if v.is_finite() && *v > 0.0 => last[j] = Some(*v),
                    _ => *cell = last[j],
                }
            }
        }
    }

    /// Remove assets that never have a price.
    pub fn drop_empty_assets(&mut self) {
        let keep: Vec<bool> = (0..self.tickers.len())
            .map(|j| self.rows.iter().any(|row| row[j].is_some()))
            .collect();
        if keep.iter().all(|k| *k) {
            return;
        }
        self.tickers = retain_by_mask(std::mem::take(&mut self.tickers), &keep);
        for row in &mut self.rows {
            *row = retain_by_mask(std::mem::take(row), &keep);
        }
    }

    /// Remove rows that still hold a gap, i.e. before an asset's first print.
    pub fn drop_incomplete_rows(&mut self) {
        let keep: Vec<bool> = self
            .rows
            .iter()
            .map(|row| row.iter().all(Option::is_some))
            .collect();
        self.dates = retain_by_mask(std::mem::take(&mut self.dates), &keep);
        self.rows = retain_by_mask(std::mem::take(&mut self.rows), &keep);
    }

    /// Forward-fill, drop dataless assets, then drop rows with leading gaps.
    pub fn cleaned(mut self) -> Self {
        self.forward_fill();
        self.drop_empty_assets();
        self.drop_incomplete_rows();
        self
    }

    /// Keep only `tickers`, in the requested order. Unknown tickers are skipped.
    pub fn select(&self, tickers: &[String]) -> Self {
        let idx: Vec<usize> = tickers
            .iter()
            .filter_map(|t| self.tickers.iter().position(|have| have == t))
            .collect();
        Self {
            dates: self.dates.clone(),
            tickers: idx.iter().map(|&j| self.tickers[j].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| idx.iter().map(|&j| row[j]).collect())
                .collect(),
        }
    }
}

fn retain_by_mask<T>(items: Vec<T>, keep: &[bool]) -> Vec<T> {
    items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, k)| k.then_some(item))
        .collect()
}
