use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};

use crate::error::{ArbError, Result};
use crate::model::price_table::PriceTable;

/// Log returns, one row per period and one column per asset. No gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnsMatrix {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    data: DMatrix<f64>,
}

impl ReturnsMatrix {
    pub fn new(dates: Vec<NaiveDate>, tickers: Vec<String>, data: DMatrix<f64>) -> Result<Self> {
        if data.nrows() != dates.len() || data.ncols() != tickers.len() {
            return Err(ArbError::data(format!(
                "returns shape {}x{} does not match {} dates x {} tickers",
                data.nrows(),
                data.ncols(),
                dates.len(),
                tickers.len()
            )));
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            let (row, col) = (pos % data.nrows(), pos / data.nrows());
            return Err(ArbError::data(format!(
                "non-finite return at period {} for {}",
                row, tickers[col]
            )));
        }
        Ok(Self {
            dates,
            tickers,
            data,
        })
    }

    /// Log returns of a gap-free price table; the first period is 0.0.
    pub fn from_prices(prices: &PriceTable) -> Result<Self> {
        if prices.is_empty() {
            return Err(ArbError::data("price table is empty"));
        }
        let rows = prices.rows();
        let n = prices.tickers().len();
        let mut data = DMatrix::<f64>::zeros(rows.len(), n);
        for t in 1..rows.len() {
            for j in 0..n {
                let (Some(prev), Some(cur)) = (rows[t - 1][j], rows[t][j]) else {
                    return Err(ArbError::data(format!(
                        "missing price for {} on {}",
                        prices.tickers()[j],
                        prices.dates()[t]
                    )));
                };
                data[(t, j)] = (cur / prev).ln();
            }
        }
        Self::new(prices.dates().to_vec(), prices.tickers().to_vec(), data)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn n_periods(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_assets(&self) -> usize {
        self.data.ncols()
    }

    pub fn row(&self, t: usize) -> DVector<f64> {
        self.data.row(t).transpose()
    }

    /// The `len` periods ending at `end` (inclusive).
    pub fn window(&self, end: usize, len: usize) -> Result<ReturnsWindow> {
        if len == 0 || end >= self.n_periods() || end + 1 < len {
            return Err(ArbError::data(format!(
                "window of {} periods ending at {} is outside {} periods",
                len,
                end,
                self.n_periods()
            )));
        }
        ReturnsWindow::new(self.data.rows(end + 1 - len, len).into_owned())
    }
}

/// `W` periods x `N` assets of returns; the last row is the current period.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnsWindow {
    data: DMatrix<f64>,
}

impl ReturnsWindow {
    pub fn new(data: DMatrix<f64>) -> Result<Self> {
        if data.nrows() < 2 {
            return Err(ArbError::data(format!(
                "returns window needs at least 2 periods, got {}",
                data.nrows()
            )));
        }
        if data.ncols() == 0 {
            return Err(ArbError::data("returns window has no assets"));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(ArbError::data("returns window contains non-finite values"));
        }
        Ok(Self { data })
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != n) {
            return Err(ArbError::data("returns window rows have different lengths"));
        }
        Self::new(DMatrix::from_fn(rows.len(), n, |i, j| rows[i][j]))
    }

    pub fn n_periods(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_assets(&self) -> usize {
        self.data.ncols()
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn latest(&self) -> DVector<f64> {
        self.data.row(self.data.nrows() - 1).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn log_returns_start_at_zero() {
        let prices = PriceTable::new(
            vec![day(1), day(2), day(3)],
            vec!["A".into(), "B".into()],
            vec![
                vec![Some(100.0), Some(50.0)],
                vec![Some(110.0), Some(50.0)],
                vec![Some(99.0), Some(25.0)],
            ],
        )
        .unwrap();
        let r = ReturnsMatrix::from_prices(&prices).unwrap();
        assert_eq!(r.n_periods(), 3);
        assert_eq!(r.row(0), DVector::from_vec(vec![0.0, 0.0]));
        assert!((r.row(1)[0] - (1.1f64).ln()).abs() < 1e-12);
        assert!((r.row(2)[1] - (0.5f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn window_slices_trailing_periods() {
        let data = DMatrix::from_fn(5, 2, |i, j| (i * 10 + j) as f64);
        let r = ReturnsMatrix::new(
            (1..=5).map(day).collect(),
            vec!["A".into(), "B".into()],
            data,
        )
        .unwrap();
        let w = r.window(3, 3).unwrap();
        assert_eq!(w.n_periods(), 3);
        assert_eq!(w.data()[(0, 0)], 10.0);
        assert_eq!(w.latest(), DVector::from_vec(vec![30.0, 31.0]));
        assert!(r.window(1, 3).is_err());
        assert!(r.window(5, 2).is_err());
    }

    #[test]
    fn rejects_nan_returns() {
        let mut data = DMatrix::zeros(2, 1);
        data[(1, 0)] = f64::NAN;
        let err = ReturnsMatrix::new(vec![day(1), day(2)], vec!["A".into()], data).unwrap_err();
        assert!(matches!(err, ArbError::Data(_)));
    }
}
