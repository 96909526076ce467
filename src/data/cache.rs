use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::data::source::{PriceRequest, PriceSource};
use crate::error::Result;
use crate::model::PriceTable;

/// `market_data_{period}_{interval}_{hash}`, where `hash` is the first 8 hex
/// chars of SHA-256 over the sorted ticker list.
pub fn cache_key(request: &PriceRequest) -> String {
    let mut tickers = request.tickers.clone();
    tickers.sort();
    let digest = Sha256::digest(tickers.join(",").as_bytes());
    let hash = hex::encode(digest);
    format!(
        "market_data_{}_{}_{}",
        request.period.replace(' ', ""),
        request.interval.replace(' ', ""),
        &hash[..8]
    )
}

/// SQLite-backed store of fetched price tables, one JSON payload per key.
#[derive(Debug, Clone)]
pub struct PriceCache {
    path: PathBuf,
}

impl PriceCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS price_cache (
                cache_key TEXT PRIMARY KEY,
                tickers INTEGER NOT NULL,
                periods INTEGER NOT NULL,
                payload TEXT NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(conn)
    }

    pub fn load(&self, key: &str) -> Result<Option<PriceTable>> {
        let conn = self.open()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM price_cache WHERE cache_key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn store(&self, key: &str, table: &PriceTable) -> Result<()> {
        let conn = self.open()?;
        let payload = serde_json::to_string(table)?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        conn.execute(
            r#"
            INSERT INTO price_cache (cache_key, tickers, periods, payload, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(cache_key) DO UPDATE SET
                tickers = excluded.tickers,
                periods = excluded.periods,
                payload = excluded.payload,
                updated_at_ms = excluded.updated_at_ms
            "#,
            params![
                key,
                table.tickers().len() as i64,
                table.dates().len() as i64,
                payload,
                now_ms
            ],
        )?;
        Ok(())
    }
}

/// Read-through cache in front of any [`PriceSource`].
#[derive(Debug, Clone)]
pub struct CachedPriceSource<S> {
    inner: S,
    cache: PriceCache,
}

impl<S: PriceSource> CachedPriceSource<S> {
    pub fn new(inner: S, cache: PriceCache) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: PriceSource> PriceSource for CachedPriceSource<S> {
    fn fetch(&self, request: &PriceRequest) -> Result<PriceTable> {
        let key = cache_key(request);
        match self.cache.load(&key) {
            Ok(Some(table)) => {
                tracing::info!(key = %key, "loaded prices from cache");
                return Ok(table);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "price cache unreadable"),
        }

        let table = self.inner.fetch(request)?;
        if let Err(e) = self.cache.store(&key, &table) {
            tracing::warn!(key = %key, error = %e, "failed to write price cache");
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_ticker_order() {
        let a = PriceRequest::new(vec!["MSFT".into(), "AAPL".into()], "10y", "1d");
        let b = PriceRequest::new(vec!["AAPL".into(), "MSFT".into()], "10y", "1d");
        assert_eq!(cache_key(&a), cache_key(&b));
        assert!(cache_key(&a).starts_with("market_data_10y_1d_"));
        assert_eq!(cache_key(&a).len(), "market_data_10y_1d_".len() + 8);

        let c = PriceRequest::new(vec!["AAPL".into()], "10y", "1d");
        assert_ne!(cache_key(&a), cache_key(&c));
    }
}
