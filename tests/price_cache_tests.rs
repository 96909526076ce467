use std::cell::Cell;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;

use topo_arb::data::{
    cache_key, CachedPriceSource, CsvPriceSource, PriceCache, PriceRequest, PriceSource,
};
use topo_arb::error::{ArbError, Result};
use topo_arb::model::PriceTable;

fn temp_path(test_name: &str, ext: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be monotonic")
        .as_nanos();
    std::env::temp_dir().join(format!("topo-arb-{}-{}.{}", test_name, ts, ext))
}

fn sample_table() -> PriceTable {
    let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).expect("valid date");
    PriceTable::new(
        vec![d(2), d(3), d(4)],
        vec!["AAA".into(), "BBB".into()],
        vec![
            vec![Some(10.0), None],
            vec![Some(10.5), Some(20.0)],
            vec![Some(10.2), Some(20.4)],
        ],
    )
    .expect("valid table")
}

/// Counts how often the upstream is actually hit.
struct CountingSource {
    calls: Cell<usize>,
    table: PriceTable,
}

impl PriceSource for CountingSource {
    fn fetch(&self, _request: &PriceRequest) -> Result<PriceTable> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.table.clone())
    }
}

struct FailingSource;

impl PriceSource for FailingSource {
    fn fetch(&self, _request: &PriceRequest) -> Result<PriceTable> {
        Err(ArbError::data("upstream unavailable"))
    }
}

#[test]
fn store_then_load_returns_same_table() {
    let path = temp_path("cache-roundtrip", "sqlite");
    let cache = PriceCache::new(&path);
    let table = sample_table();

    assert!(cache.load("market_data_1y_1d_deadbeef").expect("load").is_none());
    cache.store("market_data_1y_1d_deadbeef", &table).expect("store");
    let loaded = cache
        .load("market_data_1y_1d_deadbeef")
        .expect("load")
        .expect("entry should exist");
    assert_eq!(loaded, table);

    // overwrite replaces the payload instead of failing on the key
    let smaller = table.select(&["AAA".to_string()]);
    cache.store("market_data_1y_1d_deadbeef", &smaller).expect("overwrite");
    let loaded = cache
        .load("market_data_1y_1d_deadbeef")
        .expect("load")
        .expect("entry should exist");
    assert_eq!(loaded.tickers(), &["AAA".to_string()]);

    let _ = std::fs::remove_file(&path);
}

#[test]
/// The second fetch for the same ticker set is served from the cache, even
/// when the tickers are requested in a different order.
fn cached_source_reads_through_once() {
    let path = temp_path("cache-read-through", "sqlite");
    let source = CachedPriceSource::new(
        CountingSource {
            calls: Cell::new(0),
            table: sample_table(),
        },
        PriceCache::new(&path),
    );

    let first = PriceRequest::new(vec!["AAA".into(), "BBB".into()], "1y", "1d");
    let second = PriceRequest::new(vec!["BBB".into(), "AAA".into()], "1y", "1d");
    assert_eq!(cache_key(&first), cache_key(&second));

    let a = source.fetch(&first).expect("first fetch");
    let b = source.fetch(&second).expect("second fetch");
    assert_eq!(a, b);
    assert_eq!(source.inner().calls.get(), 1);

    let other_interval = PriceRequest::new(vec!["AAA".into(), "BBB".into()], "1y", "1wk");
    source.fetch(&other_interval).expect("third fetch");
    assert_eq!(source.inner().calls.get(), 2);

    let _ = std::fs::remove_file(&path);
}

#[test]
/// Upstream errors propagate and nothing is cached for the key.
fn upstream_error_is_not_cached() {
    let path = temp_path("cache-upstream-error", "sqlite");
    let cache = PriceCache::new(&path);
    let source = CachedPriceSource::new(FailingSource, cache.clone());
    let request = PriceRequest::new(vec!["AAA".into()], "1y", "1d");

    assert!(matches!(source.fetch(&request), Err(ArbError::Data(_))));
    assert!(cache.load(&cache_key(&request)).expect("load").is_none());

    let _ = std::fs::remove_file(&path);
}

#[test]
/// A stored payload whose rows disagree with its tickers is reported as an
/// error, and the read-through source refetches and repairs the entry.
fn malformed_cached_payload_is_rejected() {
    let path = temp_path("cache-malformed", "sqlite");
    let cache = PriceCache::new(&path);
    let request = PriceRequest::new(vec!["AAA".into(), "BBB".into()], "1y", "1d");
    let key = cache_key(&request);
    cache.store(&key, &sample_table()).expect("store");

    let conn = rusqlite::Connection::open(&path).expect("open cache db");
    let ragged = r#"{"dates":["2024-01-02","2024-01-03"],"tickers":["AAA","BBB"],
        "rows":[[10.0,null],[10.5]]}"#;
    conn.execute(
        "UPDATE price_cache SET payload = ?1 WHERE cache_key = ?2",
        rusqlite::params![ragged, key],
    )
    .expect("corrupt payload");
    drop(conn);

    assert!(matches!(cache.load(&key), Err(ArbError::Json(_))));

    let source = CachedPriceSource::new(
        CountingSource {
            calls: Cell::new(0),
            table: sample_table(),
        },
        cache.clone(),
    );
    let table = source.fetch(&request).expect("refetch");
    assert_eq!(table, sample_table());
    assert_eq!(source.inner().calls.get(), 1);
    assert_eq!(cache.load(&key).expect("load").expect("entry"), sample_table());

    let _ = std::fs::remove_file(&path);
}

#[test]
/// A csv source honours the requested ticker subset and order; an empty
/// request returns every column.
fn csv_source_selects_requested_tickers() {
    let path = temp_path("prices", "csv");
    std::fs::write(
        &path,
        "date,AAA,BBB,CCC\n2024-01-02,10.0,20.0,30.0\n2024-01-03,10.5,,31.0\n",
    )
    .expect("write csv");
    let source = CsvPriceSource::new(&path);

    let all = source
        .fetch(&PriceRequest::new(Vec::new(), "1y", "1d"))
        .expect("fetch all");
    assert_eq!(all.tickers().len(), 3);

    let picked = source
        .fetch(&PriceRequest::new(vec!["CCC".into(), "AAA".into()], "1y", "1d"))
        .expect("fetch subset");
    assert_eq!(picked.tickers(), &["CCC".to_string(), "AAA".to_string()]);
    assert_eq!(picked.rows()[1], vec![Some(31.0), Some(10.5)]);

    let cleaned = all.cleaned();
    assert_eq!(cleaned.rows()[1][1], Some(20.0));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_csv_is_a_data_error() {
    let source = CsvPriceSource::new(temp_path("missing-prices", "csv"));
    let result = source.fetch(&PriceRequest::new(Vec::new(), "1y", "1d"));
    assert!(matches!(result, Err(ArbError::Data(_))));
}
