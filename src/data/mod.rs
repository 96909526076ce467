pub mod cache;
pub mod source;

pub use cache::{cache_key, CachedPriceSource, PriceCache};
pub use source::{parse_price_csv, CsvPriceSource, PriceRequest, PriceSource};
