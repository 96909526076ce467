pub mod price_table;
pub mod regime;
pub mod returns;

pub use price_table::PriceTable;
pub use regime::RegimeMetrics;
pub use returns::{ReturnsMatrix, ReturnsWindow};
