//! Data sources: traits, the live price client, CSV replay and synthetic sources.

pub mod circuit_breaker;
pub mod csv_source;
pub mod provider;
pub mod synthetic;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use csv_source::{read_price_csv, read_trend_csv, CsvPriceSource, CsvTrendSource, TrendTable};
pub use provider::{
    DataSource, PriceBar, PriceSource, SourceError, TrendQueryWindow, TrendRow, TrendSource,
    MAX_KEYWORDS, MAX_WINDOW_DAYS,
};
pub use synthetic::{SyntheticPriceSource, SyntheticTrendSource};
pub use yahoo::YahooPriceSource;
