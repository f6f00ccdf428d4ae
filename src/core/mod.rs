//! Core synchronisation engine and its abstractions

pub mod aggregate;
pub mod clock;
pub mod codes;
pub mod config;
pub mod currency;
pub mod error;
pub mod log;
pub mod market;
pub mod period;
pub mod rates;
pub mod series;
pub mod store;
pub mod sync;
pub mod window;

// Re-export main types for cleaner imports
pub use currency::{ExchangeRateSource, RateConverter};
pub use market::{MarketDataProvider, MarketQuery};
pub use series::{CheckpointQuery, Fetched, SyncWindow, TimeSeriesPoint};
pub use store::PointStore;
pub use sync::MeasurementFamily;
