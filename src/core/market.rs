//! Market data provider abstraction

use crate::core::error::ProviderError;
use crate::core::series::{Fetched, RawSeries, SyncWindow};
use async_trait::async_trait;
use std::fmt::Display;
use tokio_util::sync::CancellationToken;

/// A market data query for one domain (or pair of domains).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarketQuery {
    /// Actual generation per production type.
    Generation { area: String },
    /// Actual total load.
    Load { area: String },
    /// Day-ahead prices.
    DayAheadPrices { area: String },
    /// Physical flow leaving `out_area` into `in_area`.
    PhysicalFlow { out_area: String, in_area: String },
}

impl Display for MarketQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketQuery::Generation { area } => write!(f, "generation({area})"),
            MarketQuery::Load { area } => write!(f, "load({area})"),
            MarketQuery::DayAheadPrices { area } => write!(f, "day-ahead({area})"),
            MarketQuery::PhysicalFlow { out_area, in_area } => {
                write!(f, "flow({out_area} -> {in_area})")
            }
        }
    }
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch(
        &self,
        query: &MarketQuery,
        window: SyncWindow,
        cancel: &CancellationToken,
    ) -> Result<Fetched<Vec<RawSeries>>, ProviderError>;
}
