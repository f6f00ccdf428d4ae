//! Currency conversion abstractions

use crate::core::error::{ProviderError, RateError};
use crate::core::series::{Fetched, SyncWindow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A daily exchange rate as published by the rate provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateEntry {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// Provider of published daily exchange rates for one currency pair.
#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    async fn fetch_rates(
        &self,
        window: SyncWindow,
    ) -> Result<Fetched<Vec<ExchangeRateEntry>>, ProviderError>;
}

/// Answers "what rate applies at this date".
#[async_trait]
pub trait RateConverter: Send + Sync {
    async fn convert(&self, date: NaiveDate) -> Result<Decimal, RateError>;

    /// Converts at the calendar date of `instant` in `zone`; time of day is discarded.
    async fn convert_at(&self, instant: DateTime<Utc>, zone: Tz) -> Result<Decimal, RateError> {
        self.convert(instant.with_timezone(&zone).date_naive()).await
    }
}
