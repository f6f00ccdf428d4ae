//! Day-ahead prices per bidding area, converted from EUR/MWh to SEK/kWh.

use crate::core::aggregate::{Emitted, emit};
use crate::core::codes::AREAS;
use crate::core::currency::RateConverter;
use crate::core::error::SyncError;
use crate::core::market::{MarketDataProvider, MarketQuery};
use crate::core::period::{PeriodPoint, expand};
use crate::core::series::{CheckpointQuery, Fetched, SyncWindow, TimeSeriesPoint};
use crate::core::store::PointStore;
use crate::core::sync::{MeasurementFamily, SyncTarget};
use crate::measurements::target_area;
use async_trait::async_trait;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct DayAheadFamily {
    market: Arc<dyn MarketDataProvider>,
    rates: Arc<dyn RateConverter>,
    measurement: String,
    time_zone: Tz,
}

impl DayAheadFamily {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        rates: Arc<dyn RateConverter>,
        measurement: &str,
        time_zone: Tz,
    ) -> Self {
        Self {
            market,
            rates,
            measurement: measurement.to_string(),
            time_zone,
        }
    }
}

#[async_trait]
impl MeasurementFamily for DayAheadFamily {
    fn name(&self) -> &str {
        "day_ahead"
    }

    fn targets(&self) -> Vec<SyncTarget> {
        AREAS
            .iter()
            .map(|area| {
                SyncTarget::new(
                    area.name,
                    CheckpointQuery::tagged(&self.measurement, "measurements", area.name),
                )
            })
            .collect()
    }

    async fn sync_window(
        &self,
        target: &SyncTarget,
        window: SyncWindow,
        store: &dyn PointStore,
        cancel: &CancellationToken,
    ) -> Result<Fetched<Emitted>, SyncError> {
        let area = target_area(target)?;
        let query = MarketQuery::DayAheadPrices {
            area: area.code.to_string(),
        };
        let Fetched::Data(series) = self.market.fetch(&query, window, cancel).await? else {
            return Ok(Fetched::Empty);
        };

        let prices: Vec<PeriodPoint> = series
            .iter()
            .flat_map(|series| expand(&series.periods, |point| point))
            .collect();

        // Every price of the window is converted before anything is written.
        let mut points = Vec::with_capacity(prices.len());
        for price in prices {
            let rate = self.rates.convert_at(price.timestamp, self.time_zone).await?;
            let value = price.value * rate / Decimal::ONE_THOUSAND;
            points.push(
                TimeSeriesPoint::new(&self.measurement, "value", value, price.timestamp)
                    .tag("measurements", area.name),
            );
        }
        Ok(Fetched::Data(emit(store, points).await?))
    }
}
