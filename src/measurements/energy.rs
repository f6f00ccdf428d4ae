//! National generation per energy type, with a total row per instant.

use crate::core::aggregate::{Emitted, emit, sum_per_instant, with_totals};
use crate::core::codes::SWEDEN;
use crate::core::error::SyncError;
use crate::core::market::{MarketDataProvider, MarketQuery};
use crate::core::series::{CheckpointQuery, Fetched, SyncWindow, TimeSeriesPoint};
use crate::core::store::PointStore;
use crate::core::sync::{MeasurementFamily, SyncTarget};
use crate::measurements::generation::production_readings;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const TOTAL_LABEL: &str = "Total produktion";

pub struct EnergyFamily {
    market: Arc<dyn MarketDataProvider>,
    measurement: String,
}

impl EnergyFamily {
    pub fn new(market: Arc<dyn MarketDataProvider>, measurement: &str) -> Self {
        Self {
            market,
            measurement: measurement.to_string(),
        }
    }
}

#[async_trait]
impl MeasurementFamily for EnergyFamily {
    fn name(&self) -> &str {
        "energy"
    }

    fn targets(&self) -> Vec<SyncTarget> {
        vec![SyncTarget::new(
            "SE",
            CheckpointQuery::measurement(&self.measurement),
        )]
    }

    async fn sync_window(
        &self,
        _target: &SyncTarget,
        window: SyncWindow,
        store: &dyn PointStore,
        cancel: &CancellationToken,
    ) -> Result<Fetched<Emitted>, SyncError> {
        let query = MarketQuery::Generation {
            area: SWEDEN.to_string(),
        };
        let Fetched::Data(series) = self.market.fetch(&query, window, cancel).await? else {
            return Ok(Fetched::Empty);
        };

        let rows = with_totals(sum_per_instant(production_readings(&series)), TOTAL_LABEL);
        let points = rows.into_iter().map(|row| {
            TimeSeriesPoint::new(&self.measurement, "value", row.value, row.timestamp)
                .tag("measurements", &row.dimension)
        });
        Ok(Fetched::Data(emit(store, points).await?))
    }
}
