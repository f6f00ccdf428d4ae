//! Actual generation per production type and bidding area.

use crate::core::aggregate::{Emitted, Reading, emit, sum_per_instant};
use crate::core::codes::{AREAS, energy_type};
use crate::core::error::SyncError;
use crate::core::market::{MarketDataProvider, MarketQuery};
use crate::core::period::expand;
use crate::core::series::{CheckpointQuery, Fetched, RawSeries, SyncWindow, TimeSeriesPoint};
use crate::core::store::PointStore;
use crate::core::sync::{MeasurementFamily, SyncTarget};
use crate::measurements::target_area;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Readings of every series with a known production type, keyed by energy type.
pub(crate) fn production_readings(series: &[RawSeries]) -> Vec<Reading> {
    let mut readings = Vec::new();
    for series in series {
        let Some(psr_type) = series.psr_type.as_deref() else {
            warn!("Skipping generation series without production type");
            continue;
        };
        let Some(energy) = energy_type(psr_type) else {
            warn!(psr_type, "Skipping generation series with unmapped production type");
            continue;
        };
        readings.extend(expand(&series.periods, |point| {
            Reading::new(point.timestamp, energy, point.value)
        }));
    }
    readings
}

pub struct GenerationFamily {
    market: Arc<dyn MarketDataProvider>,
    measurement: String,
}

impl GenerationFamily {
    pub fn new(market: Arc<dyn MarketDataProvider>, measurement: &str) -> Self {
        Self {
            market,
            measurement: measurement.to_string(),
        }
    }
}

#[async_trait]
impl MeasurementFamily for GenerationFamily {
    fn name(&self) -> &str {
        "generation"
    }

    fn targets(&self) -> Vec<SyncTarget> {
        AREAS
            .iter()
            .map(|area| {
                SyncTarget::new(
                    area.name,
                    CheckpointQuery::tagged(&self.measurement, "area", area.name),
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
        let query = MarketQuery::Generation {
            area: area.code.to_string(),
        };
        let Fetched::Data(series) = self.market.fetch(&query, window, cancel).await? else {
            return Ok(Fetched::Empty);
        };

        let points = sum_per_instant(production_readings(&series))
            .into_iter()
            .map(|row| {
                TimeSeriesPoint::new(&self.measurement, "MW", row.value, row.timestamp)
                    .tag("area", area.name)
                    .tag("energyType", &row.dimension)
            });
        Ok(Fetched::Data(emit(store, points).await?))
    }
}
