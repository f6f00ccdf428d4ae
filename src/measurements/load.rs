//! Actual total load per Swedish bidding area, plus a recomputed national total.

use crate::core::aggregate::{Emitted, Reading, emit, sum_by_timestamp, sum_per_instant};
use crate::core::codes::swedish_areas;
use crate::core::error::SyncError;
use crate::core::market::{MarketDataProvider, MarketQuery};
use crate::core::period::expand;
use crate::core::series::{CheckpointQuery, Fetched, SyncWindow, TimeSeriesPoint};
use crate::core::store::PointStore;
use crate::core::sync::{MeasurementFamily, SyncTarget};
use crate::measurements::target_area;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const TOTAL_LABEL: &str = "Total last";

pub struct LoadFamily {
    market: Arc<dyn MarketDataProvider>,
    measurement: String,
}

impl LoadFamily {
    pub fn new(market: Arc<dyn MarketDataProvider>, measurement: &str) -> Self {
        Self {
            market,
            measurement: measurement.to_string(),
        }
    }

    /// Range of stored area rows whose total must be (re)computed, given what this run wrote.
    ///
    /// Starts at the earlier of the first new area row and the last stored total, and ends at
    /// the earliest last new row over all areas, so only instants every area has reached are
    /// totalled.
    async fn total_range(
        &self,
        emitted: &[(SyncTarget, Emitted)],
        store: &dyn PointStore,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, SyncError> {
        let first = emitted.iter().filter_map(|(_, e)| e.first).min();
        let last = emitted.iter().filter_map(|(_, e)| e.last).min();
        let (Some(first), Some(last)) = (first, last) else {
            return Ok(None);
        };

        let total = CheckpointQuery::tagged(&self.measurement, "measurements", TOTAL_LABEL);
        let start = match store.last_checkpoint(&total).await? {
            Some(last_total) => first.min(last_total),
            None => DateTime::<Utc>::MIN_UTC,
        };
        Ok((start <= last).then_some((start, last)))
    }
}

#[async_trait]
impl MeasurementFamily for LoadFamily {
    fn name(&self) -> &str {
        "load"
    }

    fn targets(&self) -> Vec<SyncTarget> {
        swedish_areas()
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
        let query = MarketQuery::Load {
            area: area.code.to_string(),
        };
        let Fetched::Data(series) = self.market.fetch(&query, window, cancel).await? else {
            return Ok(Fetched::Empty);
        };

        let readings = series.iter().flat_map(|series| {
            expand(&series.periods, |point| {
                Reading::new(point.timestamp, area.name, point.value)
            })
        });
        let points = sum_per_instant(readings).into_iter().map(|row| {
            TimeSeriesPoint::new(&self.measurement, "value", row.value, row.timestamp)
                .tag("measurements", &row.dimension)
        });
        Ok(Fetched::Data(emit(store, points).await?))
    }

    async fn finalize(
        &self,
        emitted: &[(SyncTarget, Emitted)],
        store: &dyn PointStore,
    ) -> Result<Emitted, SyncError> {
        let Some((start, end)) = self.total_range(emitted, store).await? else {
            debug!("No new load rows, total unchanged");
            return Ok(Emitted::default());
        };
        store.flush().await?;

        let rows = store.query_points(&self.measurement, start, end).await?;
        let area_rows = rows
            .iter()
            .filter(|point| point.field == "value")
            .filter(|point| point.tag_value("measurements") != Some(TOTAL_LABEL));
        let totals = sum_by_timestamp(area_rows).into_iter().map(|(timestamp, value)| {
            TimeSeriesPoint::new(&self.measurement, "value", value, timestamp)
                .tag("measurements", TOTAL_LABEL)
        });

        let written = emit(store, totals).await?;
        info!(points = written.points, from = %start, to = %end, "Recomputed total load");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::sync::{SyncSettings, run_family};
    use crate::measurements::testing::{Canned, StubMarket, hourly, series};
    use crate::store::memory::MemoryPointStore;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn load_query(code: &str) -> MarketQuery {
        MarketQuery::Load {
            area: code.to_string(),
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            window_days: 7,
            epoch: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    async fn totals(store: &MemoryPointStore) -> Vec<(DateTime<Utc>, rust_decimal::Decimal)> {
        store
            .query_points("load", at(0), at(23))
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.tag_value("measurements") == Some(TOTAL_LABEL))
            .map(|p| (p.timestamp, p.value))
            .collect()
    }

    #[tokio::test]
    async fn test_total_covers_instants_every_area_reached() {
        let market = StubMarket::default()
            .with(
                load_query("10Y1001A1001A44P"),
                Canned::Series(vec![series(None, vec![hourly("2024-01-01T00:00Z", &["10", "11", "12"])])]),
            )
            .with(
                load_query("10Y1001A1001A45N"),
                Canned::Series(vec![series(None, vec![hourly("2024-01-01T00:00Z", &["20", "21"])])]),
            )
            .with(
                load_query("10Y1001A1001A46L"),
                Canned::Series(vec![series(None, vec![hourly("2024-01-01T00:00Z", &["30", "31", "32"])])]),
            )
            .with(
                load_query("10Y1001A1001A47J"),
                Canned::Series(vec![series(None, vec![hourly("2024-01-01T00:00Z", &["40", "41", "42"])])]),
            );
        let family = LoadFamily::new(Arc::new(market), "load");
        let store = MemoryPointStore::new();
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap());

        let report = run_family(&family, settings(), &store, &clock, &CancellationToken::new()).await;
        assert!(report.is_success());

        // SE2 stops at 01:00, so the 02:00 total is not computed yet.
        assert_eq!(totals(&store).await, vec![(at(0), dec!(100)), (at(1), dec!(104))]);
        assert_eq!(report.stats.points, 11 + 2);
    }

    #[tokio::test]
    async fn test_total_is_recomputed_from_last_total() {
        let store = MemoryPointStore::new();
        for (area, hour, value) in [("SE1", 0, dec!(1)), ("SE2", 0, dec!(2)), ("SE1", 1, dec!(3))] {
            store
                .write_point(TimeSeriesPoint::new("load", "value", value, at(hour)).tag("measurements", area))
                .await
                .unwrap();
        }
        store
            .write_point(TimeSeriesPoint::new("load", "value", dec!(99), at(0)).tag("measurements", TOTAL_LABEL))
            .await
            .unwrap();
        let family = LoadFamily::new(Arc::new(StubMarket::default()), "load");
        let emitted = [(
            family.targets().remove(1),
            Emitted {
                points: 1,
                first: Some(at(1)),
                last: Some(at(1)),
            },
        )];

        let written = family.finalize(&emitted, &store).await.unwrap();

        assert_eq!(written.points, 2);
        assert_eq!(totals(&store).await, vec![(at(0), dec!(3)), (at(1), dec!(3))]);
    }

    #[tokio::test]
    async fn test_nothing_new_leaves_total_alone() {
        let store = MemoryPointStore::new();
        let family = LoadFamily::new(Arc::new(StubMarket::default()), "load");
        let emitted = [(family.targets().remove(0), Emitted::default())];

        let written = family.finalize(&emitted, &store).await.unwrap();
        assert_eq!(written, Emitted::default());
        assert!(store.is_empty().await);
    }
}
