//! Cross-border physical flows between each Swedish area and its transfer neighbours.
//!
//! Both directions of every neighbour pair are requested concurrently. Pairs without data are
//! ignored; if any pair fails, all failures of the window are reported together.

use crate::core::aggregate::{Emitted, emit};
use crate::core::codes::{Area, area_by_code, area_by_name, swedish_areas, transfer_neighbours};
use crate::core::error::{ChainedFailure, ProviderError, SyncError};
use crate::core::market::{MarketDataProvider, MarketQuery};
use crate::core::period::expand;
use crate::core::series::{CheckpointQuery, Fetched, RawSeries, SyncWindow, TimeSeriesPoint};
use crate::core::store::PointStore;
use crate::core::sync::{MeasurementFamily, SyncTarget};
use crate::measurements::target_area;
use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct PhysicalFlowFamily {
    market: Arc<dyn MarketDataProvider>,
    measurement: String,
}

impl PhysicalFlowFamily {
    pub fn new(market: Arc<dyn MarketDataProvider>, measurement: &str) -> Self {
        Self {
            market,
            measurement: measurement.to_string(),
        }
    }

    /// Both directions of every transfer pair of `area`.
    fn transfer_pairs(area: &Area) -> Vec<MarketQuery> {
        transfer_neighbours(area.name)
            .iter()
            .filter_map(|name| area_by_name(name))
            .flat_map(|neighbour| {
                [
                    MarketQuery::PhysicalFlow {
                        out_area: area.code.to_string(),
                        in_area: neighbour.code.to_string(),
                    },
                    MarketQuery::PhysicalFlow {
                        out_area: neighbour.code.to_string(),
                        in_area: area.code.to_string(),
                    },
                ]
            })
            .collect()
    }

    fn flow_points(&self, area: &Area, query: &MarketQuery, series: &RawSeries) -> Vec<TimeSeriesPoint> {
        let MarketQuery::PhysicalFlow { out_area, in_area } = query else {
            return Vec::new();
        };
        let out_domain = series.out_domain.as_deref().unwrap_or(out_area);
        let in_domain = series.in_domain.as_deref().unwrap_or(in_area);
        let is_out = out_domain == area.code;
        let other_code = if is_out { in_domain } else { out_domain };
        let Some(other) = area_by_code(other_code) else {
            warn!(code = other_code, "Skipping flow series for unknown area");
            return Vec::new();
        };
        let (direction, modifier) = if is_out {
            ("Out", Decimal::NEGATIVE_ONE)
        } else {
            ("In", Decimal::ONE)
        };

        expand(&series.periods, |point| {
            TimeSeriesPoint::new(&self.measurement, "MW", point.value * modifier, point.timestamp)
                .tag("area", area.name)
                .tag("otherArea", other.name)
                .tag("direction", direction)
        })
        .collect()
    }
}

#[async_trait]
impl MeasurementFamily for PhysicalFlowFamily {
    fn name(&self) -> &str {
        "physical_flow"
    }

    fn targets(&self) -> Vec<SyncTarget> {
        swedish_areas()
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
        let queries = Self::transfer_pairs(area);
        let outcomes = join_all(
            queries
                .iter()
                .map(|query| self.market.fetch(query, window, cancel)),
        )
        .await;

        let mut failures = Vec::new();
        let mut fetched = Vec::new();
        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(Fetched::Data(series)) => fetched.push((query, series)),
                Ok(Fetched::Empty) => debug!(%query, "No flow data for pair"),
                Err(e) => failures.push(e),
            }
        }
        if failures.iter().any(|e| matches!(e, ProviderError::Cancelled)) {
            return Err(SyncError::Cancelled);
        }
        if !failures.is_empty() {
            return Err(ChainedFailure(failures).into());
        }
        if fetched.is_empty() {
            return Ok(Fetched::Empty);
        }

        let points: Vec<TimeSeriesPoint> = fetched
            .iter()
            .flat_map(|(query, series)| {
                series
                    .iter()
                    .flat_map(move |series| self.flow_points(area, query, series))
            })
            .collect();
        Ok(Fetched::Data(emit(store, points).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::testing::{Canned, StubMarket, flow, hourly};
    use crate::store::memory::MemoryPointStore;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    const SE1: &str = "10Y1001A1001A44P";
    const SE2: &str = "10Y1001A1001A45N";
    const FI: &str = "10YFI-1--------U";
    const NO4: &str = "10YNO-4--------9";

    fn pair(out_area: &str, in_area: &str) -> MarketQuery {
        MarketQuery::PhysicalFlow {
            out_area: out_area.to_string(),
            in_area: in_area.to_string(),
        }
    }

    fn window() -> SyncWindow {
        SyncWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
        )
    }

    fn se1_target() -> SyncTarget {
        SyncTarget::new("SE1", CheckpointQuery::tagged("physical_flow", "area", "SE1"))
    }

    #[tokio::test]
    async fn test_both_directions_are_fetched_and_signed() {
        let market = Arc::new(
            StubMarket::default()
                .with(
                    pair(SE1, FI),
                    Canned::Series(vec![flow(SE1, FI, vec![hourly("2024-01-01T00:00Z", &["250"])])]),
                )
                .with(
                    pair(FI, SE1),
                    Canned::Series(vec![flow(FI, SE1, vec![hourly("2024-01-01T00:00Z", &["40"])])]),
                )
                .with(pair(SE2, SE1), Canned::Empty),
        );
        let family = PhysicalFlowFamily::new(market.clone(), "physical_flow");
        let store = MemoryPointStore::new();

        let emitted = family
            .sync_window(&se1_target(), window(), &store, &CancellationToken::new())
            .await
            .unwrap()
            .into_option()
            .unwrap();
        assert_eq!(emitted.points, 2);

        // SE1 has three neighbours, each requested in both directions.
        assert_eq!(market.calls.lock().unwrap().len(), 6);
        assert_eq!(market.calls_for(&pair(NO4, SE1)), 1);

        let midnight = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut flows: Vec<_> = store
            .query_points("physical_flow", midnight, midnight)
            .await
            .unwrap()
            .into_iter()
            .map(|p| {
                (
                    p.tag_value("direction").unwrap().to_string(),
                    p.tag_value("otherArea").unwrap().to_string(),
                    p.value,
                )
            })
            .collect();
        flows.sort();
        assert_eq!(
            flows,
            vec![
                ("In".to_string(), "FI".to_string(), dec!(40)),
                ("Out".to_string(), "FI".to_string(), dec!(-250)),
            ]
        );
    }

    #[tokio::test]
    async fn test_all_pairs_empty() {
        let family = PhysicalFlowFamily::new(Arc::new(StubMarket::default()), "physical_flow");
        let store = MemoryPointStore::new();

        let result = family
            .sync_window(&se1_target(), window(), &store, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_reported_together() {
        let market = StubMarket::default()
            .with(
                pair(SE1, FI),
                Canned::Series(vec![flow(SE1, FI, vec![hourly("2024-01-01T00:00Z", &["250"])])]),
            )
            .with(pair(SE1, SE2), Canned::Fail(500))
            .with(pair(NO4, SE1), Canned::Fail(503));
        let family = PhysicalFlowFamily::new(Arc::new(market), "physical_flow");
        let store = MemoryPointStore::new();

        let result = family
            .sync_window(&se1_target(), window(), &store, &CancellationToken::new())
            .await;

        match result {
            Err(SyncError::Chained(ChainedFailure(failures))) => {
                let statuses: Vec<_> = failures
                    .iter()
                    .map(|e| match e {
                        ProviderError::Status { status, .. } => *status,
                        _ => 0,
                    })
                    .collect();
                assert_eq!(statuses, vec![500, 503]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(store.is_empty().await);
    }
}
