use crate::core::error::StoreError;
use crate::core::series::{CheckpointQuery, TimeSeriesPoint};
use crate::core::store::PointStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

type SeriesKey = (String, BTreeMap<String, String>, String);

/// In-memory point store, keyed like the disk store so that re-writes replace values.
#[derive(Clone, Default)]
pub struct MemoryPointStore {
    inner: Arc<Mutex<HashMap<SeriesKey, BTreeMap<DateTime<Utc>, TimeSeriesPoint>>>>,
}

impl MemoryPointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct points held.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.values().map(BTreeMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PointStore for MemoryPointStore {
    async fn last_checkpoint(
        &self,
        query: &CheckpointQuery,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let series = self.inner.lock().await;
        Ok(series
            .values()
            .filter_map(|points| points.values().next_back())
            .filter(|point| query.matches(point))
            .map(|point| point.timestamp)
            .max())
    }

    async fn write_point(&self, point: TimeSeriesPoint) -> Result<(), StoreError> {
        let key = (
            point.measurement.clone(),
            point.tags.clone(),
            point.field.clone(),
        );
        let mut series = self.inner.lock().await;
        debug!(measurement = %point.measurement, timestamp = %point.timestamp, "Point PUT");
        series.entry(key).or_default().insert(point.timestamp, point);
        Ok(())
    }

    async fn query_points(
        &self,
        measurement: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeSeriesPoint>, StoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        let series = self.inner.lock().await;
        let mut points: Vec<_> = series
            .iter()
            .filter(|((name, _, _), _)| name == measurement)
            .flat_map(|(_, points)| points.range(from..=to).map(|(_, point)| point.clone()))
            .collect();
        points.sort_by_key(|point| point.timestamp);
        Ok(points)
    }
}
