//! Point store abstraction consumed by the sync loop.

use crate::core::error::StoreError;
use crate::core::series::{CheckpointQuery, TimeSeriesPoint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait PointStore: Send + Sync {
    /// Latest timestamp persisted for the series selected by `query`.
    async fn last_checkpoint(
        &self,
        query: &CheckpointQuery,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Writes one point. Writing the same `(measurement, tags, field, timestamp)` twice
    /// replaces the earlier value.
    async fn write_point(&self, point: TimeSeriesPoint) -> Result<(), StoreError>;

    /// Makes every write so far durable.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Points of `measurement` with `from <= timestamp <= to`, ordered by timestamp.
    async fn query_points(
        &self,
        measurement: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeSeriesPoint>, StoreError>;
}
