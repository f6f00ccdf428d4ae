use crate::core::error::StoreError;
use crate::core::series::{CheckpointQuery, TimeSeriesPoint};
use crate::core::store::PointStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

const SEPARATOR: char = '\0';

/// Point store persisted in a fjall keyspace.
///
/// `points` holds one JSON-encoded point per `measurement\0timestamp\0tags\0field` key, so
/// writing the same point again replaces it and a time range maps to one key range. `checkpoints` holds the newest timestamp per
/// measurement and per `measurement\0tag=value`.
pub struct DiskPointStore {
    keyspace: Keyspace,
    points: PartitionHandle,
    checkpoints: PartitionHandle,
    write_lock: Mutex<()>,
}

impl DiskPointStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)?;
        let keyspace = fjall::Config::new(path).open()?;
        let points = keyspace.open_partition("points", PartitionCreateOptions::default())?;
        let checkpoints =
            keyspace.open_partition("checkpoints", PartitionCreateOptions::default())?;
        debug!(path = %path.display(), "Opened point store");
        Ok(Self {
            keyspace,
            points,
            checkpoints,
            write_lock: Mutex::new(()),
        })
    }

    fn point_key(point: &TimeSeriesPoint) -> String {
        let tags = point
            .tags
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}{tags}{SEPARATOR}{}",
            instant_prefix(&point.measurement, point.timestamp),
            point.field
        )
    }

    fn checkpoint_keys(point: &TimeSeriesPoint) -> Vec<String> {
        std::iter::once(point.measurement.clone())
            .chain(
                point
                    .tags
                    .iter()
                    .map(|(key, value)| tag_checkpoint_key(&point.measurement, key, value)),
            )
            .collect()
    }

    fn read_checkpoint(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(raw) = self.checkpoints.get(key)? else {
            return Ok(None);
        };
        let text = std::str::from_utf8(&raw)
            .map_err(|_| StoreError::CorruptCheckpoint(key.replace(SEPARATOR, "/")))?;
        DateTime::parse_from_rfc3339(text)
            .map(|instant| Some(instant.with_timezone(&Utc)))
            .map_err(|_| StoreError::CorruptCheckpoint(key.replace(SEPARATOR, "/")))
    }
}

fn encode_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// `measurement\0timestamp\0`. Encoded instants have a fixed width, so keys sort by time.
fn instant_prefix(measurement: &str, instant: DateTime<Utc>) -> String {
    format!("{measurement}{SEPARATOR}{}{SEPARATOR}", encode_instant(instant))
}

fn tag_checkpoint_key(measurement: &str, key: &str, value: &str) -> String {
    format!("{measurement}{SEPARATOR}{key}={value}")
}

#[async_trait]
impl PointStore for DiskPointStore {
    async fn last_checkpoint(
        &self,
        query: &CheckpointQuery,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let key = match &query.tag {
            Some((key, value)) => tag_checkpoint_key(&query.measurement, key, value),
            None => query.measurement.clone(),
        };
        self.read_checkpoint(&key)
    }

    async fn write_point(&self, point: TimeSeriesPoint) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(&point)?;
        let _guard = self.write_lock.lock().await;

        self.points.insert(Self::point_key(&point), encoded)?;
        for key in Self::checkpoint_keys(&point) {
            let newer = self
                .read_checkpoint(&key)?
                .is_none_or(|current| current < point.timestamp);
            if newer {
                self.checkpoints
                    .insert(key, encode_instant(point.timestamp))?;
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.keyspace.persist(PersistMode::SyncAll)?;
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
        let start = instant_prefix(measurement, from);
        // Every key at `to` continues with `\0` after the prefix's timestamp.
        let end = format!("{measurement}{SEPARATOR}{}\u{1}", encode_instant(to));

        let mut points = Vec::new();
        for entry in self.points.range(start..end) {
            let (_, value) = entry?;
            points.push(serde_json::from_slice(&value)?);
        }
        Ok(points)
    }
}
