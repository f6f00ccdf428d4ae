//! Grouping of expanded readings and emission of rows to the point store.

use crate::core::error::StoreError;
use crate::core::series::TimeSeriesPoint;
use crate::core::store::PointStore;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

/// A single expanded value reported for one dimension (energy type, area, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub dimension: String,
    pub value: Decimal,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, dimension: &str, value: Decimal) -> Self {
        Self {
            timestamp,
            dimension: dimension.to_string(),
            value,
        }
    }
}

/// The sum of all readings sharing a group instant and dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRow {
    /// Earliest reading instant of the group.
    pub timestamp: DateTime<Utc>,
    pub dimension: String,
    pub value: Decimal,
    pub readings: usize,
}

/// Groups readings by `(bucket(timestamp), dimension)` and sums each group.
///
/// Rows are ordered by group instant, then dimension. With the identity bucket every row
/// carries the instant it was grouped on; coarser buckets keep the earliest reading instant.
pub fn sum_by_dimension<I, B>(readings: I, bucket: B) -> Vec<GroupRow>
where
    I: IntoIterator<Item = Reading>,
    B: Fn(DateTime<Utc>) -> DateTime<Utc>,
{
    let mut groups: BTreeMap<(DateTime<Utc>, String), GroupRow> = BTreeMap::new();
    for reading in readings {
        let key = (bucket(reading.timestamp), reading.dimension);
        let row = groups.entry(key).or_insert_with_key(|(_, dimension)| GroupRow {
            timestamp: reading.timestamp,
            dimension: dimension.clone(),
            value: Decimal::ZERO,
            readings: 0,
        });
        row.value += reading.value;
        row.readings += 1;
        row.timestamp = row.timestamp.min(reading.timestamp);
    }
    groups.into_values().collect()
}

/// Groups on the exact reading instant.
pub fn sum_per_instant<I>(readings: I) -> Vec<GroupRow>
where
    I: IntoIterator<Item = Reading>,
{
    sum_by_dimension(readings, |timestamp| timestamp)
}

/// Appends, after the rows of each instant, a row labelled `label` holding their sum.
pub fn with_totals(rows: Vec<GroupRow>, label: &str) -> Vec<GroupRow> {
    let mut result = Vec::with_capacity(rows.len() + rows.len() / 2);
    let mut rows = rows.into_iter().peekable();
    while let Some(first) = rows.next() {
        let instant = first.timestamp;
        let mut total = GroupRow {
            timestamp: instant,
            dimension: label.to_string(),
            value: first.value,
            readings: first.readings,
        };
        result.push(first);
        while let Some(row) = rows.next_if(|row| row.timestamp == instant) {
            total.value += row.value;
            total.readings += row.readings;
            result.push(row);
        }
        result.push(total);
    }
    result
}

/// Sum of stored point values per timestamp.
pub fn sum_by_timestamp<'a, I>(points: I) -> BTreeMap<DateTime<Utc>, Decimal>
where
    I: IntoIterator<Item = &'a TimeSeriesPoint>,
{
    let mut sums = BTreeMap::new();
    for point in points {
        *sums.entry(point.timestamp).or_insert(Decimal::ZERO) += point.value;
    }
    sums
}

/// What an emission wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Emitted {
    pub points: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

impl Emitted {
    pub fn merge(&mut self, other: Emitted) {
        self.points += other.points;
        self.first = min_opt(self.first, other.first);
        self.last = self.last.max(other.last);
    }
}

fn min_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Writes every point, one atomic write per point.
pub async fn emit<I>(store: &dyn PointStore, points: I) -> Result<Emitted, StoreError>
where
    I: IntoIterator<Item = TimeSeriesPoint>,
{
    let mut emitted = Emitted::default();
    for point in points {
        let timestamp = point.timestamp;
        store.write_point(point).await?;
        emitted.merge(Emitted {
            points: 1,
            first: Some(timestamp),
            last: Some(timestamp),
        });
    }
    if emitted.points > 0 {
        debug!(points = emitted.points, first = ?emitted.first, last = ?emitted.last, "Emitted points");
    }
    Ok(emitted)
}
