//! Time-series types shared by providers, the sync loop and the stores.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// A `[from, to]` range of calendar dates requested from a provider in one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl SyncWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// Window of `days` starting at `from`.
    pub fn starting_at(from: NaiveDate, days: u64) -> Self {
        let to = from.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX);
        Self { from, to }
    }

    /// Start of the window as a UTC instant (midnight).
    pub fn start_instant(&self) -> DateTime<Utc> {
        self.from.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
    }

    /// End of the window as a UTC instant (midnight).
    pub fn end_instant(&self) -> DateTime<Utc> {
        self.to.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// True when this window spans all of `other`.
    pub fn covers(&self, other: &SyncWindow) -> bool {
        self.from <= other.from && self.to >= other.to
    }
}

impl Display for SyncWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Outcome of a provider call. `Empty` is the provider saying "nothing here" and is
/// never treated as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Data(T),
    Empty,
}

impl<T> Fetched<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Fetched::Empty)
    }

    #[cfg(test)]
    pub fn into_option(self) -> Option<T> {
        match self {
            Fetched::Data(data) => Some(data),
            Fetched::Empty => None,
        }
    }
}

/// A single `(position, value)` entry as delivered by a provider, unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPoint {
    pub position: String,
    pub value: String,
}

/// A provider period: a start instant, a resolution and ordinal positions relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPeriod {
    pub start: String,
    pub resolution: String,
    pub points: Vec<RawPoint>,
}

/// One series of a provider document together with the dimensions it was reported for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSeries {
    pub psr_type: Option<String>,
    pub in_domain: Option<String>,
    pub out_domain: Option<String>,
    pub currency: Option<String>,
    pub price_unit: Option<String>,
    pub periods: Vec<RawPeriod>,
}

/// A row as written to the point store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub field: String,
    pub value: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl TimeSeriesPoint {
    pub fn new(measurement: &str, field: &str, value: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.to_string(),
            tags: BTreeMap::new(),
            field: field.to_string(),
            value,
            timestamp,
        }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Selects the series whose last persisted timestamp is the checkpoint of a sync target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointQuery {
    pub measurement: String,
    pub tag: Option<(String, String)>,
}

impl CheckpointQuery {
    pub fn measurement(measurement: &str) -> Self {
        Self {
            measurement: measurement.to_string(),
            tag: None,
        }
    }

    pub fn tagged(measurement: &str, key: &str, value: &str) -> Self {
        Self {
            measurement: measurement.to_string(),
            tag: Some((key.to_string(), value.to_string())),
        }
    }

    pub fn matches(&self, point: &TimeSeriesPoint) -> bool {
        point.measurement == self.measurement
            && self
                .tag
                .as_ref()
                .is_none_or(|(key, value)| point.tag_value(key) == Some(value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_starting_at() {
        let window = SyncWindow::starting_at(date(2024, 1, 1), 7);
        assert_eq!(window.to, date(2024, 1, 8));
        assert!(window.contains(date(2024, 1, 8)));
        assert!(!window.contains(date(2024, 1, 9)));
        assert_eq!(window.to_string(), "[2024-01-01, 2024-01-08]");
    }

    #[test]
    fn test_checkpoint_query_matches_tag() {
        let point = TimeSeriesPoint::new("generation", "MW", dec!(1), Utc::now())
            .tag("area", "SE1")
            .tag("energyType", "Vindkraft");

        assert!(CheckpointQuery::measurement("generation").matches(&point));
        assert!(CheckpointQuery::tagged("generation", "area", "SE1").matches(&point));
        assert!(!CheckpointQuery::tagged("generation", "area", "SE2").matches(&point));
        assert!(!CheckpointQuery::measurement("load").matches(&point));
    }
}
