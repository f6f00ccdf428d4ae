//! Expands provider periods (start instant, resolution, ordinal positions) into
//! timestamped values.
//!
//! The entry at `position` of a period lies at `start + resolution * (position - 1)`.
//! Periods or points that cannot be parsed are logged and skipped; expansion never fails.

use crate::core::error::PeriodError;
use crate::core::series::{RawPeriod, RawPoint, RawSeries};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

/// A provider point resolved to an absolute timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodPoint {
    pub timestamp: DateTime<Utc>,
    pub position: i64,
    pub value: Decimal,
}

/// Parses an ISO-8601 duration of fixed length (`PT15M`, `PT60M`, `P1D`, `P1W`, `PT0.5S`).
///
/// Calendar components (years, months) have no fixed length and are rejected.
pub fn parse_duration(text: &str) -> Result<TimeDelta, PeriodError> {
    let invalid = || PeriodError::Resolution(text.to_string());
    let body = text.trim().strip_prefix('P').ok_or_else(invalid)?;
    if body.is_empty() {
        return Err(invalid());
    }

    let (date_part, time_part) = match body.split_once('T') {
        Some((_, "")) => return Err(invalid()),
        Some((date, time)) => (date, Some(time)),
        None => (body, None),
    };

    let mut total = TimeDelta::zero();
    for (amount, unit) in components(date_part).ok_or_else(invalid)? {
        let whole = amount.parse::<i64>().map_err(|_| invalid())?;
        let delta = match unit {
            'W' => TimeDelta::try_weeks(whole),
            'D' => TimeDelta::try_days(whole),
            _ => None,
        };
        total = total.checked_add(&delta.ok_or_else(invalid)?).ok_or_else(invalid)?;
    }

    for (amount, unit) in time_part
        .map(components)
        .unwrap_or(Some(Vec::new()))
        .ok_or_else(invalid)?
    {
        let delta = match unit {
            'H' => amount.parse().ok().and_then(TimeDelta::try_hours),
            'M' => amount.parse().ok().and_then(TimeDelta::try_minutes),
            'S' => parse_seconds(amount),
            _ => None,
        };
        total = total.checked_add(&delta.ok_or_else(invalid)?).ok_or_else(invalid)?;
    }

    if total <= TimeDelta::zero() {
        return Err(invalid());
    }
    Ok(total)
}

/// Splits `1D2H`-style text into `("1", 'D'), ("2", 'H')`.
fn components(text: &str) -> Option<Vec<(&str, char)>> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (index, ch) in text.char_indices() {
        if ch.is_ascii_alphabetic() {
            let amount = &text[start..index];
            if amount.is_empty() {
                return None;
            }
            parts.push((amount, ch));
            start = index + ch.len_utf8();
        }
    }
    (start == text.len()).then_some(parts)
}

fn parse_seconds(amount: &str) -> Option<TimeDelta> {
    let seconds = Decimal::from_str(amount).ok()?;
    let millis = (seconds * Decimal::ONE_THOUSAND).trunc();
    TimeDelta::try_milliseconds(i64::try_from(millis).ok()?)
}

/// Parses a provider instant. Accepts RFC 3339 as well as the minute-precision
/// `2024-01-01T23:00Z` form used by ENTSO-E.
pub fn parse_instant(text: &str) -> Result<DateTime<Utc>, PeriodError> {
    let text = text.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(instant.with_timezone(&Utc));
    }
    if let Some(naive) = text.strip_suffix('Z') {
        for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, format) {
                return Ok(parsed.and_utc());
            }
        }
    }
    DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M%:z")
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|_| PeriodError::Instant(text.to_string()))
}

/// Absolute timestamp of the entry at `position` (1-based).
pub fn point_instant(
    start: DateTime<Utc>,
    resolution: TimeDelta,
    position: i64,
) -> Result<DateTime<Utc>, PeriodError> {
    let offset = i32::try_from(position - 1)
        .ok()
        .and_then(|steps| resolution.checked_mul(steps))
        .ok_or(PeriodError::Overflow(position))?;
    start
        .checked_add_signed(offset)
        .ok_or(PeriodError::Overflow(position))
}

fn resolve_point(
    start: DateTime<Utc>,
    resolution: TimeDelta,
    point: &RawPoint,
) -> Result<PeriodPoint, PeriodError> {
    let position = point
        .position
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|position| *position >= 1)
        .ok_or_else(|| PeriodError::Position(point.position.clone()))?;
    let value = Decimal::from_str(point.value.trim())
        .map_err(|_| PeriodError::Value(point.value.clone()))?;
    Ok(PeriodPoint {
        timestamp: point_instant(start, resolution, position)?,
        position,
        value,
    })
}

fn period_points(period: &RawPeriod) -> impl Iterator<Item = PeriodPoint> + '_ {
    let header = parse_instant(&period.start)
        .and_then(|start| parse_duration(&period.resolution).map(|res| (start, res)));
    let header = match header {
        Ok(header) => Some(header),
        Err(e) => {
            warn!(error = %e, start = %period.start, "Skipping malformed period");
            None
        }
    };

    header.into_iter().flat_map(move |(start, resolution)| {
        period
            .points
            .iter()
            .filter_map(move |point| match resolve_point(start, resolution, point) {
                Ok(resolved) => Some(resolved),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed point");
                    None
                }
            })
    })
}

/// Lazily expands `periods` in provider order, applying `map` to each resolved point.
///
/// The returned iterator borrows the periods, so calling this again restarts the expansion.
pub fn expand<'a, P, T, F>(periods: P, map: F) -> impl Iterator<Item = T> + 'a
where
    P: IntoIterator<Item = &'a RawPeriod>,
    P::IntoIter: 'a,
    F: Fn(PeriodPoint) -> T + 'a,
{
    periods.into_iter().flat_map(period_points).map(map)
}

/// Expands every period of a series; an absent series yields nothing.
pub fn expand_series<'a, T, F>(series: Option<&'a RawSeries>, map: F) -> impl Iterator<Item = T> + 'a
where
    F: Fn(PeriodPoint) -> T + 'a,
{
    expand(series.into_iter().flat_map(|s| s.periods.iter()), map)
}
