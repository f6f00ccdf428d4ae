//! Error taxonomy of the collector.
//!
//! A provider reporting "no data" is not an error; see [`crate::core::series::Fetched`].

use chrono::NaiveDate;
use std::fmt::Display;
use thiserror::Error;

/// Any provider failure other than an empty result.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request error: {source} for URL: {url}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP error: {status} for URL: {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("Failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },
    #[error("Request cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Exchange-rate lookup failures.
#[derive(Debug, Error)]
pub enum RateError {
    #[error("No exchange rate available for {date}: first cached rate is {first}")]
    DateOutOfRange { date: NaiveDate, first: NaiveDate },
    #[error("No exchange rate available for {date} within {lookback_days} days")]
    NoRateAvailable { date: NaiveDate, lookback_days: u32 },
    #[error("Failed to load exchange rates: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Backend(#[from] fjall::Error),
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode stored point: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Corrupt checkpoint entry for {0}")]
    CorruptCheckpoint(String),
}

/// Failures collected from concurrently issued paired provider requests.
#[derive(Debug)]
pub struct ChainedFailure(pub Vec<ProviderError>);

impl Display for ChainedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} paired requests failed", self.0.len())?;
        for (index, error) in self.0.iter().enumerate() {
            write!(f, "; [{}] {error}", index + 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for ChainedFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Errors that abort the synchronization of one target.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Rate(#[from] RateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Chained(#[from] ChainedFailure),
    #[error("Synchronization cancelled")]
    Cancelled,
}

impl SyncError {
    /// True when the run was stopped by cancellation rather than by a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            SyncError::Cancelled
                | SyncError::Provider(ProviderError::Cancelled)
                | SyncError::Rate(RateError::Provider(ProviderError::Cancelled))
        )
    }
}

/// Why a period or point of a provider series was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("Could not parse period start {0:?} as an instant")]
    Instant(String),
    #[error("Could not parse resolution {0:?} as an ISO-8601 duration")]
    Resolution(String),
    #[error("Could not parse position {0:?} as a positive integer")]
    Position(String),
    #[error("Could not parse value {0:?} as a decimal")]
    Value(String),
    #[error("Position {0} lies outside the representable time range")]
    Overflow(i64),
}
