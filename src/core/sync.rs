//! Checkpoint-driven synchronisation of measurement families.
//!
//! Every family exposes a list of independent targets. For each target the last persisted
//! timestamp is looked up in the store and fixed-size windows are walked forward from that day
//! until the window start reaches "now". A window the provider reports as empty is skipped;
//! any other failure ends that target and is recorded, while the remaining targets still run.

use crate::core::aggregate::Emitted;
use crate::core::clock::Clock;
use crate::core::error::SyncError;
use crate::core::series::{CheckpointQuery, Fetched, SyncWindow};
use crate::core::store::PointStore;
use async_trait::async_trait;
use chrono::{Months, NaiveDate};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_WINDOW_DAYS: u64 = 7;

/// One independently synchronised series of a family (an area, the national total, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub key: String,
    pub checkpoint: CheckpointQuery,
}

impl SyncTarget {
    pub fn new(key: &str, checkpoint: CheckpointQuery) -> Self {
        Self {
            key: key.to_string(),
            checkpoint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub window_days: u64,
    /// First day synchronised for a target without any stored point.
    pub epoch: NaiveDate,
}

impl SyncSettings {
    /// Ten years before `today`, the default starting point of an empty store.
    pub fn default_epoch(today: NaiveDate) -> NaiveDate {
        today.checked_sub_months(Months::new(120)).unwrap_or(today)
    }
}

/// A group of targets sharing a provider query and a measurement.
#[async_trait]
pub trait MeasurementFamily: Send + Sync {
    fn name(&self) -> &str;

    fn targets(&self) -> Vec<SyncTarget>;

    /// Fetches, expands and emits one window of `target`. `Fetched::Empty` means the provider
    /// had nothing for the window.
    async fn sync_window(
        &self,
        target: &SyncTarget,
        window: SyncWindow,
        store: &dyn PointStore,
        cancel: &CancellationToken,
    ) -> Result<Fetched<Emitted>, SyncError>;

    /// Runs once after all targets, with what each successful target emitted.
    async fn finalize(
        &self,
        _emitted: &[(SyncTarget, Emitted)],
        _store: &dyn PointStore,
    ) -> Result<Emitted, SyncError> {
        Ok(Emitted::default())
    }
}

/// Progress of a single target within one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetProgress {
    pub windows: usize,
    pub empty_windows: usize,
    pub emitted: Emitted,
}

#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub targets: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub windows: usize,
    pub empty_windows: usize,
    pub points: usize,
    pub elapsed: Duration,
}

impl SyncStats {
    fn record(&mut self, progress: &TargetProgress) {
        self.windows += progress.windows;
        self.empty_windows += progress.empty_windows;
        self.points += progress.emitted.points;
    }

    pub fn log_summary(&self, family: &str) {
        info!(
            family,
            targets = self.targets,
            succeeded = self.succeeded,
            failed = self.failed,
            windows = self.windows,
            empty_windows = self.empty_windows,
            points = self.points,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "Synchronisation finished"
        );
    }
}

#[derive(Debug)]
pub struct FamilyReport {
    pub family: String,
    pub stats: SyncStats,
    pub failures: Vec<(String, SyncError)>,
    pub cancelled: bool,
}

impl FamilyReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Walks the windows of one target from its checkpoint up to now.
#[instrument(skip_all, fields(family = family.name(), target = %target.key))]
pub async fn sync_target(
    family: &dyn MeasurementFamily,
    target: &SyncTarget,
    settings: SyncSettings,
    store: &dyn PointStore,
    clock: &dyn Clock,
    cancel: &CancellationToken,
) -> Result<TargetProgress, SyncError> {
    let checkpoint = store.last_checkpoint(&target.checkpoint).await?;
    let mut day = checkpoint
        .map(|timestamp| timestamp.date_naive())
        .unwrap_or(settings.epoch);
    debug!(?checkpoint, start = %day, "Resolved checkpoint");

    let now = clock.now();
    let mut progress = TargetProgress::default();
    loop {
        let window = SyncWindow::starting_at(day, settings.window_days.max(1));
        if window.start_instant() >= now {
            break;
        }
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            outcome = family.sync_window(target, window, store, cancel) => outcome?,
        };

        progress.windows += 1;
        match outcome {
            Fetched::Data(emitted) => progress.emitted.merge(emitted),
            Fetched::Empty => {
                debug!(%window, "No data for window");
                progress.empty_windows += 1;
            }
        }
        day = window.to;
    }

    Ok(progress)
}

/// Synchronises every target of `family` in order, isolating failures per target.
pub async fn run_family(
    family: &dyn MeasurementFamily,
    settings: SyncSettings,
    store: &dyn PointStore,
    clock: &dyn Clock,
    cancel: &CancellationToken,
) -> FamilyReport {
    let started = Instant::now();
    let mut report = FamilyReport {
        family: family.name().to_string(),
        stats: SyncStats::default(),
        failures: Vec::new(),
        cancelled: false,
    };
    let mut emitted = Vec::new();

    for target in family.targets() {
        report.stats.targets += 1;
        match sync_target(family, &target, settings, store, clock, cancel).await {
            Ok(progress) => {
                report.stats.succeeded += 1;
                report.stats.record(&progress);
                emitted.push((target, progress.emitted));
            }
            Err(e) if e.is_cancelled() => {
                warn!(family = family.name(), target = %target.key, "Synchronisation cancelled");
                report.cancelled = true;
                break;
            }
            Err(e) => {
                error!(
                    family = family.name(),
                    target = %target.key,
                    error = %e,
                    "Target synchronisation failed"
                );
                report.stats.failed += 1;
                report.failures.push((target.key.clone(), e));
            }
        }
    }

    if !report.cancelled {
        match family.finalize(&emitted, store).await {
            Ok(extra) => report.stats.points += extra.points,
            Err(e) => {
                error!(family = family.name(), error = %e, "Finalizing family failed");
                report.failures.push(("finalize".to_string(), e));
            }
        }
    }

    report.stats.elapsed = started.elapsed();
    report
}
