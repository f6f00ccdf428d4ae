//! Runs the configured measurement families against one store.

use crate::core::clock::Clock;
use crate::core::config::SyncConfig;
use crate::core::error::StoreError;
use crate::core::store::PointStore;
use crate::core::sync::{FamilyReport, MeasurementFamily, run_family};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct RunReport {
    pub families: Vec<FamilyReport>,
    /// Another run was in progress, so this one did nothing.
    pub skipped: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        !self.skipped && self.families.iter().all(FamilyReport::is_success)
    }

    pub fn points(&self) -> usize {
        self.families.iter().map(|report| report.stats.points).sum()
    }

    pub fn cancelled(&self) -> bool {
        self.families.iter().any(|report| report.cancelled)
    }
}

pub struct Collector {
    families: Vec<Arc<dyn MeasurementFamily>>,
    store: Arc<dyn PointStore>,
    clock: Arc<dyn Clock>,
    sync: SyncConfig,
    running: Mutex<()>,
}

impl Collector {
    pub fn new(
        families: Vec<Arc<dyn MeasurementFamily>>,
        store: Arc<dyn PointStore>,
        clock: Arc<dyn Clock>,
        sync: SyncConfig,
    ) -> Self {
        Self {
            families,
            store,
            clock,
            sync,
            running: Mutex::new(()),
        }
    }

    pub fn families(&self) -> &[Arc<dyn MeasurementFamily>] {
        &self.families
    }

    /// Synchronises every family in order. A call made while another is still running is
    /// skipped.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport, StoreError> {
        let Ok(_running) = self.running.try_lock() else {
            warn!("Collector run already in progress, skipping");
            return Ok(RunReport {
                skipped: true,
                ..Default::default()
            });
        };

        let settings = self.sync.settings(self.clock.today());
        info!(families = self.families.len(), epoch = %settings.epoch, "Collector run starting");

        let mut report = RunReport::default();
        for family in &self.families {
            let family_report = run_family(
                family.as_ref(),
                settings,
                self.store.as_ref(),
                self.clock.as_ref(),
                cancel,
            )
            .await;
            family_report.stats.log_summary(family.name());
            let cancelled = family_report.cancelled;
            report.families.push(family_report);
            if cancelled {
                break;
            }
        }

        self.store.flush().await?;
        info!(
            points = report.points(),
            success = report.is_success(),
            "Collector run finished"
        );
        Ok(report)
    }
}
