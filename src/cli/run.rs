use crate::App;
use crate::collector::RunReport;
use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cancels `cancel` on Ctrl-C.
fn cancel_on_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, cancelling");
            cancel.cancel();
        }
    })
}

fn check_report(report: &RunReport) -> Result<()> {
    if report.skipped {
        anyhow::bail!("Another synchronisation run is in progress");
    }
    if report.cancelled() {
        anyhow::bail!("Synchronisation cancelled");
    }
    let failed: usize = report.families.iter().map(|f| f.failures.len()).sum();
    if failed > 0 {
        anyhow::bail!("{failed} targets failed to synchronise");
    }
    Ok(())
}

/// Runs every configured family once.
pub async fn sync_once(app: &App) -> Result<()> {
    let cancel = CancellationToken::new();
    let listener = cancel_on_ctrl_c(cancel.clone());
    let report = app.collector.run(&cancel).await;
    listener.abort();

    let report = report?;
    info!(points = report.points(), "Synchronisation complete");
    check_report(&report)
}

/// Runs the collector every configured interval until `cancel` fires.
pub async fn run_until_cancelled(app: &App, cancel: &CancellationToken) -> Result<()> {
    let interval_minutes = app.config.daemon.interval_minutes;
    info!(interval_minutes, "Daemon mode starting");

    let mut interval = tokio::time::interval(app.config.daemon.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Daemon stopping");
                break;
            }
            _ = interval.tick() => {
                match app.collector.run(cancel).await {
                    Ok(report) => {
                        if let Err(e) = check_report(&report) {
                            warn!(error = %e, "Collector run incomplete");
                        }
                    }
                    Err(e) => error!(error = %e, "Collector run failed"),
                }
                info!(interval_minutes, "Waiting for next run");
            }
        }
    }
    Ok(())
}

pub async fn daemon(app: &App) -> Result<()> {
    let cancel = CancellationToken::new();
    let listener = cancel_on_ctrl_c(cancel.clone());
    let result = run_until_cancelled(app, &cancel).await;
    listener.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::store::MemoryPointStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn idle_app() -> App {
        let config = AppConfig {
            families: Vec::new(),
            ..AppConfig::default()
        };
        App::with_store(config, &[], Arc::new(MemoryPointStore::new())).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_stops_when_cancelled() {
        let app = idle_app();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
            trigger.cancel();
        });

        run_until_cancelled(&app, &cancel).await.unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_sync_once_without_families_succeeds() {
        sync_once(&idle_app()).await.unwrap();
    }

    #[test]
    fn test_skipped_run_is_reported() {
        let report = RunReport {
            skipped: true,
            ..Default::default()
        };
        let error = check_report(&report).unwrap_err();
        assert!(error.to_string().contains("in progress"));
    }
}
