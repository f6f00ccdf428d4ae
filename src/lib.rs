pub mod cli;
pub mod collector;
pub mod core;
pub mod measurements;
pub mod providers;
pub mod store;

use crate::collector::Collector;
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::{AppConfig, FamilyKind};
use crate::core::rates::ExchangeRateCache;
use crate::core::store::PointStore;
use crate::providers::{EntsoeProvider, RiksbankProvider};
use crate::store::{DiskPointStore, MemoryPointStore};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    /// One synchronisation run; all configured families when `families` is empty. A dry run
    /// writes to memory only.
    Sync {
        families: Vec<FamilyKind>,
        dry_run: bool,
    },
    Daemon,
    Status,
    Rate { date: NaiveDate },
}

/// Everything a command needs, wired from one configuration.
pub struct App {
    pub config: AppConfig,
    pub store: Arc<dyn PointStore>,
    pub rates: Arc<ExchangeRateCache>,
    pub collector: Collector,
}

impl App {
    pub fn build(config: AppConfig, families: &[FamilyKind]) -> Result<Self> {
        let data_path = config.data_path()?;
        let store: Arc<dyn PointStore> = Arc::new(
            DiskPointStore::open(&data_path)
                .with_context(|| format!("Failed to open point store at {}", data_path.display()))?,
        );
        Self::with_store(config, families, store)
    }

    pub fn with_store(
        config: AppConfig,
        families: &[FamilyKind],
        store: Arc<dyn PointStore>,
    ) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let market = Arc::new(
            EntsoeProvider::new(&config.providers.entsoe)
                .context("Failed to create ENTSO-E client")?,
        );
        let rate_source = Arc::new(
            RiksbankProvider::new(&config.providers.riksbank)
                .context("Failed to create Riksbank client")?,
        );
        let rates = Arc::new(ExchangeRateCache::new(rate_source, Arc::clone(&clock)));

        let kinds = if families.is_empty() {
            config.families.as_slice()
        } else {
            families
        };
        let families = measurements::build_families(
            kinds,
            market,
            rates.clone(),
            &config.store.measurements,
            config.sync.time_zone,
        );
        let collector = Collector::new(families, store.clone(), clock, config.sync.clone());

        Ok(Self {
            config,
            store,
            rates,
            collector,
        })
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("gridtap starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Sync { families, dry_run } => {
            let app = if dry_run {
                info!("Dry run, points are kept in memory");
                App::with_store(config, &families, Arc::new(MemoryPointStore::new()))?
            } else {
                App::build(config, &families)?
            };
            cli::run::sync_once(&app).await
        }
        AppCommand::Daemon => {
            let app = App::build(config, &[])?;
            cli::run::daemon(&app).await
        }
        AppCommand::Status => {
            let app = App::build(config, &[])?;
            cli::status::display_status(&app).await
        }
        AppCommand::Rate { date } => {
            let app = App::build(config, &[])?;
            cli::rate::display_rate(&app, date).await
        }
    }
}
