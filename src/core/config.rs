use crate::core::sync::{DEFAULT_WINDOW_DAYS, SyncSettings};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

/// Measurement families a run can cover, in the order they are synchronised.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FamilyKind {
    Generation,
    Energy,
    Load,
    DayAhead,
    PhysicalFlow,
}

impl FamilyKind {
    pub const ALL: [FamilyKind; 5] = [
        FamilyKind::Generation,
        FamilyKind::Energy,
        FamilyKind::Load,
        FamilyKind::DayAhead,
        FamilyKind::PhysicalFlow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FamilyKind::Generation => "generation",
            FamilyKind::Energy => "energy",
            FamilyKind::Load => "load",
            FamilyKind::DayAhead => "day_ahead",
            FamilyKind::PhysicalFlow => "physical_flow",
        }
    }
}

impl FromStr for FamilyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        FamilyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                let known: Vec<_> = FamilyKind::ALL.iter().map(FamilyKind::as_str).collect();
                format!("unknown family '{s}', expected one of {}", known.join(", "))
            })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    pub max_calls: usize,
    pub per_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_calls: 400,
            per_seconds: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.per_seconds)
    }
}

#[derive(Deserialize, Serialize, Clone)]
pub struct EntsoeProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub security_token: Option<String>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for EntsoeProviderConfig {
    fn default() -> Self {
        EntsoeProviderConfig {
            base_url: "https://web-api.tp.entsoe.eu".to_string(),
            security_token: None,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl fmt::Debug for EntsoeProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntsoeProviderConfig")
            .field("base_url", &self.base_url)
            .field(
                "security_token",
                &self.security_token.as_ref().map(|_| "<redacted>"),
            )
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RiksbankProviderConfig {
    pub base_url: String,
    #[serde(default = "default_series")]
    pub series: String,
}

fn default_series() -> String {
    "SEKEURPMI".to_string()
}

impl Default for RiksbankProviderConfig {
    fn default() -> Self {
        RiksbankProviderConfig {
            base_url: "https://api.riksbank.se/swea/v1".to_string(),
            series: default_series(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub entsoe: EntsoeProviderConfig,
    #[serde(default)]
    pub riksbank: RiksbankProviderConfig,
}

/// Measurement names used in the point store.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MeasurementNames {
    pub generation: String,
    pub energy: String,
    pub load: String,
    pub day_ahead: String,
    pub physical_flow: String,
}

impl Default for MeasurementNames {
    fn default() -> Self {
        MeasurementNames {
            generation: "generation".to_string(),
            energy: "energy".to_string(),
            load: "load".to_string(),
            day_ahead: "day_ahead_price".to_string(),
            physical_flow: "physical_flow".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct StoreConfig {
    pub data_path: Option<String>,
    #[serde(default)]
    pub measurements: MeasurementNames,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u64,
    /// First day fetched for a series with nothing stored; ten years back when unset.
    #[serde(default)]
    pub epoch: Option<NaiveDate>,
    /// Market time zone; prices are converted at the rate of their local delivery day.
    #[serde(default = "default_time_zone")]
    pub time_zone: Tz,
}

fn default_window_days() -> u64 {
    DEFAULT_WINDOW_DAYS
}

fn default_time_zone() -> Tz {
    chrono_tz::Europe::Stockholm
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            window_days: DEFAULT_WINDOW_DAYS,
            epoch: None,
            time_zone: default_time_zone(),
        }
    }
}

impl SyncConfig {
    pub fn settings(&self, today: NaiveDate) -> SyncSettings {
        SyncSettings {
            window_days: self.window_days,
            epoch: self
                .epoch
                .unwrap_or_else(|| SyncSettings::default_epoch(today)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DaemonConfig {
    pub interval_minutes: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            interval_minutes: 60,
        }
    }
}

impl DaemonConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

fn default_families() -> Vec<FamilyKind> {
    FamilyKind::ALL.to_vec()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default = "default_families")]
    pub families: Vec<FamilyKind>,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            providers: ProvidersConfig::default(),
            store: StoreConfig::default(),
            sync: SyncConfig::default(),
            families: default_families(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("se", "gridtap", "gridtap")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.store.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.data_dir().join("points"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
providers:
  entsoe:
    base_url: "http://localhost:9000"
    security_token: "token-123"
    rate_limit:
      max_calls: 10
      per_seconds: 5
  riksbank:
    base_url: "http://localhost:9001"
store:
  data_path: "/tmp/gridtap"
  measurements:
    load: "load_mw"
sync:
  epoch: 2020-01-01
  time_zone: Europe/Helsinki
families:
  - load
  - day_ahead
daemon:
  interval_minutes: 15
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.providers.entsoe.base_url, "http://localhost:9000");
        assert_eq!(
            config.providers.entsoe.security_token.as_deref(),
            Some("token-123")
        );
        assert_eq!(config.providers.entsoe.rate_limit.max_calls, 10);
        assert_eq!(config.providers.entsoe.rate_limit.window(), Duration::from_secs(5));
        assert_eq!(config.providers.riksbank.series, "SEKEURPMI");
        assert_eq!(config.store.measurements.load, "load_mw");
        assert_eq!(config.store.measurements.energy, "energy");
        assert_eq!(config.sync.window_days, 7);
        assert_eq!(config.sync.time_zone, chrono_tz::Europe::Helsinki);
        assert_eq!(config.families, vec![FamilyKind::Load, FamilyKind::DayAhead]);
        assert_eq!(config.daemon.interval(), Duration::from_secs(15 * 60));
        assert_eq!(config.data_path().unwrap(), PathBuf::from("/tmp/gridtap"));

        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(
            config.sync.settings(today).epoch,
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_debug_output_hides_security_token() {
        let config = AppConfig {
            providers: ProvidersConfig {
                entsoe: EntsoeProviderConfig {
                    security_token: Some("token-123".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };

        let rendered = format!("{config:#?}");
        assert!(!rendered.contains("token-123"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("https://web-api.tp.entsoe.eu"));
    }

    #[test]
    fn test_family_kind_from_str() {
        assert_eq!("day-ahead".parse::<FamilyKind>(), Ok(FamilyKind::DayAhead));
        assert_eq!("Physical_Flow".parse::<FamilyKind>(), Ok(FamilyKind::PhysicalFlow));
        let error = "prices".parse::<FamilyKind>().unwrap_err();
        assert!(error.contains("generation, energy, load, day_ahead, physical_flow"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.families, FamilyKind::ALL.to_vec());
        assert_eq!(config.providers.entsoe.rate_limit.max_calls, 400);
        assert!(config.sync.epoch.is_none());
        assert_eq!(config.sync.time_zone, chrono_tz::Europe::Stockholm);

        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(
            config.sync.settings(today).epoch,
            NaiveDate::from_ymd_opt(2014, 6, 1).unwrap()
        );
    }
}
