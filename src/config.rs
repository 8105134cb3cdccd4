use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::decision::Thresholds;

pub const APP_NAME: &str = "sds-sync";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "SDS_SYNC_";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "sds_sync=info,warn"
}

/// Data directory: `<platform data dir>/sds-sync`, or the working directory
/// when the platform has none.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Base URLs and timeouts of the external services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub extraction_url: String,
    pub registry_url: String,
    pub mailbox_url: String,
    pub mailer_url: String,
    pub sigma_aldrich_url: String,
    pub vwr_url: String,
    pub http_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            extraction_url: "http://localhost:8085".into(),
            registry_url: "http://localhost:8086".into(),
            mailbox_url: "http://localhost:8087".into(),
            mailer_url: "http://localhost:8088".into(),
            sigma_aldrich_url: "https://api.sigmaaldrich.com/v1".into(),
            vwr_url: "https://api.vwr.com/v2".into(),
            http_timeout_secs: 60,
        }
    }
}

/// Policy values of the sync engine. Every constant the jobs use lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    pub storage_root: PathBuf,

    pub auto_apply_threshold: f64,
    pub review_threshold: f64,
    pub sds_review_interval_months: u32,

    pub supplier_freshness_days: i64,
    pub registry_resync_days: i64,
    pub email_lookback_days: i64,
    pub substitution_cooldown_days: i64,

    pub supplier_batch_cap: u32,
    pub registry_batch_cap: u32,

    pub external_call_delay_ms: u64,
    pub tenant_delay_ms: u64,
    pub job_budget_secs: u64,

    /// Three-letter day substitution reminders go out on (`Mon`..`Sun`).
    pub reminder_weekday: String,

    pub endpoints: EndpointConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data = app_data_dir();
        Self {
            db_path: data.join("sds-sync.db"),
            storage_root: data.join("documents"),
            auto_apply_threshold: 0.8,
            review_threshold: 0.3,
            sds_review_interval_months: 36,
            supplier_freshness_days: 7,
            registry_resync_days: 182,
            email_lookback_days: 3,
            substitution_cooldown_days: 30,
            supplier_batch_cap: 10,
            registry_batch_cap: 10,
            external_call_delay_ms: 2000,
            tenant_delay_ms: 2000,
            job_budget_secs: 30 * 60,
            reminder_weekday: "Mon".into(),
            endpoints: EndpointConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults, then the TOML file (if given), then `SDS_SYNC_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override paths and endpoints from a variable lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = var("STORAGE_ROOT") {
            self.storage_root = PathBuf::from(v);
        }
        let endpoints = [
            ("EXTRACTION_URL", &mut self.endpoints.extraction_url),
            ("REGISTRY_URL", &mut self.endpoints.registry_url),
            ("MAILBOX_URL", &mut self.endpoints.mailbox_url),
            ("MAILER_URL", &mut self.endpoints.mailer_url),
            ("SIGMA_ALDRICH_URL", &mut self.endpoints.sigma_aldrich_url),
            ("VWR_URL", &mut self.endpoints.vwr_url),
        ];
        for (name, slot) in endpoints {
            if let Some(v) = var(name) {
                *slot = v;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.auto_apply_threshold) || !in_unit(self.review_threshold) {
            return Err(ConfigError::Invalid {
                key: "auto_apply_threshold",
                reason: "thresholds must lie in [0, 1]".into(),
            });
        }
        if self.review_threshold > self.auto_apply_threshold {
            return Err(ConfigError::Invalid {
                key: "review_threshold",
                reason: format!(
                    "{} exceeds auto_apply_threshold {}",
                    self.review_threshold, self.auto_apply_threshold
                ),
            });
        }
        self.reminder_weekday()?;
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            auto_apply: self.auto_apply_threshold,
            review: self.review_threshold,
        }
    }

    pub fn reminder_weekday(&self) -> Result<Weekday, ConfigError> {
        self.reminder_weekday
            .parse::<Weekday>()
            .map_err(|_| ConfigError::Invalid {
                key: "reminder_weekday",
                reason: format!("unknown weekday {:?}", self.reminder_weekday),
            })
    }

    pub fn external_call_delay(&self) -> Duration {
        Duration::from_millis(self.external_call_delay_ms)
    }

    pub fn tenant_delay(&self) -> Duration {
        Duration::from_millis(self.tenant_delay_ms)
    }

    pub fn job_budget(&self) -> Duration {
        Duration::from_secs(self.job_budget_secs)
    }

    pub fn supplier_freshness(&self) -> chrono::Duration {
        chrono::Duration::days(self.supplier_freshness_days)
    }

    pub fn registry_resync(&self) -> chrono::Duration {
        chrono::Duration::days(self.registry_resync_days)
    }

    pub fn email_lookback(&self) -> chrono::Duration {
        chrono::Duration::days(self.email_lookback_days)
    }

    pub fn substitution_cooldown(&self) -> chrono::Duration {
        chrono::Duration::days(self.substitution_cooldown_days)
    }
}
