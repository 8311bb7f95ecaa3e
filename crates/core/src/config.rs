use chrono::Duration;
use serde::Deserialize;

use crate::error::{CampaignError, CampaignResult};

/// Root application configuration. Loaded from environment variables
/// with the prefix `CAMPAIGN_INAPP__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub in_app: InAppConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InAppConfig {
    /// Directory the asset downloader writes into; asset readiness is
    /// checked relative to it.
    #[serde(default = "default_storage_root")]
    pub storage_root: String,
    /// JSON file holding the persisted campaign state map.
    #[serde(default = "default_state_path")]
    pub state_path: String,
    /// JSON file holding the last fetched campaign definitions.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
    /// Redisplay delay used when a definition omits `throttle_delay`.
    #[serde(default = "default_throttle_secs")]
    pub default_throttle_secs: i64,
}

fn default_storage_root() -> String {
    "./inapp-assets".to_string()
}
fn default_state_path() -> String {
    "./inapp-state.json".to_string()
}
fn default_catalog_path() -> String {
    "./inapp-campaigns.json".to_string()
}
fn default_throttle_secs() -> i64 {
    0
}

impl Default for InAppConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            state_path: default_state_path(),
            catalog_path: default_catalog_path(),
            default_throttle_secs: default_throttle_secs(),
        }
    }
}

impl InAppConfig {
    /// `default_throttle_secs` as a duration. Negative or unrepresentable
    /// values are a configuration error.
    pub fn default_redisplay_delay(&self) -> CampaignResult<Duration> {
        let secs = self.default_throttle_secs;
        if secs < 0 {
            return Err(CampaignError::Config(format!(
                "default_throttle_secs must not be negative, got {secs}"
            )));
        }
        Duration::try_seconds(secs).ok_or_else(|| {
            CampaignError::Config(format!("default_throttle_secs {secs} is out of range"))
        })
    }
}

impl AppConfig {
    /// Load configuration from environment, optionally layered over a TOML
    /// file. Environment always wins.
    pub fn load() -> CampaignResult<Self> {
        Self::load_from(None)
    }

    pub fn load_from(path: Option<&str>) -> CampaignResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::with_name(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("CAMPAIGN_INAPP")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| CampaignError::Config(e.to_string()))
    }
}
