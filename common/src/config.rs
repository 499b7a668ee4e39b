use config::{Config, ConfigError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{Error, Result};

/// Environment flag that switches path and backend defaults to the cloud profile.
pub const CLOUD_ENV_FLAG: &str = "RAINDAY_IN_CLOUD_ENVIRONMENT";

/// The archive has no data before 1940.
pub const MAX_HISTORY_DAYS_AGO: u32 = 36_500;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_bucket_name")]
    pub bucket_name: String,
    #[serde(default = "default_forecast_csvpath")]
    pub forecast_csvpath: String,
    #[serde(default = "default_forecast_individual_csvpath")]
    pub forecast_individual_csvpath: String,
    #[serde(default = "default_forecast_unioned_csvpath")]
    pub forecast_unioned_csvpath: String,
    #[serde(default = "default_wthr_historic_csvpath")]
    pub wthr_historic_csvpath: String,
    #[serde(default = "default_wthr_historic_unioned_csvpath")]
    pub wthr_historic_unioned_csvpath: String,
    #[serde(default = "default_history_days_ago")]
    pub history_days_ago: u32,
    #[serde(default)]
    pub users_details: Vec<UserLocation>,
    #[serde(default)]
    pub env_filename: Option<String>,
    #[serde(default)]
    pub env_filedir: Option<String>,
    #[serde(default)]
    pub log_responses_directory: Option<String>,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub warehouse: WarehouseSettings,
    #[serde(default)]
    pub forecast_api: ForecastApiConfig,
    #[serde(default)]
    pub history_api: HistoryApiConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(skip)]
    pub profile: Profile,
}

/// One configured user and the place their weather is fetched for.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct UserLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "city-province", alias = "region", default)]
    pub display_region: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Cloud,
    #[default]
    Local,
}

impl Profile {
    pub fn from_env() -> Self {
        match std::env::var(CLOUD_ENV_FLAG).as_deref() {
            Ok("yes") => Profile::Cloud,
            _ => Profile::Local,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Gcs,
    S3,
    Local,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnionMode {
    /// Every blob must carry the first blob's exact column list.
    #[default]
    Strict,
    /// Outer union: columns in first-seen order, missing cells are null.
    Reconcile,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Unset means "pick from the profile": gcs in the cloud, local otherwise.
    #[serde(default)]
    pub backend: Option<StorageBackend>,
    #[serde(default = "default_local_root")]
    pub local_root: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub service_account_key: Option<String>,
    #[serde(default)]
    pub conditional_writes: bool,
    #[serde(default)]
    pub union_mode: UnionMode,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: None,
            local_root: default_local_root(),
            endpoint: None,
            region: None,
            access_key: None,
            secret_key: None,
            service_account_key: None,
            conditional_writes: false,
            union_mode: UnionMode::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WarehouseSettings {
    #[serde(default)]
    pub project: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_forecast_table")]
    pub forecast_table: String,
    #[serde(default = "default_history_table")]
    pub history_table: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_bigquery_url")]
    pub base_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_load_retries")]
    pub load_retries: u32,
    #[serde(default = "default_write_disposition")]
    pub write_disposition: String,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            project: String::new(),
            dataset: default_dataset(),
            forecast_table: default_forecast_table(),
            history_table: default_history_table(),
            location: None,
            base_url: default_bigquery_url(),
            access_token: None,
            load_timeout_secs: default_load_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            load_retries: default_load_retries(),
            write_disposition: default_write_disposition(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForecastApiConfig {
    #[serde(default = "default_openweathermap_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ForecastApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openweathermap_url(),
            api_key: None,
            units: default_units(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryApiConfig {
    #[serde(default = "default_openmeteo_archive_url")]
    pub base_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HistoryApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openmeteo_archive_url(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocationErrorPolicy {
    #[default]
    Abort,
    Skip,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub on_location_error: LocationErrorPolicy,
}

fn default_bucket_name() -> String {
    "default_bucket_name".to_string()
}

fn default_forecast_csvpath() -> String {
    "weather_forecast_csv/daily".to_string()
}

fn default_forecast_individual_csvpath() -> String {
    "weather_forecast_csv/most_recent_individual_forecasts".to_string()
}

fn default_forecast_unioned_csvpath() -> String {
    "forecast_history_csv".to_string()
}

fn default_wthr_historic_csvpath() -> String {
    "weather_history_csv/daily/historic_weather".to_string()
}

fn default_wthr_historic_unioned_csvpath() -> String {
    "weather_history_csv/unioned/all_historic_weather".to_string()
}

fn default_history_days_ago() -> u32 {
    6
}

fn default_local_root() -> String {
    "data".to_string()
}

fn default_dataset() -> String {
    "rainday_gameday_models".to_string()
}

fn default_forecast_table() -> String {
    "all_historic_forecasts".to_string()
}

fn default_history_table() -> String {
    "all_historic_weather".to_string()
}

fn default_bigquery_url() -> String {
    "https://bigquery.googleapis.com".to_string()
}

fn default_load_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_load_retries() -> u32 {
    2
}

fn default_write_disposition() -> String {
    "WRITE_APPEND".to_string()
}

fn default_openweathermap_url() -> String {
    "https://api.openweathermap.org".to_string()
}

fn default_openmeteo_archive_url() -> String {
    "https://archive-api.open-meteo.com".to_string()
}

fn default_units() -> String {
    "metric".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_api_port() -> u16 {
    8080
}

impl Settings {
    pub fn new(path: &str) -> Result<Self> {
        Self::load(path, Profile::from_env())
    }

    pub fn load(path: &str, profile: Profile) -> Result<Self> {
        let file = Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        // Secrets live in an optional env file named by the settings document.
        let env_filedir: Option<String> = file.get("env_filedir").ok();
        let env_filename: Option<String> = file.get("env_filename").ok();
        if let (Some(dir), Some(name)) = (env_filedir, env_filename) {
            let env_path = Path::new(&dir).join(name);
            if env_path.exists() {
                dotenvy::from_path(&env_path).map_err(|e| {
                    Error::InvalidInput(format!(
                        "Failed to load env file {}: {}",
                        env_path.display(),
                        e
                    ))
                })?;
                debug!(path = %env_path.display(), "Loaded env file overlay");
            }
        }

        let config = Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.profile = profile;
        settings.apply_env_secrets();
        settings.validate()?;

        info!(
            bucket = %settings.bucket_name,
            users = settings.users_details.len(),
            profile = ?settings.profile,
            "Loaded settings"
        );

        Ok(settings)
    }

    fn apply_env_secrets(&mut self) {
        if self.forecast_api.api_key.is_none() {
            self.forecast_api.api_key = std::env::var("OPENWEATHERMAP_API_KEY").ok();
        }
        if self.warehouse.access_token.is_none() {
            self.warehouse.access_token = std::env::var("BIGQUERY_ACCESS_TOKEN").ok();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.bucket_name.trim().is_empty() {
            return Err(ConfigError::Message("bucket_name must not be empty".into()).into());
        }
        if self.history_days_ago > MAX_HISTORY_DAYS_AGO {
            return Err(ConfigError::Message(format!(
                "history_days_ago must be at most {}, got {}",
                MAX_HISTORY_DAYS_AGO, self.history_days_ago
            ))
            .into());
        }
        if self.storage.conditional_writes && self.storage_backend() == StorageBackend::Local {
            return Err(ConfigError::Message(
                "storage.conditional_writes is not supported by the local backend".into(),
            )
            .into());
        }
        for user in &self.users_details {
            if user.name.trim().is_empty() {
                return Err(ConfigError::Message("users_details entry without a name".into()).into());
            }
            if !(-90.0..=90.0).contains(&user.lat) || !(-180.0..=180.0).contains(&user.lon) {
                return Err(ConfigError::Message(format!(
                    "users_details entry '{}' has out-of-range coordinates ({}, {})",
                    user.name, user.lat, user.lon
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage.backend.unwrap_or(match self.profile {
            Profile::Cloud => StorageBackend::Gcs,
            Profile::Local => StorageBackend::Local,
        })
    }

    pub fn responses_folder(&self) -> PathBuf {
        let fallback = match self.profile {
            Profile::Cloud => "/tmp/responses",
            Profile::Local => "log/responses",
        };
        PathBuf::from(self.log_responses_directory.as_deref().unwrap_or(fallback))
    }
}
