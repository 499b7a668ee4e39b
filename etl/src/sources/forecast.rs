use async_trait::async_trait;
use chrono::NaiveDate;
use common::config::{ForecastApiConfig, UserLocation};
use common::dataset::TabularDataset;
use common::{Error, Result};
use std::path::PathBuf;
use tracing::{debug, info};

use super::{ForecastSource, check_status, http_client};
use crate::models::{ForecastResponse, ForecastRow};

/// OpenWeatherMap 5-day / 3-hour forecast adapter.
pub struct OpenWeatherMapClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    units: String,
    response_log_dir: Option<PathBuf>,
}

impl OpenWeatherMapClient {
    pub fn new(config: &ForecastApiConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::InvalidInput("OPENWEATHERMAP_API_KEY is not set".to_string())
        })?;

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            units: config.units.clone(),
            response_log_dir: None,
        })
    }

    /// Keep a copy of every raw response under `dir`, one file per location.
    pub fn with_response_log(mut self, dir: PathBuf) -> Self {
        self.response_log_dir = Some(dir);
        self
    }

    async fn fetch_raw(&self, location: &UserLocation) -> Result<String> {
        let url = format!("{}/data/2.5/forecast", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", location.lat.to_string()),
                ("lon", location.lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", self.units.clone()),
            ])
            .send()
            .await?;

        Ok(check_status(response).await?.text().await?)
    }

    async fn log_response(&self, location: &UserLocation, body: &str) -> Result<()> {
        if let Some(dir) = &self.response_log_dir {
            tokio::fs::create_dir_all(dir).await?;
            let path = dir.join(format!("response_{}.json", location.name));
            tokio::fs::write(&path, body).await?;
            debug!(path = %path.display(), "Saved raw forecast response");
        }
        Ok(())
    }
}

/// Flattens a forecast response into one row per forecast slot.
pub fn forecast_rows(
    response: &ForecastResponse,
    name: &str,
    capture_date: NaiveDate,
) -> Vec<ForecastRow> {
    response
        .list
        .iter()
        .map(|entry| ForecastRow::from_entry(entry, name, capture_date))
        .collect()
}

#[async_trait]
impl ForecastSource for OpenWeatherMapClient {
    async fn fetch_forecast(
        &self,
        location: &UserLocation,
        capture_date: NaiveDate,
    ) -> Result<TabularDataset> {
        let body = self.fetch_raw(location).await?;
        self.log_response(location, &body).await?;

        let response: ForecastResponse = serde_json::from_str(&body)?;
        let rows = forecast_rows(&response, &location.name, capture_date);
        info!(
            user = %location.name,
            region = %location.display_region,
            rows = rows.len(),
            "Fetched forecast"
        );

        TabularDataset::from_records(&rows)
    }
}
