mod forecast;
mod history;

pub use forecast::OpenWeatherMapClient;
pub use history::OpenMeteoArchiveClient;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::config::UserLocation;
use common::dataset::TabularDataset;
use common::{Error, Result};
use std::time::Duration;

/// Fetches the current multi-day forecast for one location.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch_forecast(
        &self,
        location: &UserLocation,
        capture_date: NaiveDate,
    ) -> Result<TabularDataset>;
}

/// Fetches observed weather for one location over an inclusive date range.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(
        &self,
        location: &UserLocation,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<TabularDataset>;
}

pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Turns a non-2xx response into `Error::Upstream`, keeping the body for the caller.
pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Could not read error body".to_string());
    Err(Error::Upstream {
        status: status.as_u16(),
        body,
    })
}
