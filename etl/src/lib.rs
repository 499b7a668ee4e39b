//! Extraction side of the weather pipeline: source adapters for the
//! forecast and archive APIs, their response models, and retry helpers.

pub mod models;
pub mod sources;
pub mod utils;

use chrono::NaiveDate;
use common::Result;
use common::config::Settings;
use common::dataset::TabularDataset;
use sources::{ForecastSource, HistorySource, OpenMeteoArchiveClient, OpenWeatherMapClient};
use tracing::info;

/// Fetches the forecast for every configured user and concatenates the results.
pub async fn extract_forecasts(
    settings: &Settings,
    source: &dyn ForecastSource,
    capture_date: NaiveDate,
) -> Result<TabularDataset> {
    let mut datasets = Vec::with_capacity(settings.users_details.len());
    for user in &settings.users_details {
        datasets.push(source.fetch_forecast(user, capture_date).await?);
    }
    TabularDataset::concat(datasets, settings.storage.union_mode)
}

/// Fetches one day of history for every configured user and concatenates the results.
pub async fn extract_history(
    settings: &Settings,
    source: &dyn HistorySource,
    day: NaiveDate,
) -> Result<TabularDataset> {
    let mut datasets = Vec::with_capacity(settings.users_details.len());
    for user in &settings.users_details {
        datasets.push(source.fetch_history(user, day, day).await?);
    }
    TabularDataset::concat(datasets, settings.storage.union_mode)
}

/// Dry run: extract for all users and return the combined CSV without touching storage.
pub async fn run_etl_pipeline(config_path: &str, history: bool) -> Result<Vec<u8>> {
    let settings = Settings::new(config_path)?;
    let today = utils::time::today_utc();

    let combined = if history {
        let day = utils::time::days_before(today, settings.history_days_ago)?;
        info!(%day, "Extracting historic weather");
        let source = OpenMeteoArchiveClient::new(&settings.history_api)?;
        extract_history(&settings, &source, day).await?
    } else {
        info!(%today, "Extracting forecasts");
        let source = OpenWeatherMapClient::new(&settings.forecast_api)?;
        extract_forecasts(&settings, &source, today).await?
    };

    combined.to_csv()
}
