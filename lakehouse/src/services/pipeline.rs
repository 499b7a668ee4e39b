use chrono::NaiveDate;
use common::config::{LocationErrorPolicy, Settings, UserLocation};
use common::dataset::TabularDataset;
use common::schema::SourceKind;
use common::{Error, Result};
use etl::sources::{ForecastSource, HistorySource, OpenMeteoArchiveClient, OpenWeatherMapClient};
use etl::utils::time::{days_before, today_utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::storage::{BlobGateway, StorageManager};
use crate::utils::PathBuilder;
use crate::warehouse::{BigQueryWarehouse, LoadResult, TableRef, TokenProvider, WarehouseGateway};

const LOAD_RETRY_BASE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Serialize)]
pub struct LocationFailure {
    pub name: String,
    pub error: String,
}

/// What one entry point did, per location and overall.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub messages: Vec<String>,
    pub succeeded: Vec<String>,
    pub failed: Vec<LocationFailure>,
}

impl RunSummary {
    fn record_failure(&mut self, name: &str, err: &Error) {
        self.failed.push(LocationFailure {
            name: name.to_string(),
            error: err.to_string(),
        });
    }

    /// Human-readable completion message.
    pub fn message(&self) -> String {
        let mut message = self.messages.join("\n");
        if !self.failed.is_empty() {
            let names: Vec<&str> = self.failed.iter().map(|f| f.name.as_str()).collect();
            message.push_str(&format!("\nSkipped locations: {}", names.join(", ")));
        }
        message
    }
}

/// Drives the per-location fetch/write loop and the union and load steps.
pub struct WeatherPipeline {
    settings: Arc<Settings>,
    blobs: BlobGateway,
    forecast: Arc<dyn ForecastSource>,
    history: Arc<dyn HistorySource>,
    warehouse: Option<WarehouseGateway>,
}

impl WeatherPipeline {
    pub fn new(
        settings: Arc<Settings>,
        blobs: BlobGateway,
        forecast: Arc<dyn ForecastSource>,
        history: Arc<dyn HistorySource>,
        warehouse: Option<WarehouseGateway>,
    ) -> Self {
        Self {
            settings,
            blobs,
            forecast,
            history,
            warehouse,
        }
    }

    /// Wires the real API clients, storage backend and warehouse from settings.
    pub fn from_settings(settings: Arc<Settings>) -> Result<Self> {
        let manager = Arc::new(StorageManager::new(&settings));
        let blobs = BlobGateway::new(
            manager,
            settings.storage.union_mode,
            settings.storage.conditional_writes,
        );

        let forecast = OpenWeatherMapClient::new(&settings.forecast_api)?
            .with_response_log(settings.responses_folder());
        let history = OpenMeteoArchiveClient::new(&settings.history_api)?;

        let warehouse = if settings.warehouse.project.trim().is_empty() {
            None
        } else {
            let tokens = TokenProvider::from_settings(&settings)?;
            let client = BigQueryWarehouse::new(&settings.warehouse, tokens)?;
            Some(WarehouseGateway::new(
                Arc::new(client),
                Duration::from_millis(settings.warehouse.poll_interval_ms),
                &settings.warehouse.write_disposition,
            ))
        };

        Ok(Self::new(
            settings,
            blobs,
            Arc::new(forecast),
            Arc::new(history),
            warehouse,
        ))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn paths(&self) -> PathBuilder<'_> {
        PathBuilder::new(&self.settings)
    }

    fn bucket(&self) -> &str {
        &self.settings.bucket_name
    }

    /// Fetches today's forecast for every user, writes the per-user and the
    /// combined daily file, then rebuilds the unioned forecast history.
    pub async fn run_forecast_and_union(&self) -> Result<RunSummary> {
        self.run_forecast_and_union_on(today_utc()).await
    }

    pub async fn run_forecast_and_union_on(&self, today: NaiveDate) -> Result<RunSummary> {
        let mut summary = self.get_weather_forecast_and_write(today).await?;
        let union_message = self.union_and_write(SourceKind::Forecast).await?;
        summary.messages.push(union_message);
        Ok(summary)
    }

    pub async fn get_weather_forecast_and_write(&self, today: NaiveDate) -> Result<RunSummary> {
        let paths = &self.paths();
        let (datasets, mut summary) = self
            .for_each_location(|user| async move {
                let dataset = self.forecast.fetch_forecast(user, today).await?;
                self.blobs
                    .write(&dataset, self.bucket(), &paths.individual_forecast(&user.name))
                    .await?;
                Ok(dataset)
            })
            .await?;

        let combined = TabularDataset::concat(datasets, self.settings.storage.union_mode)?;
        let outcome = self
            .blobs
            .write(&combined, self.bucket(), &paths.combined_forecast(today))
            .await?;
        summary.messages.push(outcome.message());
        Ok(summary)
    }

    /// Fetches the configured days-ago snapshot for every user and writes it
    /// as one dated CSV.
    pub async fn fetch_historic_weather(&self) -> Result<RunSummary> {
        let day = days_before(today_utc(), self.settings.history_days_ago)?;
        self.fetch_historic_weather_for(day).await
    }

    pub async fn fetch_historic_weather_for(&self, day: NaiveDate) -> Result<RunSummary> {
        info!(%day, "Fetching historic weather");
        let (datasets, mut summary) = self
            .for_each_location(|user| async move { self.history.fetch_history(user, day, day).await })
            .await?;

        let combined = TabularDataset::concat(datasets, self.settings.storage.union_mode)?;
        let outcome = self
            .blobs
            .write(&combined, self.bucket(), &self.paths().daily_history(day))
            .await?;
        summary.messages.push(outcome.message());
        Ok(summary)
    }

    /// Unions every daily history snapshot into the cumulative history file.
    pub async fn transform_historic_weather(&self) -> Result<RunSummary> {
        let message = self.union_and_write(SourceKind::History).await?;
        Ok(RunSummary {
            messages: vec![message],
            ..RunSummary::default()
        })
    }

    async fn union_and_write(&self, kind: SourceKind) -> Result<String> {
        let paths = self.paths();
        let prefix = paths.union_prefix(kind);

        let blobs = self.blobs.list(self.bucket()).await?;
        let unioned = self
            .blobs
            .union_csv_blobs(&blobs, &prefix)
            .await?
            .conform_to(kind, self.settings.storage.union_mode)?;
        let outcome = self
            .blobs
            .write(&unioned, self.bucket(), &paths.unioned(kind))
            .await?;

        info!(%kind, rows = outcome.rows, path = %outcome.path, "Rebuilt unioned file");
        Ok(outcome.message())
    }

    /// Bulk-loads the unioned file for `kind` into its warehouse table,
    /// retrying transient failures a bounded number of times.
    pub async fn load_to_warehouse(&self, kind: SourceKind) -> Result<LoadResult> {
        let gateway = self.warehouse.as_ref().ok_or_else(|| {
            Error::InvalidInput("warehouse.project is not configured".to_string())
        })?;

        let config = &self.settings.warehouse;
        let table_name = match kind {
            SourceKind::Forecast => &config.forecast_table,
            SourceKind::History => &config.history_table,
        };
        let table = TableRef::new(&config.project, &config.dataset, table_name);
        let paths = self.paths();
        let source_uri = paths.gcs_uri(&paths.unioned(kind));
        let timeout = Duration::from_secs(config.load_timeout_secs);

        gateway
            .ensure_table_and_load_with_retry(
                &table,
                &source_uri,
                kind.fallback_table_schema(),
                timeout,
                config.load_retries,
                LOAD_RETRY_BASE_DELAY_MS,
            )
            .await
    }

    pub async fn download_folder(&self, folder_prefix: &str, destination: &Path) -> Result<Vec<PathBuf>> {
        self.blobs
            .download_folder(self.bucket(), folder_prefix, destination)
            .await
    }

    /// Runs `step` for each configured user in order, applying the
    /// configured per-location error policy.
    async fn for_each_location<'a, F, Fut>(&'a self, step: F) -> Result<(Vec<TabularDataset>, RunSummary)>
    where
        F: Fn(&'a UserLocation) -> Fut,
        Fut: std::future::Future<Output = Result<TabularDataset>>,
    {
        let users = &self.settings.users_details;
        if users.is_empty() {
            return Err(Error::InvalidInput("users_details is empty".to_string()));
        }

        let policy = self.settings.pipeline.on_location_error;
        let mut datasets = Vec::with_capacity(users.len());
        let mut summary = RunSummary::default();
        let mut last_error = None;

        for user in users {
            match step(user).await {
                Ok(dataset) => {
                    info!(user = %user.name, rows = dataset.num_rows(), "Location done");
                    summary.succeeded.push(user.name.clone());
                    datasets.push(dataset);
                }
                Err(e) if policy == LocationErrorPolicy::Skip => {
                    warn!(user = %user.name, error = %e, "Skipping failed location");
                    summary.record_failure(&user.name, &e);
                    last_error = Some(e);
                }
                Err(e) => {
                    error!(user = %user.name, error = %e, "Location failed, aborting run");
                    return Err(e);
                }
            }
        }

        match last_error {
            Some(e) if datasets.is_empty() => Err(e),
            _ => Ok((datasets, summary)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeForecast, FakeHistory, pipeline_with};
    use common::config::LocationErrorPolicy;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[tokio::test]
    async fn test_forecast_run_writes_individual_combined_and_unioned() {
        let pipeline = pipeline_with(&["A", "B"], FakeForecast::default(), FakeHistory::default(), LocationErrorPolicy::Abort);

        let summary = pipeline.run_forecast_and_union_on(day()).await.unwrap();
        assert_eq!(summary.succeeded, vec!["A", "B"]);
        assert!(summary.message().contains("all_historic_forecasts.csv"));

        let names: Vec<String> = pipeline
            .blobs
            .list(pipeline.bucket())
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert!(names.contains(&"forecast/individual/5-day forecast_A.csv".to_string()));
        assert!(names.contains(&"forecast/individual/5-day forecast_B.csv".to_string()));
        assert!(names.contains(&"forecast/daily/5-day forecast_2024-05-01.csv".to_string()));
        assert!(names.contains(&"forecast/unioned/all_historic_forecasts.csv".to_string()));

        // Individual files sit outside the daily prefix; the unioned file
        // holds the single combined daily file, 2 rows per user.
        let blobs = pipeline.blobs.list(pipeline.bucket()).await.unwrap();
        let unioned = pipeline
            .blobs
            .union_csv_blobs(&blobs, "forecast/unioned/")
            .await
            .unwrap();
        assert_eq!(unioned.num_rows(), 4);
        assert_eq!(unioned.column_names(), SourceKind::Forecast.columns().to_vec());
    }

    #[tokio::test]
    async fn test_abort_policy_stops_at_first_failure() {
        let forecast = FakeForecast {
            failing: vec!["A".to_string()],
            ..FakeForecast::default()
        };
        let pipeline = pipeline_with(&["A", "B"], forecast, FakeHistory::default(), LocationErrorPolicy::Abort);

        let result = pipeline.get_weather_forecast_and_write(day()).await;
        assert!(matches!(result, Err(Error::Upstream { status: 503, .. })));
        assert!(pipeline.blobs.list(pipeline.bucket()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skip_policy_keeps_healthy_locations() {
        let forecast = FakeForecast {
            failing: vec!["A".to_string()],
            ..FakeForecast::default()
        };
        let pipeline = pipeline_with(&["A", "B"], forecast, FakeHistory::default(), LocationErrorPolicy::Skip);

        let summary = pipeline.get_weather_forecast_and_write(day()).await.unwrap();
        assert_eq!(summary.succeeded, vec!["B"]);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.message().contains("Skipped locations: A"));
    }

    #[tokio::test]
    async fn test_skip_policy_fails_when_every_location_fails() {
        let forecast = FakeForecast {
            failing: vec!["A".to_string(), "B".to_string()],
            ..FakeForecast::default()
        };
        let pipeline = pipeline_with(&["A", "B"], forecast, FakeHistory::default(), LocationErrorPolicy::Skip);

        assert!(pipeline.get_weather_forecast_and_write(day()).await.is_err());
    }

    #[tokio::test]
    async fn test_history_fetch_then_transform() {
        let pipeline = pipeline_with(&["A", "B"], FakeForecast::default(), FakeHistory::default(), LocationErrorPolicy::Abort);

        pipeline.fetch_historic_weather_for(day()).await.unwrap();
        pipeline
            .fetch_historic_weather_for(day().pred_opt().unwrap())
            .await
            .unwrap();
        let summary = pipeline.transform_historic_weather().await.unwrap();
        assert!(summary.message().contains("history/unioned/all_historic_weather.csv"));

        let content = pipeline
            .blobs
            .manager()
            .bucket(pipeline.bucket())
            .unwrap()
            .get_object("history/unioned/all_historic_weather.csv")
            .await
            .unwrap();
        let unioned = TabularDataset::from_csv(&content).unwrap();
        // Two days, two users, one row each.
        assert_eq!(unioned.num_rows(), 4);
        assert_eq!(unioned.column_names(), SourceKind::History.columns().to_vec());
    }

    #[tokio::test]
    async fn test_transform_rejects_snapshot_with_foreign_columns() {
        let pipeline = pipeline_with(&["A"], FakeForecast::default(), FakeHistory::default(), LocationErrorPolicy::Abort);
        pipeline
            .blobs
            .manager()
            .bucket(pipeline.bucket())
            .unwrap()
            .put_object(
                "history/daily/historic_weather_2024-05-01.csv",
                bytes::Bytes::from_static(b"name,temp,rain_category\nA,9.5,0\n"),
                "text/csv",
                crate::storage::WriteCondition::Overwrite,
            )
            .await
            .unwrap();

        assert!(matches!(
            pipeline.transform_historic_weather().await,
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_transform_without_snapshots_is_empty_union() {
        let pipeline = pipeline_with(&["A"], FakeForecast::default(), FakeHistory::default(), LocationErrorPolicy::Abort);
        assert!(matches!(
            pipeline.transform_historic_weather().await,
            Err(Error::EmptyUnion { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_requires_warehouse_project() {
        let pipeline = pipeline_with(&["A"], FakeForecast::default(), FakeHistory::default(), LocationErrorPolicy::Abort);
        assert!(matches!(
            pipeline.load_to_warehouse(SourceKind::Forecast).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
