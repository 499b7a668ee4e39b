//! In-process fakes for the source adapters plus a pipeline wired to an
//! in-memory bucket.

use async_trait::async_trait;
use chrono::NaiveDate;
use common::config::{LocationErrorPolicy, Profile, Settings, UnionMode, UserLocation};
use common::dataset::TabularDataset;
use common::schema::{FORECAST_COLUMNS, HISTORY_COLUMNS, SourceKind};
use common::{Error, Result};
use etl::sources::{ForecastSource, HistorySource};
use std::io::Write;
use std::sync::Arc;

use crate::services::WeatherPipeline;
use crate::storage::{BlobGateway, StorageManager};

/// Two forecast rows per location; names in `failing` get a 503.
#[derive(Default)]
pub struct FakeForecast {
    pub failing: Vec<String>,
}

#[async_trait]
impl ForecastSource for FakeForecast {
    async fn fetch_forecast(
        &self,
        location: &UserLocation,
        capture_date: NaiveDate,
    ) -> Result<TabularDataset> {
        if self.failing.contains(&location.name) {
            return Err(Error::Upstream {
                status: 503,
                body: "forecast service unavailable".into(),
            });
        }

        let rows: Vec<Vec<Option<String>>> = (0..2)
            .map(|i| {
                let values = [
                    capture_date.to_string(),
                    (1_714_521_600 + i * 10_800).to_string(),
                    format!("{} {:02}:00:00", capture_date, i * 3),
                    location.name.clone(),
                    "Clear".into(),
                    "0".into(),
                    "14.2".into(),
                    "12.0".into(),
                    "15.1".into(),
                    "70".into(),
                    "Clear".into(),
                    "clear sky".into(),
                ];
                values.into_iter().map(Some).collect()
            })
            .collect();

        Ok(TabularDataset::from_rows(FORECAST_COLUMNS, rows)?.with_source(SourceKind::Forecast))
    }
}

/// One history row per location per requested day.
#[derive(Default)]
pub struct FakeHistory;

#[async_trait]
impl HistorySource for FakeHistory {
    async fn fetch_history(
        &self,
        location: &UserLocation,
        start_date: NaiveDate,
        _end_date: NaiveDate,
    ) -> Result<TabularDataset> {
        let row = vec![
            Some(start_date.to_string()),
            Some(format!("{} 00:00:00", start_date)),
            Some("9.5".into()),
            Some("81".into()),
            Some(location.name.clone()),
        ];
        Ok(TabularDataset::from_rows(HISTORY_COLUMNS, vec![row])?.with_source(SourceKind::History))
    }
}

pub fn settings_for(users: &[&str], policy: LocationErrorPolicy) -> Settings {
    let mut body = String::from(
        "bucket_name: rainday-test\n\
         forecast_csvpath: forecast/daily\n\
         forecast_individual_csvpath: forecast/individual\n\
         forecast_unioned_csvpath: forecast/unioned\n\
         wthr_historic_csvpath: history/daily/historic_weather\n\
         wthr_historic_unioned_csvpath: history/unioned/all_historic_weather\n\
         users_details:\n",
    );
    for (i, name) in users.iter().enumerate() {
        body.push_str(&format!("  - name: {}\n    lat: {}.0\n    lon: {}.0\n", name, i, i + 1));
    }
    let policy = match policy {
        LocationErrorPolicy::Abort => "abort",
        LocationErrorPolicy::Skip => "skip",
    };
    body.push_str(&format!("pipeline:\n  on_location_error: {}\n", policy));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(body.as_bytes())
        .unwrap();
    Settings::load(path.to_str().unwrap(), Profile::Local).unwrap()
}

pub fn pipeline_with(
    users: &[&str],
    forecast: FakeForecast,
    history: FakeHistory,
    policy: LocationErrorPolicy,
) -> WeatherPipeline {
    let settings = settings_for(users, policy);
    let blobs = BlobGateway::new(Arc::new(StorageManager::in_memory()), UnionMode::Strict, false);
    WeatherPipeline::new(
        Arc::new(settings),
        blobs,
        Arc::new(forecast),
        Arc::new(history),
        None,
    )
}
