use async_trait::async_trait;
use chrono::NaiveDate;
use common::config::{HistoryApiConfig, UserLocation};
use common::dataset::TabularDataset;
use common::Result;
use tracing::info;

use super::{HistorySource, check_status, http_client};
use crate::models::{ArchiveResponse, HISTORY_VARIABLES, HourlyBlock};

/// Open-Meteo historical archive adapter.
pub struct OpenMeteoArchiveClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoArchiveClient {
    pub fn new(config: &HistoryApiConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HistorySource for OpenMeteoArchiveClient {
    async fn fetch_history(
        &self,
        location: &UserLocation,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<TabularDataset> {
        let url = format!("{}/v1/archive", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", location.lat.to_string()),
                ("longitude", location.lon.to_string()),
                ("start_date", start_date.format("%Y-%m-%d").to_string()),
                ("end_date", end_date.format("%Y-%m-%d").to_string()),
                ("hourly", HISTORY_VARIABLES.join(",")),
                ("timeformat", "unixtime".to_string()),
            ])
            .send()
            .await?;
        let archive: ArchiveResponse = check_status(response).await?.json().await?;

        let block = HourlyBlock::from_archive(&archive.hourly)?;
        let rows = block.into_daily_rows(&location.name)?;
        info!(
            user = %location.name,
            start = %start_date,
            end = %end_date,
            rows = rows.len(),
            "Fetched historic weather"
        );

        TabularDataset::from_records(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use common::schema::SourceKind;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    async fn archive_handler(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        assert_eq!(params.get("start_date").map(String::as_str), Some("2024-01-01"));
        assert_eq!(params.get("timeformat").map(String::as_str), Some("unixtime"));

        let start = 1_704_067_200i64;
        let time: Vec<i64> = (0..24).map(|h| start + h * 3600).collect();
        let mut hourly = json!({ "time": time });
        for name in HISTORY_VARIABLES {
            hourly[*name] = json!((0..24).map(|h| h as f64).collect::<Vec<_>>());
        }
        Json(json!({ "latitude": 1.0, "longitude": 2.0, "hourly": hourly }))
    }

    #[tokio::test]
    async fn test_fetch_history_reshapes_to_three_hour_rows() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let router = Router::new().route("/v1/archive", get(archive_handler));
            axum::serve(listener, router).await.unwrap();
        });

        let client = OpenMeteoArchiveClient::new(&HistoryApiConfig {
            base_url: format!("http://{}", addr),
            ..Default::default()
        })
        .unwrap();
        let location = UserLocation {
            name: "B".into(),
            lat: 3.0,
            lon: 4.0,
            display_region: String::new(),
        };
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let dataset = client.fetch_history(&location, day, day).await.unwrap();

        dataset.validate_columns(SourceKind::History.columns()).unwrap();
        assert_eq!(dataset.num_rows(), 8);
        assert_eq!(
            dataset.column_values("temp").unwrap()[..3],
            [Some("0".to_string()), Some("3".to_string()), Some("6".to_string())]
        );
        assert!(
            dataset
                .column_values("name")
                .unwrap()
                .iter()
                .all(|n| n.as_deref() == Some("B"))
        );
    }
}
