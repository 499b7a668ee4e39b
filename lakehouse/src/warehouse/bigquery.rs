use async_trait::async_trait;
use common::config::WarehouseSettings;
use common::schema::TableSchema;
use common::{Error, Result};
use etl::sources::{check_status, http_client};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{JobHandle, JobState, LoadRequest, TableRef, TokenProvider, Warehouse};

/// BigQuery over its v2 REST API.
pub struct BigQueryWarehouse {
    client: reqwest::Client,
    base_url: String,
    location: Option<String>,
    tokens: TokenProvider,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    #[serde(default)]
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    /// int64 values are encoded as JSON strings.
    #[serde(default)]
    output_rows: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReferenceBody<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
    table_id: &'a str,
}

impl BigQueryWarehouse {
    pub fn new(config: &WarehouseSettings, tokens: TokenProvider) -> Result<Self> {
        Ok(Self {
            client: http_client(config.load_timeout_secs.max(30))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            location: config.location.clone(),
            tokens,
        })
    }

    fn table_url(&self, table: &TableRef) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}",
            self.base_url, table.project, table.dataset, table.table
        )
    }

    fn jobs_url(&self, project: &str) -> String {
        format!("{}/bigquery/v2/projects/{}/jobs", self.base_url, project)
    }

    fn table_reference(table: &TableRef) -> TableReferenceBody<'_> {
        TableReferenceBody {
            project_id: &table.project,
            dataset_id: &table.dataset,
            table_id: &table.table,
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let request = self.tokens.authorize(self.client.get(self.table_url(table))).await?;
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }

    async fn create_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()> {
        let url = format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables",
            self.base_url, table.project, table.dataset
        );
        let body = json!({
            "tableReference": Self::table_reference(table),
            "schema": schema,
        });

        let request = self.tokens.authorize(self.client.post(url).json(&body)).await?;
        let response = request.send().await?;
        if response.status() == StatusCode::CONFLICT {
            warn!(%table, "Table appeared while creating it, continuing with the existing one");
            return Ok(());
        }
        check_status(response).await?;
        debug!(%table, "Created table");
        Ok(())
    }

    async fn start_load(&self, request: &LoadRequest) -> Result<JobHandle> {
        let mut job_reference = json!({
            "projectId": request.table.project,
            "jobId": request.job_id,
        });
        if let Some(location) = &self.location {
            job_reference["location"] = json!(location);
        }

        let body = json!({
            "jobReference": job_reference,
            "configuration": {
                "load": {
                    "sourceUris": [request.source_uri],
                    "destinationTable": Self::table_reference(&request.table),
                    "schema": request.schema,
                    "sourceFormat": "CSV",
                    "skipLeadingRows": request.skip_leading_rows,
                    "autodetect": false,
                    "writeDisposition": request.write_disposition,
                    "createDisposition": "CREATE_NEVER",
                }
            }
        });

        let http_request = self
            .tokens
            .authorize(self.client.post(self.jobs_url(&request.table.project)).json(&body))
            .await?;
        let response = http_request.send().await?;
        if response.status() == StatusCode::CONFLICT {
            warn!(job_id = %request.job_id, "Load job already submitted, resuming it");
            return Ok(JobHandle {
                project: request.table.project.clone(),
                job_id: request.job_id.clone(),
                location: self.location.clone(),
            });
        }
        let job: JobResource = check_status(response).await?.json().await?;

        Ok(JobHandle {
            project: job.job_reference.project_id,
            job_id: job.job_reference.job_id,
            location: job.job_reference.location.or_else(|| self.location.clone()),
        })
    }

    async fn job_state(&self, job: &JobHandle) -> Result<JobState> {
        let url = format!("{}/{}", self.jobs_url(&job.project), job.job_id);
        let mut request = self.client.get(url);
        if let Some(location) = &job.location {
            request = request.query(&[("location", location)]);
        }
        let request = self.tokens.authorize(request).await?;
        let resource: JobResource = check_status(request.send().await?).await?.json().await?;

        let status = resource
            .status
            .ok_or_else(|| Error::Warehouse(format!("job {} has no status", job.job_id)))?;

        Ok(match status.state.as_str() {
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "DONE" => JobState::Done {
                error: status.error_result.map(|e| {
                    e.message
                        .or(e.reason)
                        .unwrap_or_else(|| "unknown error".to_string())
                }),
                output_rows: resource
                    .statistics
                    .and_then(|s| s.load)
                    .and_then(|l| l.output_rows)
                    .and_then(|rows| rows.parse().ok()),
            },
            other => {
                return Err(Error::Warehouse(format!(
                    "job {} reported unknown state '{}'",
                    job.job_id, other
                )));
            }
        })
    }
}
