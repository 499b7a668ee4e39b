pub mod auth;
pub mod bigquery;

pub use auth::TokenProvider;
pub use bigquery::BigQueryWarehouse;

use async_trait::async_trait;
use common::schema::TableSchema;
use common::{Error, Result};
use etl::utils::retry::retry_with_backoff_if;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

static TABLE_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<project>[a-zA-Z0-9_-]+)\.(?P<dataset>[a-zA-Z0-9_]+)\.(?P<table>[a-zA-Z0-9_$-]+)$")
        .expect("Invalid table id regex")
});

/// Fully qualified `project.dataset.table` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(project: &str, dataset: &str, table: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        }
    }
}

impl FromStr for TableRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TABLE_ID_REGEX
            .captures(s.trim())
            .map(|caps| TableRef::new(&caps["project"], &caps["dataset"], &caps["table"]))
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Table id '{}' is not of the form project.dataset.table",
                    s
                ))
            })
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// A CSV load from object storage into an existing table. Column types come
/// from `schema`, never from inference. `job_id` is chosen by the caller so a
/// resubmission of the same load is recognised by the warehouse.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub job_id: String,
    pub table: TableRef,
    pub source_uri: String,
    pub schema: TableSchema,
    pub skip_leading_rows: u32,
    pub write_disposition: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub project: String,
    pub job_id: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done {
        error: Option<String>,
        output_rows: Option<u64>,
    },
}

/// Table management and asynchronous load jobs against a columnar warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn table_exists(&self, table: &TableRef) -> Result<bool>;

    async fn create_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()>;

    /// Submits the load. Submitting a `job_id` the warehouse already knows
    /// returns the handle of that job instead of starting another one.
    async fn start_load(&self, request: &LoadRequest) -> Result<JobHandle>;

    async fn job_state(&self, job: &JobHandle) -> Result<JobState>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadResult {
    pub table: String,
    pub job_id: String,
    pub created_table: bool,
    pub output_rows: Option<u64>,
}

impl LoadResult {
    pub fn message(&self) -> String {
        format!("Data loaded into table {}", self.table)
    }
}

/// Progress of one logical load, kept across retry attempts.
struct PendingLoad {
    request: LoadRequest,
    created_table: Option<bool>,
    job: Option<JobHandle>,
}

#[derive(Clone)]
pub struct WarehouseGateway {
    warehouse: Arc<dyn Warehouse>,
    poll_interval: Duration,
    write_disposition: String,
}

impl WarehouseGateway {
    pub fn new(warehouse: Arc<dyn Warehouse>, poll_interval: Duration, write_disposition: &str) -> Self {
        Self {
            warehouse,
            poll_interval,
            write_disposition: write_disposition.to_string(),
        }
    }

    /// Creates `table` from `fallback_schema` when it does not exist, then
    /// appends the CSV at `source_uri` (header row skipped) and waits for the
    /// load to finish. The fallback schema is never applied to an existing table.
    pub async fn ensure_table_and_load(
        &self,
        table: &TableRef,
        source_uri: &str,
        fallback_schema: &TableSchema,
        timeout: Duration,
    ) -> Result<LoadResult> {
        let mut load = self.prepare_load(table, source_uri, fallback_schema);
        self.drive_load(&mut load, timeout).await
    }

    /// Same as [`Self::ensure_table_and_load`], retrying transient failures.
    /// Every attempt belongs to one load job: once submitted, later attempts
    /// resume waiting on it rather than appending the file again.
    pub async fn ensure_table_and_load_with_retry(
        &self,
        table: &TableRef,
        source_uri: &str,
        fallback_schema: &TableSchema,
        timeout: Duration,
        retries: u32,
        base_delay_ms: u64,
    ) -> Result<LoadResult> {
        let load = Mutex::new(self.prepare_load(table, source_uri, fallback_schema));
        retry_with_backoff_if(retries, base_delay_ms, Error::is_transient, || async {
            let mut load = load.lock().await;
            self.drive_load(&mut load, timeout).await
        })
        .await
    }

    fn prepare_load(&self, table: &TableRef, source_uri: &str, fallback_schema: &TableSchema) -> PendingLoad {
        PendingLoad {
            request: LoadRequest {
                job_id: format!("weather_load_{}", uuid::Uuid::new_v4().simple()),
                table: table.clone(),
                source_uri: source_uri.to_string(),
                schema: fallback_schema.clone(),
                skip_leading_rows: 1,
                write_disposition: self.write_disposition.clone(),
            },
            created_table: None,
            job: None,
        }
    }

    async fn drive_load(&self, load: &mut PendingLoad, timeout: Duration) -> Result<LoadResult> {
        let table = &load.request.table;

        let created_table = match load.created_table {
            Some(created) => created,
            None => {
                let created = if self.warehouse.table_exists(table).await? {
                    debug!(%table, "Table exists");
                    false
                } else {
                    info!(%table, "Table not found, creating with fallback schema");
                    self.warehouse.create_table(table, &load.request.schema).await?;
                    true
                };
                load.created_table = Some(created);
                created
            }
        };

        let job = if let Some(job) = load.job.clone() {
            info!(%table, job_id = %job.job_id, "Resuming wait on submitted load job");
            job
        } else {
            let job = self.warehouse.start_load(&load.request).await?;
            info!(%table, job_id = %job.job_id, source_uri = %load.request.source_uri, "Started load job");
            load.job = Some(job.clone());
            job
        };

        let output_rows = tokio::time::timeout(timeout, self.wait_for_job(&job))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "load job {} into {} did not finish within {:?}",
                    job.job_id, table, timeout
                ))
            })??;

        info!(%table, job_id = %job.job_id, ?output_rows, "Load job finished");
        Ok(LoadResult {
            table: table.to_string(),
            job_id: job.job_id,
            created_table,
            output_rows,
        })
    }

    async fn wait_for_job(&self, job: &JobHandle) -> Result<Option<u64>> {
        loop {
            match self.warehouse.job_state(job).await? {
                JobState::Done { error: None, output_rows } => return Ok(output_rows),
                JobState::Done { error: Some(reason), .. } => {
                    return Err(Error::LoadJobFailed {
                        job_id: job.job_id.clone(),
                        reason,
                    });
                }
                state => {
                    debug!(job_id = %job.job_id, ?state, "Waiting for load job");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}
