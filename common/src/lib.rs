use arrow::error::ArrowError;
use thiserror::Error;

pub mod config;
pub mod dataset;
pub mod schema;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(std::string::FromUtf8Error),

    #[error("Upstream API error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Write precondition failed for {0}: object changed since it was read")]
    Conflict(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("No CSV blobs matched prefix '{prefix}'")]
    EmptyUnion { prefix: String },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("Load job {job_id} failed: {reason}")]
    LoadJobFailed { job_id: String, reason: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transport-level failures that may succeed on re-invocation.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Upstream { status, .. } => *status == 429 || *status >= 500,
            Error::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => Error::NotFound(path),
            object_store::Error::Precondition { path, .. }
            | object_store::Error::AlreadyExists { path, .. } => Error::Conflict(path),
            other => Error::Storage(other.to_string()),
        }
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Utf8(err)
    }
}
