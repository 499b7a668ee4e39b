use serde::Serialize;

use crate::services::RunSummary;
use crate::services::pipeline::LocationFailure;
use crate::warehouse::LoadResult;

// Envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub message: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<LocationFailure>,
}

impl From<RunSummary> for RunResponse {
    fn from(summary: RunSummary) -> Self {
        Self {
            message: summary.message(),
            succeeded: summary.succeeded,
            failed: summary.failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub message: String,
    #[serde(flatten)]
    pub result: LoadResult,
}

impl From<LoadResult> for LoadResponse {
    fn from(result: LoadResult) -> Self {
        Self {
            message: result.message(),
            result,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub bucket: String,
    pub users: usize,
}
