pub mod pipeline;
pub use pipeline::{RunSummary, WeatherPipeline};

use axum::{
    response::IntoResponse,
    http::StatusCode,
    Json
};
use crate::api::models::ApiResponse;
use tracing::error;

pub struct AppError(pub common::Error);

impl AppError {
    pub fn bad_request(message: String) -> Self {
        AppError(common::Error::InvalidInput(message))
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            common::Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            common::Error::NotFound(_) => StatusCode::NOT_FOUND,
            common::Error::Conflict(_) => StatusCode::CONFLICT,
            common::Error::EmptyUnion { .. } | common::Error::SchemaMismatch(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            common::Error::Upstream { .. } | common::Error::Http(_) => StatusCode::BAD_GATEWAY,
            common::Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();
        error!(status = %status_code, error = %self.0, "Request failed");

        let body = Json(ApiResponse::<()>::error(self.0.to_string()));
        (status_code, body).into_response()
    }
}

impl From<common::Error> for AppError {
    fn from(err: common::Error) -> Self {
        AppError(err)
    }
}
