use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use common::schema::SourceKind;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::models::{ApiResponse, HealthResponse, LoadResponse, RunResponse};
use crate::services::{AppError, WeatherPipeline};

type RunResult = Result<Json<ApiResponse<RunResponse>>, AppError>;

pub async fn run_forecast_and_union(State(pipeline): State<Arc<WeatherPipeline>>) -> RunResult {
    let summary = pipeline.run_forecast_and_union().await?;
    Ok(Json(ApiResponse::success(summary.into())))
}

pub async fn fetch_historic_weather(State(pipeline): State<Arc<WeatherPipeline>>) -> RunResult {
    let summary = pipeline.fetch_historic_weather().await?;
    Ok(Json(ApiResponse::success(summary.into())))
}

pub async fn transform_historic_weather(State(pipeline): State<Arc<WeatherPipeline>>) -> RunResult {
    let summary = pipeline.transform_historic_weather().await?;
    Ok(Json(ApiResponse::success(summary.into())))
}

pub async fn load_to_warehouse(
    Path(kind): Path<String>,
    State(pipeline): State<Arc<WeatherPipeline>>,
) -> Result<Json<ApiResponse<LoadResponse>>, AppError> {
    let kind: SourceKind = kind.parse()?;
    let result = pipeline.load_to_warehouse(kind).await?;
    Ok(Json(ApiResponse::success(result.into())))
}

pub async fn health(State(pipeline): State<Arc<WeatherPipeline>>) -> Json<ApiResponse<HealthResponse>> {
    let settings = pipeline.settings();
    Json(ApiResponse::success(HealthResponse {
        status: "ok",
        bucket: settings.bucket_name.clone(),
        users: settings.users_details.len(),
    }))
}

// Trigger endpoints plus health
pub fn routes(pipeline: Arc<WeatherPipeline>) -> Router {
    Router::new()
        .route("/forecast", post(run_forecast_and_union))
        .route("/history/fetch", post(fetch_historic_weather))
        .route("/history/transform", post(transform_historic_weather))
        .route("/warehouse/load/{kind}", post(load_to_warehouse))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}
