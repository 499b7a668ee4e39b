//! Storage, warehouse and orchestration side of the weather pipeline, plus
//! the HTTP trigger API.

pub mod api;
pub mod services;
pub mod storage;
pub mod utils;
pub mod warehouse;

#[cfg(test)]
mod testing;

use common::Result;
use common::config::Settings;
use services::WeatherPipeline;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Loads settings and wires the production pipeline.
pub fn build_pipeline(config_path: &str) -> Result<Arc<WeatherPipeline>> {
    let settings = Arc::new(Settings::new(config_path)?);
    Ok(Arc::new(WeatherPipeline::from_settings(settings)?))
}

/// Serves the trigger API until the process is stopped.
pub async fn serve(pipeline: Arc<WeatherPipeline>, port: u16) -> Result<()> {
    let api_router = api::routes(pipeline);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Weather pipeline API listening");
    axum::serve(listener, api_router).await?;

    Ok(())
}
