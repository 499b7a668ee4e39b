use common::config::{Profile, Settings};
use common::Result;
use etl::sources::check_status;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Where warehouse requests get their bearer token from.
#[derive(Clone)]
pub enum TokenProvider {
    Static(String),
    /// Default service account of the VM or serverless runtime.
    MetadataServer { client: reqwest::Client, url: String },
    Anonymous,
}

impl TokenProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        if let Some(token) = &settings.warehouse.access_token {
            return Ok(TokenProvider::Static(token.clone()));
        }
        match settings.profile {
            Profile::Cloud => Ok(TokenProvider::MetadataServer {
                client: reqwest::Client::builder()
                    .timeout(Duration::from_secs(5))
                    .build()?,
                url: METADATA_TOKEN_URL.to_string(),
            }),
            Profile::Local => Ok(TokenProvider::Anonymous),
        }
    }

    pub async fn bearer(&self) -> Result<Option<String>> {
        match self {
            TokenProvider::Static(token) => Ok(Some(token.clone())),
            TokenProvider::MetadataServer { client, url } => {
                let response = client
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                let token: MetadataToken = check_status(response).await?.json().await?;
                debug!("Fetched access token from metadata server");
                Ok(Some(token.access_token))
            }
            TokenProvider::Anonymous => Ok(None),
        }
    }

    pub async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match self.bearer().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenProvider::Static(_) => f.write_str("Static(***)"),
            TokenProvider::MetadataServer { url, .. } => write!(f, "MetadataServer({})", url),
            TokenProvider::Anonymous => f.write_str("Anonymous"),
        }
    }
}

impl From<&str> for TokenProvider {
    fn from(token: &str) -> Self {
        if token.is_empty() {
            TokenProvider::Anonymous
        } else {
            TokenProvider::Static(token.to_string())
        }
    }
}
