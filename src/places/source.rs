//! Provider paths for place lookups.
//!
//! Both paths return the raw provider payload; sanitization happens in the orchestrator.

use crate::error::{UnavailableCause, UpstreamPath};
use crate::places::PlacesQuery;
use crate::timeout::TimeoutElapsed;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use thiserror::Error;

/// Failure of one provider call.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error(transparent)]
    Timeout(#[from] TimeoutElapsed),
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Route-missing signal from the trusted path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status(404))
    }

    pub fn into_cause(self) -> UnavailableCause {
        match self {
            Self::Status(code) => UnavailableCause::Status(code),
            Self::Transport(msg) => UnavailableCause::Transport(msg),
            Self::Timeout(t) => UnavailableCause::Timeout(t.timeout),
            Self::Decode(msg) => UnavailableCause::Decode(msg),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            SourceError::Status(status.as_u16())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

/// One way of asking for nearby places.
#[async_trait]
pub trait PlacesSource: Send + Sync {
    /// Which tier this source represents.
    fn path(&self) -> UpstreamPath;

    /// Issue the query; non-success statuses are errors.
    async fn fetch(&self, query: &PlacesQuery) -> Result<Value, SourceError>;
}

async fn json_body(response: reqwest::Response) -> Result<Value, SourceError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }
    Ok(response.json::<Value>().await?)
}

/// Trusted path: the backend proxy endpoint, which holds the provider key.
#[derive(Debug, Clone)]
pub struct ProxySource {
    client: reqwest::Client,
    endpoint: String,
}

impl ProxySource {
    /// `base_url` is the backend origin, e.g. `http://127.0.0.1:8080`.
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self { client, endpoint: format!("{}/api/places", base_url.trim_end_matches('/')) }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PlacesSource for ProxySource {
    fn path(&self) -> UpstreamPath {
        UpstreamPath::Trusted
    }

    async fn fetch(&self, query: &PlacesQuery) -> Result<Value, SourceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("lat", query.lat.to_string()),
                ("lon", query.lon.to_string()),
                ("radius", query.radius_m.to_string()),
                ("limit", query.limit.to_string()),
            ])
            .send()
            .await?;
        json_body(response).await
    }
}

/// Direct path: the external places provider, authenticated with an API key.
///
/// The backend uses this for its server-to-server call; the scan client uses it as the
/// fallback tier.
#[derive(Clone)]
pub struct ProviderSource {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl std::fmt::Debug for ProviderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSource").field("url", &self.url).finish_non_exhaustive()
    }
}

impl ProviderSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { client, url: url.into(), api_key: api_key.into() }
    }
}

#[async_trait]
impl PlacesSource for ProviderSource {
    fn path(&self) -> UpstreamPath {
        UpstreamPath::Direct
    }

    async fn fetch(&self, query: &PlacesQuery) -> Result<Value, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .query(&[
                ("categories", query.categories.clone()),
                ("filter", query.filter()),
                ("limit", query.limit.to_string()),
                ("apiKey", self.api_key.clone()),
            ])
            .send()
            .await?;
        json_body(response).await
    }
}
