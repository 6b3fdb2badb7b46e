//! Two-tier nearby-places fetch.
//!
//! Semantics:
//! - The trusted path is always tried first.
//! - A trusted-path 404 means "no backend deployed here"; it is logged at info and the
//!   direct path is tried once.
//! - Any other trusted-path status is a hard failure. Re-sending a provider or
//!   application error down another path could double-spend quota or hide an outage.
//! - Transport failures, timeouts, and undecodable bodies on the trusted path fall back
//!   to the direct path once.
//! - The direct path is never retried, and its failure is propagated, so "zero places"
//!   and "could not reach the service" stay distinct.
//!
//! Every call is bounded by the fetcher's [`TimeoutPolicy`].

use crate::config::{Config, ConfigError};
use crate::error::{LocusError, UpstreamPath};
use crate::places::source::{PlacesSource, ProviderSource, ProxySource, SourceError};
use crate::places::{sanitize, FeatureCollection, PlacesQuery, DEFAULT_CATEGORIES, DEFAULT_LIMIT};
use crate::timeout::TimeoutPolicy;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Orchestrates the trusted path, the direct fallback, and sanitization.
#[derive(Clone)]
pub struct PlacesFetcher {
    trusted: Arc<dyn PlacesSource>,
    direct: Arc<dyn PlacesSource>,
    timeout: TimeoutPolicy,
    limit: u32,
    categories: String,
}

impl std::fmt::Debug for PlacesFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacesFetcher")
            .field("timeout", &self.timeout)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl PlacesFetcher {
    pub fn new<T, D>(trusted: T, direct: D, timeout: TimeoutPolicy) -> Self
    where
        T: PlacesSource + 'static,
        D: PlacesSource + 'static,
    {
        Self {
            trusted: Arc::new(trusted),
            direct: Arc::new(direct),
            timeout,
            limit: DEFAULT_LIMIT,
            categories: DEFAULT_CATEGORIES.to_string(),
        }
    }

    /// Trusted path at `backend.base_url`, direct path at `provider.places_url`.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Result<Self, ConfigError> {
        let provider = &config.provider;
        let trusted = ProxySource::new(client.clone(), &config.backend.base_url);
        let direct = ProviderSource::new(client, provider.places_url.clone(), provider.api_key.clone());
        Ok(Self::new(trusted, direct, provider.timeout()?)
            .with_limit(provider.limit)
            .with_categories(provider.categories.clone()))
    }

    /// Result limit sent with every query.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Categories sent on the direct path.
    pub fn with_categories(mut self, categories: impl Into<String>) -> Self {
        self.categories = categories.into();
        self
    }

    /// Places within `radius_m` meters of (`lat`, `lon`), sanitized and de-duplicated.
    pub async fn fetch_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: u32,
    ) -> Result<FeatureCollection, LocusError> {
        let query = PlacesQuery::new(lat, lon)
            .radius(radius_m)
            .limit(self.limit)
            .categories(self.categories.clone());
        query.validate().map_err(LocusError::Validation)?;

        match self.call(self.trusted.as_ref(), &query).await {
            Ok(raw) => Ok(sanitize(raw)),
            Err(e) if e.is_not_found() => {
                info!(target: "locus::places", "backend proxy not active; switching to direct provider");
                self.fetch_direct(&query).await
            }
            Err(SourceError::Status(code)) => {
                warn!(target: "locus::places", status = code, "backend proxy failed; not falling back");
                Err(LocusError::UpstreamUnavailable {
                    path: UpstreamPath::Trusted,
                    cause: SourceError::Status(code).into_cause(),
                })
            }
            Err(e) => {
                warn!(target: "locus::places", error = %e, "backend proxy unreachable; attempting direct provider");
                self.fetch_direct(&query).await
            }
        }
    }

    async fn fetch_direct(&self, query: &PlacesQuery) -> Result<FeatureCollection, LocusError> {
        match self.call(self.direct.as_ref(), query).await {
            Ok(raw) => Ok(sanitize(raw)),
            Err(e) => {
                error!(target: "locus::places", error = %e, "direct provider fallback failed");
                Err(LocusError::UpstreamUnavailable { path: self.direct.path(), cause: e.into_cause() })
            }
        }
    }

    async fn call(
        &self,
        source: &dyn PlacesSource,
        query: &PlacesQuery,
    ) -> Result<serde_json::Value, SourceError> {
        self.timeout.execute(|| source.fetch(query)).await
    }
}
