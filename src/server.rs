//! HTTP surface.
//!
//! | Route          | Gate class                 | Notes                                 |
//! |----------------|----------------------------|---------------------------------------|
//! | `/api/places`  | `places`                   | GET only; other methods get 405       |
//! | `/api/guide`   | `guide` (auth required)    | always 410 once admitted              |
//! | `/api/weather` | `weather`                  | `null` when the forecast is unavailable |
//! | `/api/photo`   | `photo`                    | `null` when no photo is found         |
//! | `/api/tiles`   | none                       | PNG pass-through                      |
//! | `/healthz`     | none                       |                                       |
//!
//! The gate runs before parameter validation and method checks, so malformed requests
//! still spend a token.

use crate::clock::{Clock, MonotonicClock};
use crate::config::{Config, ConfigError, LimitsConfig};
use crate::enrich::{PhotoClient, WeatherClient};
use crate::gate::{Gate, GateLayer, PresenceVerifier};
use crate::places::ProviderSource;
use crate::rate_limit::{EndpointClass, InMemoryTokenStore, TokenBucket};
use crate::tiles::TileProxy;
use crate::timeout::TimeoutPolicy;
use axum::routing::{any, get};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub mod handlers;
pub mod response;

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub provider: Arc<ProviderSource>,
    pub tiles: Arc<TileProxy>,
    pub weather: Arc<WeatherClient>,
    pub photo: Arc<PhotoClient>,
    pub timeout: TimeoutPolicy,
    pub radius_m: u32,
    pub limit: u32,
    pub categories: String,
}

impl AppState {
    pub fn from_config(config: &Config, client: reqwest::Client) -> Result<Self, ConfigError> {
        let provider = &config.provider;
        let timeout = provider.timeout()?;
        if provider.api_key.is_empty() {
            warn!(target: "locus::server", "no provider API key configured; places and tiles will fail upstream");
        }
        let enrich = &config.enrich;
        Ok(Self {
            provider: Arc::new(ProviderSource::new(
                client.clone(),
                provider.places_url.clone(),
                provider.api_key.clone(),
            )),
            tiles: Arc::new(TileProxy::new(
                client.clone(),
                provider.tile_template.clone(),
                provider.api_key.clone(),
                timeout,
            )),
            weather: Arc::new(WeatherClient::new(
                client.clone(),
                enrich.weather_url.clone(),
                timeout,
                enrich.cache_capacity,
            )),
            photo: Arc::new(PhotoClient::new(
                client,
                enrich.photo_url.clone(),
                timeout,
                enrich.cache_capacity,
                Duration::from_secs(enrich.photo_ttl_secs),
            )),
            timeout,
            radius_m: provider.radius_m,
            limit: provider.limit,
            categories: provider.categories.clone(),
        })
    }
}

/// Outbound client shared by every upstream call.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("locus/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Gate over `store` with the configured policies and penalty handling.
///
/// The gate verifies bearer tokens with [`PresenceVerifier`]; see its security warning.
pub fn build_gate<C>(limits: &LimitsConfig, store: Arc<InMemoryTokenStore>, clock: C) -> Gate
where
    C: Clock + 'static,
{
    let limiter = TokenBucket::from_shared(store).with_clock(clock).with_penalty(limits.penalty());
    Gate::new(limiter, PresenceVerifier::default())
        .with_policies(limits.anonymous, limits.authenticated)
        .with_penalty_mode(limits.penalty_mode)
}

/// Bucket store sized from config.
pub fn build_store(limits: &LimitsConfig) -> Arc<InMemoryTokenStore> {
    Arc::new(InMemoryTokenStore::with_max_buckets(limits.max_buckets))
}

pub fn router(state: AppState, gate: Arc<Gate>) -> Router {
    let gated = |endpoint| GateLayer::new(gate.clone(), endpoint);
    Router::new()
        .route(
            "/api/places",
            get(handlers::places)
                .fallback(handlers::method_not_allowed)
                .layer(gated(EndpointClass::Places)),
        )
        .route("/api/guide", any(handlers::guide).layer(gated(EndpointClass::Guide)))
        .route("/api/weather", get(handlers::weather).layer(gated(EndpointClass::Weather)))
        .route("/api/photo", get(handlers::photo).layer(gated(EndpointClass::Photo)))
        .route("/api/tiles", get(handlers::tiles))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}

/// Everything `serve` needs, built from one config.
#[derive(Debug)]
pub struct Server {
    pub router: Router,
    pub store: Arc<InMemoryTokenStore>,
    pub clock: MonotonicClock,
}

impl Server {
    pub fn from_config(config: &Config, client: reqwest::Client) -> Result<Self, ConfigError> {
        let store = build_store(&config.limits);
        let clock = MonotonicClock::default();
        let gate = Arc::new(build_gate(&config.limits, store.clone(), clock.clone()));
        let state = AppState::from_config(config, client)?;
        Ok(Self { router: router(state, gate), store, clock })
    }
}

/// Periodically drop buckets idle longer than `ttl`.
///
/// `clock` must be the limiter's clock (or a clone of it) so timestamps compare.
pub fn spawn_sweeper<C>(
    store: Arc<InMemoryTokenStore>,
    clock: C,
    interval: Duration,
    ttl: Duration,
) -> JoinHandle<()>
where
    C: Clock + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep_idle(clock.now_millis(), ttl);
            debug!(target: "locus::server", removed, live = store.len(), "bucket sweep");
        }
    })
}
