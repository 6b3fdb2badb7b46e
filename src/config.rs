//! Configuration: optional TOML file, then environment overrides, then validation.
//!
//! Every field has a default, so an empty file (or no file) is a working local setup
//! except for the provider API key, which must come from `GEOAPIFY_API_KEY` or the file.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//!
//! [limits]
//! penalty_ms = 300
//! penalty_mode = "advisory"
//!
//! [limits.anonymous]
//! capacity = 50.0
//! fill_rate = 0.8333333333333334
//! ```

use crate::enrich::photo::DEFAULT_PHOTO_TTL;
use crate::enrich::DEFAULT_CACHE_CAPACITY;
use crate::gate::PenaltyMode;
use crate::places::{DEFAULT_CATEGORIES, DEFAULT_LIMIT, DEFAULT_RADIUS_M};
use crate::rate_limit::store::DEFAULT_MAX_BUCKETS;
use crate::rate_limit::{BucketPolicy, DEFAULT_PENALTY};
use crate::tiles::DEFAULT_TILE_TEMPLATE;
use crate::timeout::TimeoutPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "locus.toml";

pub const ENV_API_KEY: &str = "GEOAPIFY_API_KEY";
pub const ENV_BIND: &str = "LOCUS_BIND";
pub const ENV_BACKEND_URL: &str = "LOCUS_BACKEND_URL";
pub const ENV_LOG: &str = "LOCUS_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl ToString) -> Self {
        Self::Invalid { field, reason: reason.to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub provider: ProviderConfig,
    pub backend: BackendConfig,
    pub enrich: EnrichConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".to_string() }
    }
}

/// Rate-limit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Fixed delay reported (or slept, when enforced) on every denial.
    pub penalty_ms: u64,
    pub penalty_mode: PenaltyMode,
    /// Bucket count above which the least recently refilled bucket is evicted.
    pub max_buckets: usize,
    /// Buckets idle this long are swept. Must cover the slowest full refill.
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Policy for callers keyed by forwarded address.
    pub anonymous: BucketPolicy,
    /// Policy for callers with a verified bearer token.
    pub authenticated: BucketPolicy,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            penalty_ms: DEFAULT_PENALTY.as_millis() as u64,
            penalty_mode: PenaltyMode::Advisory,
            max_buckets: DEFAULT_MAX_BUCKETS,
            idle_ttl_secs: 900,
            sweep_interval_secs: 60,
            anonymous: BucketPolicy::anonymous(),
            authenticated: BucketPolicy::authenticated(),
        }
    }
}

impl LimitsConfig {
    pub fn penalty(&self) -> Duration {
        Duration::from_millis(self.penalty_ms)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// External places and tile provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub places_url: String,
    /// Tile URL with `{z}`, `{x}`, `{y}` placeholders.
    pub tile_template: String,
    pub api_key: String,
    pub categories: String,
    pub limit: u32,
    pub radius_m: u32,
    /// Bound on every outbound call, in milliseconds.
    pub timeout_ms: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("places_url", &self.places_url)
            .field("tile_template", &self.tile_template)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("categories", &self.categories)
            .field("limit", &self.limit)
            .field("radius_m", &self.radius_m)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            places_url: "https://api.geoapify.com/v2/places".to_string(),
            tile_template: DEFAULT_TILE_TEMPLATE.to_string(),
            api_key: String::new(),
            categories: DEFAULT_CATEGORIES.to_string(),
            limit: DEFAULT_LIMIT,
            radius_m: DEFAULT_RADIUS_M,
            timeout_ms: 10_000,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Result<TimeoutPolicy, ConfigError> {
        TimeoutPolicy::new(Duration::from_millis(self.timeout_ms))
            .map_err(|e| ConfigError::invalid("provider.timeout_ms", e))
    }
}

/// Trusted-path origin used by the scan client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { base_url: "http://127.0.0.1:8080".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub weather_url: String,
    pub photo_url: String,
    /// Entry bound for each enrichment cache.
    pub cache_capacity: u64,
    pub photo_ttl_secs: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            weather_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            photo_url: "https://commons.wikimedia.org/w/api.php".to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            photo_ttl_secs: DEFAULT_PHOTO_TTL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl Config {
    /// Load `path` (required to exist) or, if `None`, [`DEFAULT_CONFIG_FILE`] when present;
    /// then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML with the API key masked.
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if !shown.provider.api_key.is_empty() {
            shown.provider.api_key = "<redacted>".to_string();
        }
        Ok(toml::to_string_pretty(&shown)?)
    }

    /// Override fields from environment variables; empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = var(ENV_API_KEY) {
            self.provider.api_key = key;
        }
        if let Some(bind) = var(ENV_BIND) {
            self.server.bind = bind;
        }
        if let Some(url) = var(ENV_BACKEND_URL) {
            self.backend.base_url = url;
        }
        if let Some(level) = var(ENV_LOG) {
            self.log.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        let limits = &self.limits;
        limits.anonymous.validate().map_err(|e| ConfigError::invalid("limits.anonymous", e))?;
        limits
            .authenticated
            .validate()
            .map_err(|e| ConfigError::invalid("limits.authenticated", e))?;
        if limits.max_buckets == 0 {
            return Err(ConfigError::invalid("limits.max_buckets", "must be > 0"));
        }
        if limits.sweep_interval_secs == 0 {
            return Err(ConfigError::invalid("limits.sweep_interval_secs", "must be > 0"));
        }
        // A swept bucket comes back full, so sweeping before a full refill would reset it early.
        let slowest = limits.anonymous.full_refill().max(limits.authenticated.full_refill());
        if limits.idle_ttl() < slowest {
            return Err(ConfigError::invalid(
                "limits.idle_ttl_secs",
                format!("must be at least the slowest full refill ({}s)", slowest.as_secs_f64().ceil()),
            ));
        }

        self.provider.timeout()?;
        if self.provider.limit == 0 {
            return Err(ConfigError::invalid("provider.limit", "must be > 0"));
        }
        if self.provider.radius_m == 0 {
            return Err(ConfigError::invalid("provider.radius_m", "must be > 0"));
        }
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.provider.tile_template.contains(placeholder) {
                return Err(ConfigError::invalid(
                    "provider.tile_template",
                    format!("missing {} placeholder", placeholder),
                ));
            }
        }

        check_url("provider.places_url", &self.provider.places_url)?;
        check_url("provider.tile_template", &self.provider.tile_template)?;
        check_url("backend.base_url", &self.backend.base_url)?;
        check_url("enrich.weather_url", &self.enrich.weather_url)?;
        check_url("enrich.photo_url", &self.enrich.photo_url)?;
        if self.enrich.cache_capacity == 0 {
            return Err(ConfigError::invalid("enrich.cache_capacity", "must be > 0"));
        }
        if self.enrich.photo_ttl_secs == 0 {
            return Err(ConfigError::invalid("enrich.photo_ttl_secs", "must be > 0"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind.parse().map_err(|e| ConfigError::invalid("server.bind", e))
    }
}

fn check_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|e| ConfigError::invalid(field, format!("{:?}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(field, format!("{:?} is not an http(s) URL", url)));
    }
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ConfigError::invalid(field, format!("{:?} has no host", url))),
    }
}
