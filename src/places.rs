//! Nearby places: record types, sanitization, provider sources, and the two-tier fetch.
//!
//! Records are GeoJSON features as returned by the places provider. Only `place_id`,
//! `lat`, and `lon` are interpreted; every other field passes through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod fetch;
pub mod sanitize;
pub mod source;

pub use fetch::PlacesFetcher;
pub use sanitize::sanitize;
pub use source::{PlacesSource, ProviderSource, ProxySource, SourceError};

/// Categories requested when the caller does not name any.
pub const DEFAULT_CATEGORIES: &str = "tourism,entertainment,leisure,natural,building.historic";
/// Search radius in meters when the caller does not give one.
pub const DEFAULT_RADIUS_M: u32 = 30_000;
/// Result limit when the caller does not give one.
pub const DEFAULT_LIMIT: u32 = 30;

/// Properties of one place.
///
/// Descriptive fields (`name`, `formatted`, `categories`, ...) stay in `extra` as
/// whatever shape the provider sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceProperties {
    pub place_id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlaceProperties {
    /// A descriptive field, if the provider sent it as a non-empty string.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.extra.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// One sanitized place feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub properties: PlaceProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlaceRecord {
    pub fn place_id(&self) -> &str {
        &self.properties.place_id
    }

    /// Display name, falling back to the formatted address.
    pub fn label(&self) -> &str {
        self.properties
            .text("name")
            .or_else(|| self.properties.text("formatted"))
            .unwrap_or("(unnamed)")
    }
}

/// Ordered, de-duplicated result of one fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<PlaceRecord>,
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self { kind: "FeatureCollection".to_string(), features: Vec::new() }
    }
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A nearby-places search.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacesQuery {
    pub lat: f64,
    pub lon: f64,
    pub radius_m: u32,
    pub limit: u32,
    pub categories: String,
}

impl PlacesQuery {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            radius_m: DEFAULT_RADIUS_M,
            limit: DEFAULT_LIMIT,
            categories: DEFAULT_CATEGORIES.to_string(),
        }
    }

    pub fn radius(mut self, radius_m: u32) -> Self {
        self.radius_m = radius_m;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn categories(mut self, categories: impl Into<String>) -> Self {
        self.categories = categories.into();
        self
    }

    /// Provider circle filter: `circle:<lon>,<lat>,<radius>`.
    pub fn filter(&self) -> String {
        format!("circle:{},{},{}", self.lon, self.lat, self.radius_m)
    }

    /// Coordinates must be finite and on the globe.
    pub fn validate(&self) -> Result<(), String> {
        validate_coordinates(self.lat, self.lon)
    }
}

/// Latitude in [-90, 90] and longitude in [-180, 180], both finite.
pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), String> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(format!("latitude out of range: {}", lat));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("longitude out of range: {}", lon));
    }
    Ok(())
}
