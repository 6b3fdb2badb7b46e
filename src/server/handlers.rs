use crate::error::LocusError;
use crate::places::{validate_coordinates, PlacesQuery, PlacesSource, SourceError};
use crate::server::response::{json_error, upstream_status, INTERNAL_ERROR_MESSAGE};
use crate::server::AppState;
use crate::tiles::{TileCoords, TILE_CACHE_CONTROL};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use tracing::error;

pub const GUIDE_REMOVED_MESSAGE: &str = "Spot Guide feature has been removed.";

/// Raw query strings; parsed by hand so each failure gets its own message.
#[derive(Debug, Default, Deserialize)]
pub struct PlacesParams {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub radius: Option<String>,
    pub categories: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoordinateParams {
    pub lat: Option<String>,
    pub lon: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TileParams {
    pub z: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PhotoParams {
    pub name: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T, LocusError> {
    raw.parse().map_err(|_| LocusError::Validation(format!("Invalid {}: {:?}", name, raw)))
}

fn coordinates(lat: &Option<String>, lon: &Option<String>) -> Result<(f64, f64), LocusError> {
    let (Some(lat), Some(lon)) = (present(lat), present(lon)) else {
        return Err(LocusError::Validation("Missing latitude or longitude".into()));
    };
    Ok((parse("latitude", lat)?, parse("longitude", lon)?))
}

/// Parsed coordinates that are also on the globe.
fn located(lat: &Option<String>, lon: &Option<String>) -> Result<(f64, f64), LocusError> {
    let (lat, lon) = coordinates(lat, lon)?;
    validate_coordinates(lat, lon).map_err(LocusError::Validation)?;
    Ok((lat, lon))
}

impl PlacesParams {
    /// Build a provider query, filling unset fields from the server defaults.
    pub fn into_query(self, state: &AppState) -> Result<PlacesQuery, LocusError> {
        let (lat, lon) = coordinates(&self.lat, &self.lon)?;
        let mut query = PlacesQuery::new(lat, lon)
            .radius(state.radius_m)
            .limit(state.limit)
            .categories(state.categories.clone());
        if let Some(radius) = present(&self.radius) {
            query = query.radius(parse("radius", radius)?);
        }
        if let Some(limit) = present(&self.limit) {
            query = query.limit(parse("limit", limit)?);
        }
        if let Some(categories) = present(&self.categories) {
            query = query.categories(categories);
        }
        query.validate().map_err(LocusError::Validation)?;
        Ok(query)
    }
}

/// `GET /api/places`: server-to-server provider call; the payload is returned unchanged.
pub async fn places(
    State(state): State<AppState>,
    Query(params): Query<PlacesParams>,
) -> Response {
    let query = match params.into_query(&state) {
        Ok(q) => q,
        Err(e) => return e.into_response(),
    };

    let result = state.timeout.execute(|| state.provider.fetch(&query)).await;
    match result {
        Ok(raw) => Json(raw).into_response(),
        Err(SourceError::Status(code)) => {
            error!(target: "locus::server", status = code, "places provider error");
            json_error(upstream_status(code), "Failed to fetch places")
        }
        Err(e) => {
            error!(target: "locus::server", error = %e, "places provider unreachable");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
        }
    }
}

pub async fn method_not_allowed() -> Response {
    json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// `/api/guide`: the generated guide was retired; callers that pass the gate get 410.
pub async fn guide() -> Response {
    json_error(StatusCode::GONE, GUIDE_REMOVED_MESSAGE)
}

/// `GET /api/tiles?z&x&y`: PNG pass-through with a one-day cache header.
pub async fn tiles(State(state): State<AppState>, Query(params): Query<TileParams>) -> Response {
    let (Some(z), Some(x), Some(y)) = (present(&params.z), present(&params.x), present(&params.y))
    else {
        return json_error(StatusCode::BAD_REQUEST, "Missing tile coordinates");
    };
    let coords = match (z.parse(), x.parse(), y.parse()) {
        (Ok(z), Ok(x), Ok(y)) => TileCoords::new(z, x, y),
        _ => Err("tile coordinates must be non-negative integers".to_string()),
    };
    let coords = match coords {
        Ok(c) => c,
        Err(reason) => return json_error(StatusCode::BAD_REQUEST, &reason),
    };

    match state.tiles.fetch(coords).await {
        Ok(png) => (
            [(header::CONTENT_TYPE, "image/png"), (header::CACHE_CONTROL, TILE_CACHE_CONTROL)],
            png,
        )
            .into_response(),
        Err(SourceError::Status(code)) => upstream_status(code).into_response(),
        Err(e) => {
            error!(target: "locus::server", error = %e, "tile proxy error");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /api/weather?lat&lon`: forecast or `null`.
pub async fn weather(
    State(state): State<AppState>,
    Query(params): Query<CoordinateParams>,
) -> Response {
    match located(&params.lat, &params.lon) {
        Ok((lat, lon)) => Json(state.weather.weather(lat, lon).await).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /api/photo?name`: Commons photo or `null`.
pub async fn photo(State(state): State<AppState>, Query(params): Query<PhotoParams>) -> Response {
    match present(&params.name) {
        Some(name) => Json(state.photo.photo(name).await).into_response(),
        None => json_error(StatusCode::BAD_REQUEST, "Missing place name"),
    }
}

pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
