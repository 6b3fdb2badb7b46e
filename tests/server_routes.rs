//! Router behavior end to end, with the provider mocked.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use locus::clock::ManualClock;
use locus::config::{Config, LimitsConfig};
use locus::rate_limit::BucketPolicy;
use locus::server::{self, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(upstream: &MockServer) -> Config {
    let mut config = Config::default();
    config.provider.places_url = format!("{}/v2/places", upstream.uri());
    config.provider.tile_template = format!("{}/tile/{{z}}/{{x}}/{{y}}.png", upstream.uri());
    config.provider.api_key = "server-key".into();
    config.enrich.weather_url = format!("{}/forecast", upstream.uri());
    config.enrich.photo_url = format!("{}/w/api.php", upstream.uri());
    config
}

fn app_with_limits(config: &Config, limits: LimitsConfig) -> Router {
    let store = server::build_store(&limits);
    let gate = Arc::new(server::build_gate(&limits, store, ManualClock::new()));
    let state = AppState::from_config(config, reqwest::Client::new()).unwrap();
    server::router(state, gate)
}

fn app(config: &Config) -> Router {
    app_with_limits(config, LimitsConfig::default())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_is_ok() {
    let upstream = MockServer::start().await;
    let response = app(&config_for(&upstream)).oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn places_passes_provider_payload_through() {
    let upstream = MockServer::start().await;
    let payload = json!({"type": "FeatureCollection", "features": [
        {"properties": {"place_id": "x", "lat": 1.0, "lon": 2.0}}
    ]});
    Mock::given(method("GET"))
        .and(path("/v2/places"))
        .and(query_param("filter", "circle:2,1,1200"))
        .and(query_param("limit", "30"))
        .and(query_param("categories", "natural"))
        .and(query_param("apiKey", "server-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload.clone()))
        .expect(1)
        .mount(&upstream)
        .await;

    let response = app(&config_for(&upstream))
        .oneshot(get("/api/places?lat=1&lon=2&radius=1200&categories=natural"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, payload);
}

#[tokio::test]
async fn places_without_coordinates_is_400() {
    let upstream = MockServer::start().await;
    let response = app(&config_for(&upstream)).oneshot(get("/api/places?lat=1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Missing latitude or longitude");
}

#[tokio::test]
async fn places_rejects_other_methods() {
    let upstream = MockServer::start().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/places?lat=1&lon=2")
        .body(Body::empty())
        .unwrap();
    let response = app(&config_for(&upstream)).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body_json(response).await["error"], "Method not allowed");
}

#[tokio::test]
async fn provider_status_is_forwarded() {
    let upstream = MockServer::start().await;
    Mock::given(path("/v2/places"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&upstream)
        .await;
    let response = app(&config_for(&upstream)).oneshot(get("/api/places?lat=1&lon=2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Failed to fetch places");
}

#[tokio::test]
async fn exhausted_bucket_returns_429_with_retry_metadata() {
    let upstream = MockServer::start().await;
    Mock::given(path("/v2/places"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"features": []})))
        .mount(&upstream)
        .await;
    let limits = LimitsConfig {
        anonymous: BucketPolicy::new(2.0, 0.001).unwrap(),
        ..LimitsConfig::default()
    };
    let app = app_with_limits(&config_for(&upstream), limits);

    for _ in 0..2 {
        let ok = app.clone().oneshot(get("/api/places?lat=1&lon=2")).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
    }
    let limited = app.clone().oneshot(get("/api/places?lat=1&lon=2")).await.unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.headers()[header::RETRY_AFTER], "1");
    let body = body_json(limited).await;
    assert_eq!(body["error"], "Too many requests. Please slow down.");
    assert_eq!(body["retryAfterMs"], 300);

    // Other endpoint classes keep their own buckets.
    let photo_mock = Mock::given(path("/w/api.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"batchcomplete": ""})));
    photo_mock.mount(&upstream).await;
    let photo = app.oneshot(get("/api/photo?name=Louvre")).await.unwrap();
    assert_eq!(photo.status(), StatusCode::OK);
}

#[tokio::test]
async fn guide_requires_auth_then_reports_gone() {
    let upstream = MockServer::start().await;
    let app = app(&config_for(&upstream));

    let anonymous = app.clone().oneshot(get("/api/guide")).await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/guide")
        .header("authorization", "Bearer token")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(body_json(response).await["error"], "Spot Guide feature has been removed.");
}

#[tokio::test]
async fn tiles_are_proxied_with_cache_header() {
    let upstream = MockServer::start().await;
    Mock::given(path("/tile/3/4/5.png"))
        .and(query_param("apiKey", "server-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .mount(&upstream)
        .await;

    let response = app(&config_for(&upstream)).oneshot(get("/api/tiles?z=3&x=4&y=5")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=86400");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], &[0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn tile_errors_keep_status_with_empty_body() {
    let upstream = MockServer::start().await;
    Mock::given(path("/tile/1/1/1.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&upstream)
        .await;
    let app = app(&config_for(&upstream));

    let missing = app.clone().oneshot(get("/api/tiles?z=1&x=1")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(missing).await["error"], "Missing tile coordinates");

    let not_found = app.oneshot(get("/api/tiles?z=1&x=1&y=1")).await.unwrap();
    assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(not_found.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn weather_returns_forecast_or_null() {
    let upstream = MockServer::start().await;
    Mock::given(path("/forecast"))
        .and(query_param("current_weather", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "current_weather": {"temperature": 12.5},
            "daily": {"weathercode": [1, 3], "temperature_2m_max": [14.0, 16.0]}
        })))
        .expect(1)
        .mount(&upstream)
        .await;
    let app = app(&config_for(&upstream));

    let response = app.clone().oneshot(get("/api/weather?lat=48.85&lon=2.35")).await.unwrap();
    assert_eq!(
        body_json(response).await,
        json!({"currentTemp": 12.5, "todayCode": 1, "tomorrowCode": 3, "tomorrowTemp": 16.0})
    );

    let missing = app.clone().oneshot(get("/api/weather?lat=48.85")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    for uri in ["/api/weather?lat=NaN&lon=2", "/api/weather?lat=500&lon=2"] {
        let off_globe = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(off_globe.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(off_globe).await["error"].as_str().unwrap().contains("latitude"));
    }
}
