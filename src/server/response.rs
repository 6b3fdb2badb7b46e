use crate::error::{LocusError, UnavailableCause};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;

/// Body text of every 429.
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please slow down.";
pub const AUTH_REQUIRED_MESSAGE: &str = "Authentication required";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// `{"error": message}` with `status`.
pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Status code from an upstream, or 502 if it is not a valid HTTP status.
pub fn upstream_status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY)
}

/// `Retry-After` is whole seconds; round up so a client never retries early.
fn retry_after_secs(wait: Duration) -> u64 {
    let millis = wait.as_millis();
    u64::try_from(millis.div_ceil(1000)).unwrap_or(u64::MAX)
}

impl IntoResponse for LocusError {
    fn into_response(self) -> Response {
        match &self {
            LocusError::Validation(reason) => json_error(StatusCode::BAD_REQUEST, reason),
            LocusError::AuthRequired => json_error(StatusCode::UNAUTHORIZED, AUTH_REQUIRED_MESSAGE),
            LocusError::RateLimited { retry_after } => {
                let body = Json(json!({
                    "error": RATE_LIMITED_MESSAGE,
                    "retryAfterMs": u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(*retry_after)));
                response
            }
            LocusError::UpstreamUnavailable { cause: UnavailableCause::Status(code), .. } => {
                json_error(upstream_status(*code), "Upstream request failed")
            }
            LocusError::UpstreamUnavailable { .. } | LocusError::Store(_) => {
                tracing::error!(target: "locus::server", error = %self, "request failed");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamPath;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rate_limited_carries_header_and_millis() {
        let response =
            LocusError::RateLimited { retry_after: Duration::from_millis(300) }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
        let body = body_json(response).await;
        assert_eq!(body["error"], RATE_LIMITED_MESSAGE);
        assert_eq!(body["retryAfterMs"], 300);
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::ZERO), 0);
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1000)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1001)), 2);
    }

    #[tokio::test]
    async fn upstream_status_is_forwarded_and_transport_is_500() {
        let forwarded = LocusError::UpstreamUnavailable {
            path: UpstreamPath::Direct,
            cause: UnavailableCause::Status(503),
        };
        assert_eq!(forwarded.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let transport = LocusError::UpstreamUnavailable {
            path: UpstreamPath::Direct,
            cause: UnavailableCause::Transport("reset".into()),
        };
        let response = transport.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], INTERNAL_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn validation_message_is_returned() {
        let response = LocusError::Validation("Missing latitude or longitude".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Missing latitude or longitude");
    }
}
