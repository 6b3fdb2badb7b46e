//! Error taxonomy shared by the gate, the fetch orchestrator, and the HTTP surface.
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which provider path produced an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamPath {
    /// Backend proxy that hides provider credentials.
    Trusted,
    /// Straight call to the external provider.
    Direct,
}

impl fmt::Display for UpstreamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trusted => f.write_str("trusted"),
            Self::Direct => f.write_str("direct"),
        }
    }
}

/// Why an upstream could not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableCause {
    /// Non-success status that must not be retried on another path.
    Status(u16),
    /// Connection, DNS, or body read failure.
    Transport(String),
    /// The bounded timeout around the call fired.
    Timeout(Duration),
    /// The response body was not the JSON we expected.
    Decode(String),
}

impl fmt::Display for UnavailableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "status {}", code),
            Self::Transport(msg) => write!(f, "transport failure: {}", msg),
            Self::Timeout(limit) => write!(f, "timed out after {:?}", limit),
            Self::Decode(msg) => write!(f, "undecodable response: {}", msg),
        }
    }
}

/// Unified error type for request handling.
#[derive(Debug, Clone, Error)]
pub enum LocusError {
    /// Required parameters missing or malformed. Never retried.
    #[error("invalid request: {0}")]
    Validation(String),
    /// The caller's bucket is empty; back off for `retry_after`.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Duration },
    /// The endpoint needs an authenticated caller and none was resolved.
    #[error("authentication required")]
    AuthRequired,
    /// No provider path produced a usable response.
    #[error("upstream unavailable via {path} path: {cause}")]
    UpstreamUnavailable { path: UpstreamPath, cause: UnavailableCause },
    /// The rate-limit store failed; the request is rejected rather than admitted blind.
    #[error("rate limit store failure: {0}")]
    Store(String),
}

impl LocusError {
    /// Check if this error is a validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
    /// Check if this error is a rate-limit rejection
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
    /// Check if this error is a missing-identity rejection
    pub fn is_auth_required(&self) -> bool {
        matches!(self, Self::AuthRequired)
    }
    /// Check if every provider path failed
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
    /// Delay the caller should wait before retrying, for rate-limit rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
    /// Path and cause for upstream failures.
    pub fn upstream_details(&self) -> Option<(UpstreamPath, &UnavailableCause)> {
        match self {
            Self::UpstreamUnavailable { path, cause } => Some((*path, cause)),
            _ => None,
        }
    }
    /// HTTP status the server surface answers with.
    ///
    /// Upstream status failures are forwarded verbatim; transport-level failures are 500.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::AuthRequired => 401,
            Self::RateLimited { .. } => 429,
            Self::UpstreamUnavailable { cause: UnavailableCause::Status(code), .. } => *code,
            Self::UpstreamUnavailable { .. } | Self::Store(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display_and_accessors() {
        let err = LocusError::RateLimited { retry_after: Duration::from_millis(300) };
        assert!(err.to_string().contains("rate limited"));
        assert!(err.is_rate_limited());
        assert!(!err.is_upstream_unavailable());
        assert_eq!(err.retry_after(), Some(Duration::from_millis(300)));
        assert_eq!(err.http_status(), 429);
    }

    #[test]
    fn upstream_status_is_forwarded() {
        let err = LocusError::UpstreamUnavailable {
            path: UpstreamPath::Direct,
            cause: UnavailableCause::Status(503),
        };
        assert_eq!(err.http_status(), 503);
        assert!(err.to_string().contains("direct"));
        assert!(err.to_string().contains("503"));
        let (path, cause) = err.upstream_details().unwrap();
        assert_eq!(path, UpstreamPath::Direct);
        assert_eq!(cause, &UnavailableCause::Status(503));
    }

    #[test]
    fn transport_and_timeout_map_to_server_error() {
        let transport = LocusError::UpstreamUnavailable {
            path: UpstreamPath::Trusted,
            cause: UnavailableCause::Transport("connection refused".into()),
        };
        let timeout = LocusError::UpstreamUnavailable {
            path: UpstreamPath::Direct,
            cause: UnavailableCause::Timeout(Duration::from_secs(10)),
        };
        assert_eq!(transport.http_status(), 500);
        assert_eq!(timeout.http_status(), 500);
        assert!(timeout.to_string().contains("timed out"));
    }

    #[test]
    fn predicates_cover_variants() {
        assert!(LocusError::Validation("lat".into()).is_validation());
        assert_eq!(LocusError::Validation("lat".into()).http_status(), 400);
        assert!(LocusError::AuthRequired.is_auth_required());
        assert_eq!(LocusError::AuthRequired.http_status(), 401);
        assert!(LocusError::AuthRequired.retry_after().is_none());
        assert!(LocusError::Store("poisoned".into()).upstream_details().is_none());
    }
}
