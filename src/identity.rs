//! Caller identity extraction from request headers.
//!
//! Identity is derived once per request and never stored: either the subject id of a
//! verified bearer token, or the forwarded client address.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use std::fmt;

/// Header carrying the original client address when running behind a proxy.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Bucket key used when no forwarded address is present.
///
/// Every such caller shares one bucket; over-aggregation is accepted.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// The resolved subject a request is rate limited under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerIdentity {
    /// Unauthenticated caller, keyed by forwarded address.
    Anonymous(String),
    /// Caller with a verified bearer token, keyed by subject id.
    Authenticated(String),
}

impl CallerIdentity {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Raw identity value (address or subject id).
    pub fn value(&self) -> &str {
        match self {
            Self::Anonymous(addr) => addr,
            Self::Authenticated(subject) => subject,
        }
    }

    /// Prefix used in bucket keys.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous(_) => "ip",
            Self::Authenticated(_) => "user",
        }
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// Absent, non-UTF-8, non-bearer, or empty tokens yield `None`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.split(' ').next()?;
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Leftmost `X-Forwarded-For` entry, or [`UNKNOWN_ADDRESS`].
pub fn forwarded_address(headers: &HeaderMap) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_ADDRESS)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        assert_eq!(bearer_token(&headers(&[("authorization", "Bearer abc.def")])), Some("abc.def"));
        assert_eq!(bearer_token(&headers(&[("authorization", "Basic abc")])), None);
        assert_eq!(bearer_token(&headers(&[("authorization", "Bearer ")])), None);
        assert_eq!(bearer_token(&headers(&[("authorization", "bearer abc")])), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn forwarded_address_takes_leftmost_entry() {
        let h = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(forwarded_address(&h), "203.0.113.7");
    }

    #[test]
    fn missing_forwarded_address_falls_back_to_unknown() {
        assert_eq!(forwarded_address(&HeaderMap::new()), UNKNOWN_ADDRESS);
        assert_eq!(forwarded_address(&headers(&[("x-forwarded-for", " ")])), UNKNOWN_ADDRESS);
    }

    #[test]
    fn identity_display_matches_bucket_prefix() {
        assert_eq!(CallerIdentity::Anonymous("1.2.3.4".into()).to_string(), "ip:1.2.3.4");
        let user = CallerIdentity::Authenticated("u1".into());
        assert_eq!(user.to_string(), "user:u1");
        assert!(user.is_authenticated());
        assert_eq!(user.value(), "u1");
    }
}
