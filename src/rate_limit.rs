//! Per-caller rate limiting.
//!
//! This module provides the building blocks for rate limiting:
//! - [`RateLimiter`]: The core trait for admission decisions.
//! - [`Decision`]: The result of an admission check (Allowed/Denied).
//! - [`BucketKey`]: Which bucket a request draws from.
//!
//! # Architecture
//!
//! - **Gate**: [`crate::gate::Gate`] resolves the caller and picks a [`BucketPolicy`]. It
//!   doesn't know *how* limiting works, only that it should ask a `RateLimiter`.
//! - **Logic**: [`strategies::TokenBucket`] handles the refill math.
//! - **Storage**: [`store::TokenStore`] holds bucket state behind a compare-and-set
//!   interface, so concurrent workers never lose an update.
//!
//! Buckets are partitioned by identity kind, identity value, and endpoint class. The
//! same caller holds independent buckets per endpoint class.

use crate::identity::CallerIdentity;
use std::fmt;
use std::time::Duration;

pub mod policy;
pub mod store;
pub mod strategies;

pub use policy::{BucketPolicy, PolicyError};
pub use store::{BucketState, InMemoryTokenStore, StoreError, TokenStore};
pub use strategies::{TokenBucket, DEFAULT_PENALTY};

/// Endpoint family a bucket protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// Nearby places lookup.
    Places,
    /// Expensive enrichment reserved for authenticated callers.
    Guide,
    /// Weather lookup.
    Weather,
    /// Photo lookup.
    Photo,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Places => "places",
            Self::Guide => "guide",
            Self::Weather => "weather",
            Self::Photo => "photo",
        }
    }

    /// Endpoints that reject anonymous callers outright.
    pub fn requires_auth(&self) -> bool {
        matches!(self, Self::Guide)
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite bucket identity: `<kind>:<identity>:<endpoint>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub identity: CallerIdentity,
    pub endpoint: EndpointClass,
}

impl BucketKey {
    pub fn new(identity: CallerIdentity, endpoint: EndpointClass) -> Self {
        Self { identity, endpoint }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.identity, self.endpoint)
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Fewer than one token after refill.
    Empty,
    /// Compare-and-set kept losing to concurrent writers.
    Contention,
}

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The request is allowed to proceed.
    Allowed {
        /// Whole permits remaining after this admission.
        remaining: u32,
    },
    /// The request is denied.
    Denied {
        /// Fixed penalty the caller may wait before retrying. Not proportional to deficit.
        wait: Duration,
        reason: DenyReason,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Retry delay in milliseconds; zero when allowed.
    pub fn retry_delay_millis(&self) -> u64 {
        match self {
            Decision::Allowed { .. } => 0,
            Decision::Denied { wait, .. } => u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Core interface for admission decisions.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Refill the bucket for `key` under `policy`, then try to consume one token.
    async fn admit(&self, key: &BucketKey, policy: &BucketPolicy) -> Result<Decision, StoreError>;
}
