//! Request gate: caller identity resolution composed with the rate limiter.
//!
//! Every gated request is admitted against exactly one bucket. Authenticated callers are
//! never exempt; they draw from the stricter [`BucketPolicy::authenticated`] class keyed
//! by subject id, while everyone else draws from [`BucketPolicy::anonymous`] keyed by
//! forwarded address.

use crate::error::LocusError;
use crate::identity::{bearer_token, forwarded_address, CallerIdentity};
use crate::rate_limit::{BucketKey, BucketPolicy, Decision, EndpointClass, RateLimiter};
use crate::sleeper::{Sleeper, TokioSleeper};
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub mod middleware;

pub use middleware::{GateLayer, GateService};

/// Why a bearer token did not resolve to a subject.
#[derive(Debug, Clone, Error)]
pub enum VerifyError {
    #[error("token rejected: {0}")]
    Rejected(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Pluggable bearer-token verification.
///
/// A real deployment verifies the token signature against its identity provider here;
/// the gate's control flow does not change.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Unique name of this verifier.
    fn name(&self) -> &'static str;

    /// Resolve `token` to a subject id.
    async fn verify(&self, token: &str) -> Result<String, VerifyError>;
}

/// Subject every token resolves to under [`PresenceVerifier`].
pub const STUB_SUBJECT: &str = "secure_user_id";

/// Stub verifier (dev/testing).
///
/// # ⚠️ SECURITY WARNING
///
/// Any syntactically present bearer token is accepted and mapped to one fixed subject.
/// No signature is checked, so every "authenticated" caller shares a single bucket.
/// **DO NOT USE IN PRODUCTION**; plug in a real [`TokenVerifier`].
#[derive(Debug, Clone)]
pub struct PresenceVerifier {
    subject: String,
}

impl Default for PresenceVerifier {
    fn default() -> Self {
        Self { subject: STUB_SUBJECT.to_string() }
    }
}

impl PresenceVerifier {
    pub fn with_subject(subject: impl Into<String>) -> Self {
        Self { subject: subject.into() }
    }
}

#[async_trait]
impl TokenVerifier for PresenceVerifier {
    fn name(&self) -> &'static str {
        "presence-stub"
    }

    async fn verify(&self, token: &str) -> Result<String, VerifyError> {
        if token.is_empty() {
            return Err(VerifyError::Rejected("empty token".into()));
        }
        Ok(self.subject.clone())
    }
}

/// Whether the denial penalty is slept server-side or only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyMode {
    /// Report the delay (`Retry-After`) and reject immediately.
    #[default]
    Advisory,
    /// Hold the request for the delay, then reject.
    Enforced,
}

/// Outcome of a successful gate check, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub identity: CallerIdentity,
    pub endpoint: EndpointClass,
    pub remaining: u32,
}

/// Identity extraction plus admission control.
#[derive(Clone)]
pub struct Gate {
    limiter: Arc<dyn RateLimiter>,
    verifier: Arc<dyn TokenVerifier>,
    anonymous: BucketPolicy,
    authenticated: BucketPolicy,
    penalty_mode: PenaltyMode,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("verifier", &self.verifier.name())
            .field("anonymous", &self.anonymous)
            .field("authenticated", &self.authenticated)
            .field("penalty_mode", &self.penalty_mode)
            .finish_non_exhaustive()
    }
}

impl Gate {
    /// Gate with the default policy classes and advisory penalties.
    pub fn new<L, V>(limiter: L, verifier: V) -> Self
    where
        L: RateLimiter + 'static,
        V: TokenVerifier + 'static,
    {
        Self {
            limiter: Arc::new(limiter),
            verifier: Arc::new(verifier),
            anonymous: BucketPolicy::anonymous(),
            authenticated: BucketPolicy::authenticated(),
            penalty_mode: PenaltyMode::Advisory,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_policies(mut self, anonymous: BucketPolicy, authenticated: BucketPolicy) -> Self {
        self.anonymous = anonymous;
        self.authenticated = authenticated;
        self
    }

    pub fn with_penalty_mode(mut self, mode: PenaltyMode) -> Self {
        self.penalty_mode = mode;
        self
    }

    pub fn with_sleeper<Z: Sleeper + 'static>(mut self, sleeper: Z) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Resolve a verified identity from the bearer header.
    ///
    /// Absent or malformed headers, and tokens the verifier rejects, yield `None`.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Option<CallerIdentity> {
        let token = bearer_token(headers)?;
        match self.verifier.verify(token).await {
            Ok(subject) => Some(CallerIdentity::Authenticated(subject)),
            Err(e) => {
                warn!(target: "locus::gate", verifier = self.verifier.name(), error = %e, "token verification failed");
                None
            }
        }
    }

    /// Authenticated identity if any, otherwise the forwarded address.
    pub async fn identify(&self, headers: &HeaderMap) -> CallerIdentity {
        match self.authenticate(headers).await {
            Some(identity) => identity,
            None => CallerIdentity::Anonymous(forwarded_address(headers)),
        }
    }

    /// Policy class for a resolved identity.
    pub fn policy_for(&self, identity: &CallerIdentity) -> &BucketPolicy {
        if identity.is_authenticated() {
            &self.authenticated
        } else {
            &self.anonymous
        }
    }

    /// Resolve the caller and admit or reject the request for `endpoint`.
    pub async fn check(
        &self,
        headers: &HeaderMap,
        endpoint: EndpointClass,
    ) -> Result<Admission, LocusError> {
        let identity = self.identify(headers).await;
        if endpoint.requires_auth() && !identity.is_authenticated() {
            return Err(LocusError::AuthRequired);
        }

        let key = BucketKey::new(identity, endpoint);
        let policy = *self.policy_for(&key.identity);
        let decision = self
            .limiter
            .admit(&key, &policy)
            .await
            .map_err(|e| LocusError::Store(e.to_string()))?;

        match decision {
            Decision::Allowed { remaining } => {
                Ok(Admission { identity: key.identity, endpoint, remaining })
            }
            Decision::Denied { wait, reason } => {
                debug!(target: "locus::gate", key = %key, ?reason, wait_ms = wait.as_millis() as u64, "request rate limited");
                if self.penalty_mode == PenaltyMode::Enforced && wait > Duration::ZERO {
                    self.sleeper.sleep(wait).await;
                }
                Err(LocusError::RateLimited { retry_after: wait })
            }
        }
    }
}
