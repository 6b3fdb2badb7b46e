#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # locus
//!
//! Backend core for a nearby-places explorer: per-caller token-bucket rate limiting in
//! front of a small set of provider proxies, plus the client-side fetch that tries the
//! backend first and falls back to the provider directly.
//!
//! ## Components
//!
//! - **Rate limiting** ([`rate_limit`]): continuous-refill token buckets keyed by caller
//!   identity and endpoint class, stored in a bounded concurrent map with
//!   compare-and-set updates.
//! - **Gate** ([`gate`]): resolves the caller (bearer token or forwarded address), picks
//!   the policy class, and admits or rejects; available as a tower layer.
//! - **Places** ([`places`]): trusted-path then direct-path fetch with sanitization and
//!   de-duplication of provider records.
//! - **Server** ([`server`]): axum routes for places, tiles, weather, photos, and the
//!   retired guide endpoint.
//!
//! ## Quick Start
//!
//! ```rust
//! use locus::clock::ManualClock;
//! use locus::identity::CallerIdentity;
//! use locus::rate_limit::{
//!     BucketKey, BucketPolicy, EndpointClass, InMemoryTokenStore, RateLimiter, TokenBucket,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let clock = ManualClock::new();
//! let limiter = TokenBucket::new(InMemoryTokenStore::new()).with_clock(clock.clone());
//! let policy = BucketPolicy::new(2.0, 1.0).unwrap();
//! let key = BucketKey::new(CallerIdentity::Anonymous("203.0.113.7".into()), EndpointClass::Places);
//!
//! assert!(limiter.admit(&key, &policy).await.unwrap().is_allowed());
//! assert!(limiter.admit(&key, &policy).await.unwrap().is_allowed());
//! assert!(!limiter.admit(&key, &policy).await.unwrap().is_allowed());
//!
//! // One second refills one token.
//! clock.advance(1_000);
//! assert!(limiter.admit(&key, &policy).await.unwrap().is_allowed());
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod enrich;
pub mod error;
pub mod gate;
pub mod identity;
pub mod places;
pub mod rate_limit;
pub mod server;
pub mod sleeper;
pub mod telemetry;
pub mod tiles;
pub mod timeout;

// Re-exports
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{Config, ConfigError};
pub use error::{LocusError, UnavailableCause, UpstreamPath};
pub use gate::{Gate, GateLayer, PenaltyMode, PresenceVerifier, TokenVerifier, VerifyError};
pub use identity::CallerIdentity;
pub use places::{FeatureCollection, PlaceRecord, PlacesFetcher, PlacesSource};
pub use rate_limit::{
    BucketKey, BucketPolicy, Decision, EndpointClass, InMemoryTokenStore, RateLimiter,
    TokenBucket, TokenStore,
};
pub use sleeper::{Sleeper, TokioSleeper, TrackingSleeper};
pub use timeout::TimeoutPolicy;
