use crate::clock::{Clock, MonotonicClock};
use crate::rate_limit::store::{StoreError, TokenStore};
use crate::rate_limit::{BucketKey, BucketPolicy, Decision, DenyReason, RateLimiter};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Fixed delay returned with every denial.
pub const DEFAULT_PENALTY: Duration = Duration::from_millis(300);

/// Compare-and-set attempts before giving up with [`DenyReason::Contention`].
const MAX_CAS_ATTEMPTS: usize = 8;

/// A token bucket limiter over a shared [`TokenStore`].
///
/// Each key's bucket starts full, refills continuously at `fill_rate` tokens per second
/// up to `capacity`, and spends one token per admitted request. Only the token count and
/// the last refill timestamp are remembered; there is no request log.
pub struct TokenBucket<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    penalty: Duration,
}

impl<S> TokenBucket<S>
where
    S: TokenStore + Send + Sync + 'static,
{
    /// Create a limiter backed by `store` using the monotonic clock.
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    /// Create a limiter over a store that is also held elsewhere (e.g. by a sweeper).
    pub fn from_shared(store: Arc<S>) -> Self {
        Self { store, clock: Arc::new(MonotonicClock::default()), penalty: DEFAULT_PENALTY }
    }

    /// Override the clock (tests use [`crate::clock::ManualClock`]).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Override the fixed denial penalty.
    pub fn with_penalty(mut self, penalty: Duration) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn penalty(&self) -> Duration {
        self.penalty
    }
}

#[async_trait]
impl<S> RateLimiter for TokenBucket<S>
where
    S: TokenStore + Send + Sync + 'static,
{
    async fn admit(&self, key: &BucketKey, policy: &BucketPolicy) -> Result<Decision, StoreError> {
        let key = key.to_string();
        let capacity = policy.capacity();
        let rate = policy.fill_rate();

        for _ in 0..MAX_CAS_ATTEMPTS {
            let now = self.clock.now_millis();
            let stored = self
                .store
                .get_state(&key)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let (current_tokens, last_refill, version) = match stored {
                Some(state) => (state.tokens, state.last_refill_millis, Some(state.version)),
                None => (capacity, now, None), // Initial state: full bucket
            };

            // A clock that moved backwards refills nothing, and the stored timestamp is
            // kept so the same interval is never counted twice.
            let elapsed_secs = (now.saturating_sub(last_refill) as f64) / 1_000.0;
            let refilled_at = now.max(last_refill);
            let refilled = (current_tokens + elapsed_secs * rate).min(capacity).max(0.0);

            let (tokens, decision) = if refilled >= 1.0 {
                let left = refilled - 1.0;
                (left, Decision::Allowed { remaining: left.floor() as u32 })
            } else {
                (refilled, Decision::Denied { wait: self.penalty, reason: DenyReason::Empty })
            };

            // The refill timestamp is committed even on denial.
            if self
                .store
                .set_state(&key, tokens, refilled_at, version)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?
            {
                return Ok(decision);
            }
        }

        Ok(Decision::Denied { wait: self.penalty, reason: DenyReason::Contention })
    }
}
