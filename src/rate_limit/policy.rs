//! Bucket policies: burst capacity and refill rate.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors produced when validating a bucket policy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    /// Capacity must be finite and at least one token, or nothing is ever admitted.
    #[error("capacity must be finite and >= 1 (got {0})")]
    InvalidCapacity(f64),
    /// Fill rate must be finite and > 0, or an empty bucket never recovers.
    #[error("fill_rate must be finite and > 0 (got {0})")]
    InvalidFillRate(f64),
}

/// Static limits for one class of callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketPolicy {
    /// Maximum burst size.
    capacity: f64,
    /// Tokens regenerated per second.
    fill_rate: f64,
}

impl BucketPolicy {
    /// Create a policy with validation.
    pub fn new(capacity: f64, fill_rate: f64) -> Result<Self, PolicyError> {
        let policy = Self { capacity, fill_rate };
        policy.validate()?;
        Ok(policy)
    }

    /// `per_minute` tokens per minute with a burst of `capacity`.
    pub fn per_minute(capacity: f64, per_minute: f64) -> Result<Self, PolicyError> {
        Self::new(capacity, per_minute / 60.0)
    }

    /// `per_hour` tokens per hour with a burst of `capacity`.
    pub fn per_hour(capacity: f64, per_hour: f64) -> Result<Self, PolicyError> {
        Self::new(capacity, per_hour / 3600.0)
    }

    /// General browsing traffic keyed by address: burst 50, 50 per minute.
    pub fn anonymous() -> Self {
        Self { capacity: 50.0, fill_rate: 50.0 / 60.0 }
    }

    /// Authenticated enrichment calls keyed by subject: burst 5, 50 per hour.
    pub fn authenticated() -> Self {
        Self { capacity: 5.0, fill_rate: 50.0 / 3600.0 }
    }

    /// Re-check invariants, e.g. after deserializing from config.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.capacity.is_finite() || self.capacity < 1.0 {
            return Err(PolicyError::InvalidCapacity(self.capacity));
        }
        if !self.fill_rate.is_finite() || self.fill_rate <= 0.0 {
            return Err(PolicyError::InvalidFillRate(self.fill_rate));
        }
        Ok(())
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn fill_rate(&self) -> f64 {
        self.fill_rate
    }

    /// Time for an empty bucket to refill completely.
    pub fn full_refill(&self) -> Duration {
        Duration::from_secs_f64(self.capacity / self.fill_rate)
    }
}
