//! Timeout policy bounding every external call

use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upper bound accepted for a configured timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(600);

/// The bounded call did not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {elapsed:?} (limit: {timeout:?})")]
pub struct TimeoutElapsed {
    pub elapsed: Duration,
    pub timeout: Duration,
}

/// Invalid timeout configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeoutError {
    #[error("timeout must be greater than zero")]
    Zero,
    #[error("timeout {0:?} exceeds maximum {MAX_TIMEOUT:?}")]
    TooLong(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    duration: Duration,
}

impl TimeoutPolicy {
    /// Create a timeout policy; rejects zero and anything above [`MAX_TIMEOUT`].
    pub fn new(duration: Duration) -> Result<Self, TimeoutError> {
        if duration.is_zero() {
            return Err(TimeoutError::Zero);
        }
        if duration > MAX_TIMEOUT {
            return Err(TimeoutError::TooLong(duration));
        }
        Ok(Self { duration })
    }

    /// Inspect the configured timeout duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run `operation`, converting an expired deadline into the caller's error type.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, E>
    where
        E: From<TimeoutElapsed>,
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        let start = Instant::now();

        match tokio::time::timeout(self.duration, operation()).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed = start.elapsed();
                Err(TimeoutElapsed { elapsed, timeout: self.duration }.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Op(&'static str),
        Timeout(Duration),
    }

    impl From<TimeoutElapsed> for TestError {
        fn from(e: TimeoutElapsed) -> Self {
            TestError::Timeout(e.timeout)
        }
    }

    #[test]
    fn rejects_zero_and_oversized() {
        assert_eq!(TimeoutPolicy::new(Duration::ZERO).unwrap_err(), TimeoutError::Zero);
        assert!(matches!(
            TimeoutPolicy::new(Duration::from_secs(601)),
            Err(TimeoutError::TooLong(_))
        ));
        assert_eq!(
            TimeoutPolicy::new(Duration::from_secs(10)).unwrap().duration(),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn completes_before_timeout() {
        let timeout = TimeoutPolicy::new(Duration::from_millis(100)).unwrap();
        let result = timeout.execute(|| async { Ok::<_, TestError>(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_long_operation() {
        let timeout = TimeoutPolicy::new(Duration::from_millis(50)).unwrap();
        let result = timeout
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, TestError>(42)
            })
            .await;
        assert_eq!(result, Err(TestError::Timeout(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn propagates_operation_errors() {
        let timeout = TimeoutPolicy::new(Duration::from_secs(1)).unwrap();
        let result = timeout.execute(|| async { Err::<(), _>(TestError::Op("boom")) }).await;
        assert_eq!(result, Err(TestError::Op("boom")));
    }
}
