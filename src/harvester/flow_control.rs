//! Flow control for a throttled repository.
//!
//! The repository answers 503 with a `Retry-After` header when a client asks
//! too often. [`FlowControl`] holds the policy for honoring those answers: the
//! minimum spacing between requests, the longest wait we accept, how much to
//! pad each suggested wait, and how many retries to make.

use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::HarvestError;

/// Retry and spacing policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowControl {
    max_retries: u32,
    min_wait: Duration,
    max_wait: Duration,
    wait_padding: f64,
}

impl FlowControl {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_MIN_WAIT: Duration = Duration::from_secs(10);
    pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5 * 60);
    /// Suggested waits are stretched by 10% before sleeping
    pub const DEFAULT_WAIT_PADDING: f64 = 1.1;

    /// Create a policy.
    ///
    /// `min_wait` may not exceed `max_wait`, and `wait_padding` must be a
    /// finite factor of at least 1.0.
    pub fn new(
        max_retries: u32,
        min_wait: Duration,
        max_wait: Duration,
        wait_padding: f64,
    ) -> Result<Self, HarvestError> {
        if min_wait > max_wait {
            return Err(HarvestError::InvalidRequest(format!(
                "Minimum wait time ({}s) must not exceed maximum wait time ({}s)",
                min_wait.as_secs_f64(),
                max_wait.as_secs_f64()
            )));
        }
        if !wait_padding.is_finite() || wait_padding < 1.0 {
            return Err(HarvestError::InvalidRequest(format!(
                "Wait padding must be a finite factor of at least 1.0, got {}",
                wait_padding
            )));
        }

        Ok(Self {
            max_retries,
            min_wait,
            max_wait,
            wait_padding,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn min_wait(&self) -> Duration {
        self.min_wait
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn wait_padding(&self) -> f64 {
        self.wait_padding
    }

    /// How long to wait before a first attempt, given the time since the last
    /// response. `None` means no response has been received yet.
    pub fn spacing_wait(&self, since_last_response: Option<Duration>) -> Option<Duration> {
        since_last_response
            .filter(|elapsed| *elapsed < self.min_wait)
            .map(|elapsed| self.min_wait - elapsed)
    }

    /// Turn a repository-suggested wait into the wait we actually make.
    ///
    /// Suggestions above `max_wait` abort the request. Short suggestions are
    /// raised to `min_wait`; anything else is padded.
    pub fn retry_wait(&self, suggested: Duration) -> Result<Duration, HarvestError> {
        if suggested > self.max_wait {
            return Err(HarvestError::Timeout(format!(
                "Repository-suggested wait time of {}s exceeds maximum allowed wait time of {}s",
                suggested.as_secs_f64(),
                self.max_wait.as_secs_f64()
            )));
        }
        if suggested < self.min_wait {
            return Ok(self.min_wait);
        }
        Duration::try_from_secs_f64(suggested.as_secs_f64() * self.wait_padding).map_err(|_| {
            HarvestError::Timeout(format!(
                "Padded wait time for a suggestion of {}s is out of range",
                suggested.as_secs_f64()
            ))
        })
    }
}

impl Default for FlowControl {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            min_wait: Self::DEFAULT_MIN_WAIT,
            max_wait: Self::DEFAULT_MAX_WAIT,
            wait_padding: Self::DEFAULT_WAIT_PADDING,
        }
    }
}

/// Sleep for `duration` unless `cancel` fires first.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<(), HarvestError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HarvestError::Interrupted(format!(
            "Wait of {}s was cancelled",
            duration.as_secs_f64()
        ))),
        _ = sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_defaults() {
        let flow = FlowControl::default();
        assert_eq!(flow.max_retries(), 3);
        assert_eq!(flow.min_wait(), secs(10));
        assert_eq!(flow.max_wait(), secs(300));
        assert_eq!(flow.wait_padding(), 1.1);
    }

    #[test]
    fn test_new_validates() {
        assert!(FlowControl::new(3, secs(10), secs(10), 1.0).is_ok());
        assert!(matches!(
            FlowControl::new(3, secs(11), secs(10), 1.1),
            Err(HarvestError::InvalidRequest(_))
        ));
        assert!(FlowControl::new(3, secs(1), secs(10), 0.9).is_err());
        assert!(FlowControl::new(3, secs(1), secs(10), f64::NAN).is_err());
        assert!(FlowControl::new(3, secs(1), secs(10), f64::INFINITY).is_err());
    }

    #[test]
    fn test_retry_wait() {
        let flow = FlowControl::new(3, secs(10), secs(300), 1.1).unwrap();

        // Below the minimum: raised to the minimum, no padding
        assert_eq!(flow.retry_wait(secs(0)).unwrap(), secs(10));
        assert_eq!(flow.retry_wait(secs(9)).unwrap(), secs(10));
        // In range: padded
        assert_eq!(flow.retry_wait(secs(10)).unwrap(), secs(11));
        assert_eq!(flow.retry_wait(secs(20)).unwrap(), secs(22));
        // Exactly the maximum is accepted, and padding may exceed it
        assert_eq!(flow.retry_wait(secs(300)).unwrap(), secs(330));
        // Beyond the maximum
        assert!(matches!(
            flow.retry_wait(secs(301)),
            Err(HarvestError::Timeout(_))
        ));
    }

    #[test]
    fn test_retry_wait_padding_overflow() {
        let flow = FlowControl::new(0, secs(1), Duration::MAX, 1.1).unwrap();
        assert!(matches!(
            flow.retry_wait(Duration::MAX),
            Err(HarvestError::Timeout(_))
        ));
        assert_eq!(flow.retry_wait(secs(100)).unwrap(), secs(110));
    }

    #[test]
    fn test_retry_wait_without_padding() {
        let flow = FlowControl::new(0, secs(1), secs(60), 1.0).unwrap();
        for s in 1..=60 {
            assert_eq!(flow.retry_wait(secs(s)).unwrap(), secs(s));
        }
    }

    #[test]
    fn test_spacing_wait() {
        let flow = FlowControl::default();
        assert_eq!(flow.spacing_wait(None), None);
        assert_eq!(flow.spacing_wait(Some(secs(0))), Some(secs(10)));
        assert_eq!(flow.spacing_wait(Some(secs(4))), Some(secs(6)));
        assert_eq!(flow.spacing_wait(Some(secs(10))), None);
        assert_eq!(flow.spacing_wait(Some(secs(3600))), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_sleeps() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        pause(secs(22), &cancel).await.unwrap();
        assert_eq!(start.elapsed(), secs(22));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_interrupted() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(secs(5)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = pause(secs(60), &cancel).await;
        assert!(matches!(result, Err(HarvestError::Interrupted(_))));
        assert!(start.elapsed() < secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(pause(secs(1), &cancel).await.is_err());
    }
}
