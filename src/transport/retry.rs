use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, warn};

use super::messages::{InboundEvent, OutboundMessage};
use super::SessionTransport;
use crate::error::CaptureError;

/// Bounded retry for outbound emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each further retry
    #[serde(with = "crate::session::config::duration_ms")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt` (1-based, attempt 1 never waits)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.backoff.saturating_mul(1u32 << exponent)
    }
}

/// Wraps a transport and retries failed emits according to a [`RetryPolicy`].
///
/// Every failed attempt is logged; the last error is returned once the
/// attempts are exhausted.
pub struct RetryingTransport {
    inner: Arc<dyn SessionTransport>,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(inner: Arc<dyn SessionTransport>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait::async_trait]
impl SessionTransport for RetryingTransport {
    async fn emit(&self, message: OutboundMessage) -> Result<(), CaptureError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.emit(message.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Emit of {} over {} failed (attempt {}/{}): {}",
                        message.event_name(),
                        self.inner.name(),
                        attempt,
                        attempts,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.policy.delay_before(attempt)).await;
                }
                Err(e) => {
                    error!(
                        "Giving up on {} over {} after {} attempts: {}",
                        message.event_name(),
                        self.inner.name(),
                        attempts,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<InboundEvent>, CaptureError> {
        self.inner.subscribe().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(100),
        };

        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
    }
}
