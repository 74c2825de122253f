// Copyright (c) 2025 - Cowboy AI, Inc.
//! Long-running operations
//!
//! Polling with bounded exponential backoff and a per-operation deadline,
//! plus local retry of transient request failures.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{trace, warn};

use super::{OperationStatus, OperationToken, ProviderError, ResourceProvider};

/// Exponential backoff capped at a maximum delay
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            next: initial.min(max),
            max,
            multiplier: multiplier.max(1.0),
        }
    }

    /// Delay to wait now; the following delay grows by the multiplier
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
            .map_or(self.max, |grown| grown.min(self.max));
        delay
    }
}

/// Retry configuration for provider requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Initial delay between retries
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Maximum delay between retries
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_delay, self.max_delay, self.backoff_multiplier)
    }
}

/// Polling configuration for long-running operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    pub multiplier: f64,

    /// Deadline for one operation's poll loop
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            multiplier: 1.5,
            // Managed control planes routinely take over ten minutes.
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl PollConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_interval, self.max_interval, self.multiplier)
    }
}

/// Durations as integer milliseconds in JSON
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Run a provider request, retrying transient failures with backoff
pub async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    operation: &str,
    mut request: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut backoff = retry.backoff();
    let mut attempt = 1;
    loop {
        match request().await {
            Err(error) if error.is_retryable() && attempt < retry.max_attempts => {
                let delay = backoff.next_delay();
                warn!(operation, attempt, ?delay, %error, "Retrying transient provider error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            settled => return settled,
        }
    }
}

/// Poll an operation until it reaches a terminal status or its deadline
///
/// Returns the attributes reported on success. A poll loop exceeding
/// `poll.timeout` yields [`ProviderError::Timeout`].
pub async fn await_operation(
    provider: &dyn ResourceProvider,
    token: &OperationToken,
    poll: &PollConfig,
    retry: &RetryConfig,
) -> Result<BTreeMap<String, Value>, ProviderError> {
    let polling = async {
        let mut backoff = poll.backoff();
        loop {
            match with_retry(retry, "poll", || provider.poll(token)).await? {
                OperationStatus::Running => {
                    let delay = backoff.next_delay();
                    trace!(%token, ?delay, "Operation still running");
                    tokio::time::sleep(delay).await;
                }
                OperationStatus::Succeeded { attributes } => return Ok(attributes),
                OperationStatus::Failed(error) => return Err(error),
            }
        }
    };

    match tokio::time::timeout(poll.timeout, polling).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(format!(
            "{token} did not finish within {:?}",
            poll.timeout
        ))),
    }
}
