use reqwest::StatusCode;
use std::time::{Duration, SystemTime};

use crate::config::ProcessorOptions;
use crate::model::BatchSettings;

/// Backoff base when the settings carry no usable retry delay.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Policy parameters for retry decisions.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay used before the second attempt; doubled for every further one.
    pub base_delay: Duration,
    /// Maximum backoff delay that will be used, regardless of exponentiation or hints.
    pub max_delay: Duration,
    /// Total number of calls allowed for one chunk, the first one included.
    pub max_attempts: u32,
    /// Extra pause inserted after a rate-limit response.
    pub rate_limit_pause: Duration,
}

impl RetryPolicy {
    pub const fn new(
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
        rate_limit_pause: Duration,
    ) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
            rate_limit_pause,
        }
    }

    /// Policy for a run. `retry_attempts == 0` still allows the initial call,
    /// and a zero or invalid retry delay falls back to a one second base so
    /// retries keep their `2^attempt` spacing.
    pub fn from_settings(settings: &BatchSettings, options: &ProcessorOptions) -> Self {
        let base = if settings.retry_delay_seconds.is_finite() && settings.retry_delay_seconds > 0.0
        {
            Duration::from_secs_f64(settings.retry_delay_seconds)
        } else {
            DEFAULT_BASE_DELAY
        };
        Self {
            base_delay: base,
            max_delay: Duration::from_secs(options.max_backoff_secs),
            max_attempts: settings.retry_attempts.max(1),
            rate_limit_pause: Duration::from_secs(options.rate_limit_pause_secs),
        }
    }
}

/// Extra delay information returned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryHint {
    delay: Duration,
}

impl RetryHint {
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

/// Error classes that influence retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryError {
    /// HTTP error with status code and optional server provided hint.
    Http {
        status: StatusCode,
        retry_hint: Option<RetryHint>,
    },
    /// Network level failure without a status code (timeouts included).
    Network { retry_hint: Option<RetryHint> },
    /// Errors that should not be retried.
    Fatal,
}

impl RetryError {
    fn hint(&self) -> Option<RetryHint> {
        match self {
            RetryError::Http { retry_hint, .. } | RetryError::Network { retry_hint, .. } => {
                *retry_hint
            }
            RetryError::Fatal => None,
        }
    }

    fn is_rate_limit(&self) -> bool {
        matches!(self, RetryError::Http { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Decision made by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    /// Exponential backoff before the next attempt.
    pub delay_ms: u64,
    /// Additional rate-limit pause on top of `delay_ms`.
    pub pause_ms: u64,
    pub used_hint: bool,
}

impl RetryDecision {
    const fn no_retry() -> Self {
        Self {
            should_retry: false,
            delay_ms: 0,
            pause_ms: 0,
            used_hint: false,
        }
    }

    pub fn total_wait(&self) -> Duration {
        Duration::from_millis(self.delay_ms.saturating_add(self.pause_ms))
    }
}

fn duration_ms(delay: Duration) -> u64 {
    let millis = delay.as_millis();
    if millis > u64::MAX as u128 {
        u64::MAX
    } else {
        millis as u64
    }
}

/// Calculates the next retry decision based on the provided error, policy and
/// number of calls already made for the chunk.
///
/// * `attempts_made` counts every call issued so far, the failed one included.
pub fn evaluate_retry(error: RetryError, policy: RetryPolicy, attempts_made: u32) -> RetryDecision {
    if attempts_made >= policy.max_attempts {
        return RetryDecision::no_retry();
    }

    match error {
        RetryError::Fatal => RetryDecision::no_retry(),
        RetryError::Http { status, .. } if !is_retryable_status(status) => {
            RetryDecision::no_retry()
        }
        RetryError::Http { .. } | RetryError::Network { .. } => {
            let delay = compute_exponential_backoff(
                policy.base_delay,
                policy.max_delay,
                attempts_made.saturating_sub(1),
            );

            let hint = error.hint().map(|hint| hint.delay().min(policy.max_delay));
            let pause = if error.is_rate_limit() {
                hint.unwrap_or_default().max(policy.rate_limit_pause)
            } else {
                hint.unwrap_or_default()
            };

            RetryDecision {
                should_retry: true,
                delay_ms: duration_ms(delay),
                pause_ms: duration_ms(pause),
                used_hint: hint.is_some(),
            }
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn compute_exponential_backoff(base: Duration, max_delay: Duration, exponent: u32) -> Duration {
    if base.is_zero() {
        return Duration::from_millis(0);
    }

    let base_ms = base.as_millis();
    let max_ms = max_delay.as_millis();

    let mut multiplier: u128 = 1;
    for _ in 0..exponent {
        multiplier = multiplier.saturating_mul(2);
    }

    let delay_ms = base_ms.saturating_mul(multiplier);
    let capped_ms = delay_ms.min(max_ms);
    Duration::from_millis(capped_ms as u64)
}

/// Parses the value of an HTTP `Retry-After` header.
///
/// Returns `None` when parsing fails.
pub fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(instant) = httpdate::parse_http_date(trimmed) {
        if let Ok(duration) = instant.duration_since(now) {
            return Some(duration);
        }
        return Some(Duration::from_secs(0));
    }

    None
}
