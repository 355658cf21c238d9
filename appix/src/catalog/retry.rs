//! Attempt accounting for the upload retry loop.
//!
//! Each attempt produces an immutable [`PushAttempt`]. Whether to try again
//! is decided from the attempts made so far, never from a shared counter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::AttemptError;

/// Backoff strategy for delays between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^(attempts - 1)
    #[default]
    Exponential,
    /// delay = base * attempts
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for the upload retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    #[serde(default)]
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter_strategy: JitterStrategy,
}

fn default_max_attempts() -> usize {
    3
}

fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: 0,
            max_delay_ms: default_max_delay_ms(),
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Attempt ceiling; a configured zero still allows one attempt.
    #[must_use]
    pub fn attempt_ceiling(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Delay to wait after `failed_attempts` consecutive failures.
    #[must_use]
    pub fn delay_after(&self, failed_attempts: usize) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;
        let step = u32::try_from(failed_attempts.saturating_sub(1)).unwrap_or(u32::MAX);

        let delay = match self.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(step)),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(step) + 1),
            BackoffStrategy::Constant => base,
        }
        .min(max);

        let jittered = match self.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Outcome of one network attempt.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// The catalog accepted the artifact; holds the upload URI.
    Success(String),
    /// The attempt failed and may be retried.
    TransientFailure(AttemptError),
}

/// Record of one network attempt.
#[derive(Debug, Clone)]
pub struct PushAttempt {
    /// 1-based attempt index.
    pub index: usize,
    /// What happened.
    pub outcome: AttemptOutcome,
    /// How long the attempt took.
    pub elapsed: Duration,
}

impl PushAttempt {
    /// Creates a successful attempt record.
    #[must_use]
    pub fn succeeded(index: usize, uri: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            index,
            outcome: AttemptOutcome::Success(uri.into()),
            elapsed,
        }
    }

    /// Creates a failed attempt record.
    #[must_use]
    pub fn failed(index: usize, cause: AttemptError, elapsed: Duration) -> Self {
        Self {
            index,
            outcome: AttemptOutcome::TransientFailure(cause),
            elapsed,
        }
    }

    /// Returns true if this attempt succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success(_))
    }
}

/// What the retry loop does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// The last attempt succeeded; holds the upload URI.
    Done(String),
    /// Try again after the delay.
    Retry(Duration),
    /// The attempt ceiling is reached; holds the last failure.
    GiveUp(AttemptError),
}

/// Decides the next step from the attempts made so far.
///
/// Before the first attempt the answer is always an immediate retry.
#[must_use]
pub fn decide(attempts: &[PushAttempt], config: &RetryConfig) -> RetryDecision {
    let Some(last) = attempts.last() else {
        return RetryDecision::Retry(Duration::ZERO);
    };
    match &last.outcome {
        AttemptOutcome::Success(uri) => RetryDecision::Done(uri.clone()),
        AttemptOutcome::TransientFailure(cause) if attempts.len() >= config.attempt_ceiling() => {
            RetryDecision::GiveUp(cause.clone())
        }
        AttemptOutcome::TransientFailure(_) => {
            RetryDecision::Retry(config.delay_after(attempts.len()))
        }
    }
}
