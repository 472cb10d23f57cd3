//! Stage executor: per-attempt timeout, bounded retry with backoff, cancellation.
//!
//! The executor knows nothing about the ledger; it turns a fallible attempt
//! function into either an output (plus the number of attempts it took) or a
//! classified [`StageError`].

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use siteforge_shared::{RetryConfig, SiteForgeError};

use crate::stage::{FailureClass, StageFailure, StageKind};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Runtime retry policy for one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
            attempt_timeout: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// A policy with no delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Delay to wait after the `failed_attempt`-th attempt failed (1-based).
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = SiteForgeError;

    fn try_from(config: &RetryConfig) -> Result<Self, Self::Error> {
        if config.max_attempts == 0 {
            return Err(SiteForgeError::config("retry.max_attempts must be at least 1"));
        }
        if config.backoff_multiplier.is_nan() || config.backoff_multiplier < 1.0 {
            return Err(SiteForgeError::config(
                "retry.backoff_multiplier must be at least 1.0",
            ));
        }
        if config.attempt_timeout_secs == 0 {
            return Err(SiteForgeError::config(
                "retry.attempt_timeout_secs must be greater than 0",
            ));
        }
        Ok(Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
        })
    }
}

// ---------------------------------------------------------------------------
// StageError
// ---------------------------------------------------------------------------

/// Why a stage ultimately failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// The last attempt timed out.
    Timeout,
    /// A terminal failure short-circuited the remaining attempts.
    Rejected,
    /// Retryable failures used up every attempt.
    TransientExhausted,
    /// The run was cancelled while the stage was in flight.
    Cancelled,
}

/// Terminal outcome of executing one stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} failed after {attempts} attempt(s): {message}")]
pub struct StageError {
    pub stage: StageKind,
    pub kind: StageErrorKind,
    pub message: String,
    pub attempts: u32,
}

impl StageError {
    fn from_failure(stage: StageKind, failure: StageFailure, attempts: u32) -> Self {
        let kind = match failure.class {
            FailureClass::Rejected => StageErrorKind::Rejected,
            FailureClass::Timeout => StageErrorKind::Timeout,
            FailureClass::Transient => StageErrorKind::TransientExhausted,
        };
        Self {
            stage,
            kind,
            message: failure.message,
            attempts,
        }
    }

    fn cancelled(stage: StageKind, attempts: u32) -> Self {
        Self {
            stage,
            kind: StageErrorKind::Cancelled,
            message: format!("run cancelled during {stage} stage"),
            attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// execute
// ---------------------------------------------------------------------------

/// Run `attempt` until it succeeds, fails terminally, exhausts the policy, or
/// the run is cancelled.
///
/// `attempt` receives the 1-based attempt number. On success the output is
/// returned together with the number of attempts used.
pub async fn execute<T, F, Fut>(
    stage: StageKind,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<(T, u32), StageError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StageFailure>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 0;

    loop {
        n += 1;
        debug!(%stage, attempt = n, max_attempts, "starting attempt");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageError::cancelled(stage, n)),
            res = tokio::time::timeout(policy.attempt_timeout, attempt(n)) => res,
        };

        let failure = match outcome {
            Ok(Ok(output)) => return Ok((output, n)),
            Ok(Err(failure)) => failure,
            Err(_) => StageFailure::timeout(format!(
                "attempt {n} timed out after {:.1}s",
                policy.attempt_timeout.as_secs_f64()
            )),
        };

        if !failure.is_retryable() || n >= max_attempts {
            return Err(StageError::from_failure(stage, failure, n));
        }

        let delay = policy.backoff_for(n);
        warn!(
            %stage,
            attempt = n,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "attempt failed, will retry"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageError::cancelled(stage, n)),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let calls = counting();
        let c = calls.clone();
        let (value, attempts) = execute(
            StageKind::Architect,
            &RetryPolicy::immediate(3),
            &CancellationToken::new(),
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, StageFailure>(7) }
            },
        )
        .await
        .expect("success");
        assert_eq!((value, attempts), (7, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_on_final_allowed_attempt() {
        let (value, attempts) = execute(
            StageKind::Visual,
            &RetryPolicy::immediate(3),
            &CancellationToken::new(),
            |n| async move {
                if n < 3 {
                    Err(StageFailure::transient("upstream 503"))
                } else {
                    Ok("palette")
                }
            },
        )
        .await
        .expect("success on third attempt");
        assert_eq!((value, attempts), ("palette", 3));
    }

    #[tokio::test]
    async fn exhausted_transient_failures_report_last_message() {
        let err = execute(
            StageKind::Copywriter,
            &RetryPolicy::immediate(2),
            &CancellationToken::new(),
            |n| async move { Err::<(), _>(StageFailure::transient(format!("boom {n}"))) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, StageErrorKind::TransientExhausted);
        assert_eq!(err.attempts, 2);
        assert_eq!(err.message, "boom 2");
        assert_eq!(err.stage, StageKind::Copywriter);
    }

    #[tokio::test]
    async fn rejection_short_circuits() {
        let calls = counting();
        let c = calls.clone();
        let err = execute(
            StageKind::Integration,
            &RetryPolicy::immediate(5),
            &CancellationToken::new(),
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StageFailure::rejected("card declined permanently")) }
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, StageErrorKind::Rejected);
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out() {
        let policy = RetryPolicy::immediate(2).with_attempt_timeout(Duration::from_secs(5));
        let err = execute(
            StageKind::Visual,
            &policy,
            &CancellationToken::new(),
            |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, StageFailure>(())
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, StageErrorKind::Timeout);
        assert_eq!(err.attempts, 2);
        assert!(err.message.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(30),
            multiplier: 1.0,
            attempt_timeout: Duration::from_secs(5),
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let calls = counting();
        let c = calls.clone();

        let err = execute(StageKind::Architect, &policy, &cancel, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(StageFailure::transient("rate limited")) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind, StageErrorKind::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!err.message.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_running_attempt() {
        let policy = RetryPolicy::immediate(3).with_attempt_timeout(Duration::from_secs(900));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let started = tokio::time::Instant::now();

        let err = execute(StageKind::Copywriter, &policy, &cancel, |_| async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok::<_, StageFailure>("late copy")
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind, StageErrorKind::Cancelled);
        assert_eq!(err.attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(3),
            multiplier: 2.0,
            attempt_timeout: Duration::from_secs(10),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(4), Duration::from_secs(3));
        assert_eq!(policy.backoff_for(40), Duration::from_secs(3));
    }

    #[test]
    fn policy_from_config_validates() {
        let mut config = RetryConfig::default();
        let policy = RetryPolicy::try_from(&config).expect("default config is valid");
        assert_eq!(policy, RetryPolicy::default());

        config.max_attempts = 0;
        assert!(RetryPolicy::try_from(&config).is_err());

        config.max_attempts = 2;
        config.backoff_multiplier = 0.5;
        assert!(RetryPolicy::try_from(&config).is_err());
    }
}
