//! Fixed-interval polling for long-running provider jobs.

use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Delay between attempts plus the number of attempts still allowed.
///
/// Owned by a single poll; it only ever counts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    delay: Duration,
    attempts_remaining: u32,
}

impl RetryBudget {
    pub fn new(delay: Duration, max_attempts: NonZeroU32) -> Self {
        Self {
            delay,
            attempts_remaining: max_attempts.get(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    /// Charges one failed attempt. Returns `false` once nothing is left.
    fn charge(&mut self) -> bool {
        self.attempts_remaining = self.attempts_remaining.saturating_sub(1);
        self.attempts_remaining > 0
    }
}

#[derive(Debug, Error)]
pub enum PollError<E> {
    /// Every permitted attempt failed. `last_error` is the final attempt's
    /// failure, kept for diagnostics.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: E },
    #[error("poll cancelled")]
    Cancelled,
}

/// Calls `attempt` until it succeeds or the budget runs out.
///
/// Between failed attempts the flow sleeps for the budget's delay. No delay
/// follows the final failure. `cancel` is observed while an attempt is in
/// flight and while sleeping.
pub async fn poll_until_ready<F, Fut, T, E>(
    mut attempt: F,
    mut budget: RetryBudget,
    cancel: &CancellationToken,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0u32;
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            outcome = attempt() => outcome,
        };
        attempts += 1;

        let last_error = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !budget.charge() {
            return Err(PollError::RetriesExhausted {
                attempts,
                last_error,
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(budget.delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn budget(delay_ms: u64, attempts: u32) -> RetryBudget {
        RetryBudget::new(
            Duration::from_millis(delay_ms),
            NonZeroU32::new(attempts).unwrap(),
        )
    }

    /// Paused-clock sleeps land on millisecond ticks; allow for rounding.
    fn assert_slept(elapsed: Duration, expected: Duration) {
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "expected ~{expected:?} of sleeping, got {elapsed:?}"
        );
    }

    /// Fails the first `failures` calls, then yields `value`.
    fn flaky(
        failures: u32,
        value: u32,
    ) -> (
        Arc<AtomicU32>,
        impl FnMut() -> std::future::Ready<Result<u32, String>>,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let attempt = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                std::future::ready(Err(format!("not ready ({n})")))
            } else {
                std::future::ready(Ok(value))
            }
        };
        (calls, attempt)
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_does_not_sleep() {
        let (calls, attempt) = flaky(0, 7);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let value = poll_until_ready(attempt, budget(1000, 3), &cancel)
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_slept(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn fail_fail_succeed_sleeps_twice() {
        let (calls, attempt) = flaky(2, 42);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let value = poll_until_ready(attempt, budget(1000, 3), &cancel)
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_slept(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_makes_every_attempt_without_trailing_delay() {
        let (calls, attempt) = flaky(u32::MAX, 0);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let err = poll_until_ready(attempt, budget(250, 4), &cancel)
            .await
            .unwrap_err();

        match err {
            PollError::RetriesExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error, "not ready (4)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_slept(started.elapsed(), Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_budget_fails_immediately() {
        let (calls, attempt) = flaky(u32::MAX, 0);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let err = poll_until_ready(attempt, budget(1000, 1), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PollError::RetriesExhausted { attempts: 1, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_slept(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_delay_stops_before_next_attempt() {
        let (calls, attempt) = flaky(1, 99);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            trigger.cancel();
        });

        let err = poll_until_ready(attempt, budget(1000, 5), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_inflight_attempt_surfaces_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = poll_until_ready(
            || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<u32, String>(1)
            },
            budget(1000, 3),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Cancelled));
    }

    #[test]
    fn budget_counts_down_to_zero() {
        let mut budget = budget(10, 2);
        assert_eq!(budget.attempts_remaining(), 2);
        assert!(budget.charge());
        assert_eq!(budget.attempts_remaining(), 1);
        assert!(!budget.charge());
        assert_eq!(budget.attempts_remaining(), 0);
        assert!(!budget.charge());
        assert_eq!(budget.attempts_remaining(), 0);
    }
}
