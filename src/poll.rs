//! Bounded readiness polling.
//!
//! Providers report a freshly created instance through their describe
//! primitive; [`await_ready`] drives that primitive until a caller-supplied
//! predicate holds or the attempt budget is exhausted. The interval is
//! constant: bootstrap latencies are short enough that backoff buys nothing,
//! and a provider that is permanently broken surfaces the same way as one
//! that is merely slow.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

/// Tunable attempt budget and interval for one readiness poll.
///
/// Each provider adapter binds its own policy; none of these values are
/// hard-coded into the loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Total describe invocations allowed, including the first.
    pub max_attempts: u32,
    /// Constant pause between consecutive describe invocations.
    pub interval: Duration,
}

impl PollPolicy {
    /// Creates a policy from an attempt budget and interval.
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// Errors raised while polling for readiness.
#[derive(Debug, Error, PartialEq)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when a status check itself fails; aborts the poll immediately.
    #[error("status check failed: {0}")]
    Describe(#[source] E),
    /// Raised when the attempt budget is exhausted without a ready snapshot.
    #[error("not ready after {attempts} status checks")]
    Timeout {
        /// Number of describe invocations performed.
        attempts: u32,
    },
}

/// Repeatedly invokes `describe` until `ready` holds for the returned
/// snapshot, sleeping `policy.interval` between attempts.
///
/// The first satisfying snapshot is returned immediately, with no trailing
/// delay. Exactly `policy.max_attempts` describe invocations are made in the
/// worst case. Describe failures are not retried; only "not ready yet"
/// consumes attempts.
///
/// # Errors
///
/// Returns [`PollError::Describe`] when a status check fails and
/// [`PollError::Timeout`] when the budget is exhausted.
pub async fn await_ready<T, E, F, Fut, P>(
    policy: PollPolicy,
    mut describe: F,
    ready: P,
) -> Result<T, PollError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
{
    let mut attempts = 0_u32;
    while attempts < policy.max_attempts {
        let snapshot = describe().await.map_err(PollError::Describe)?;
        attempts += 1;
        if ready(&snapshot) {
            return Ok(snapshot);
        }
        tracing::debug!(attempt = attempts, budget = policy.max_attempts, "instance not ready yet");
        if attempts < policy.max_attempts {
            sleep(policy.interval).await;
        }
    }
    Err(PollError::Timeout { attempts })
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
    #[error("describe exploded")]
    struct DescribeFailure;

    #[tokio::test]
    async fn returns_first_ready_snapshot_without_extra_describe_calls() {
        let calls = AtomicU32::new(0);
        // A deliberately long interval: any sleep would stall the test run,
        // so completion proves the ready path returns without delay.
        let policy = PollPolicy::new(5, Duration::from_secs(60));
        let result = await_ready(
            policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Infallible>("running") }
            },
            |state| *state == "running",
        )
        .await;
        assert_eq!(result, Ok("running"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_exactly_the_attempt_budget() {
        let calls = AtomicU32::new(0);
        let policy = PollPolicy::new(3, Duration::from_millis(1));
        let result = await_ready(
            policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Infallible>("starting") }
            },
            |state| *state == "running",
        )
        .await;
        assert_eq!(result, Err(PollError::Timeout { attempts: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn becomes_ready_partway_through_the_budget() {
        let calls = AtomicU32::new(0);
        let policy = PollPolicy::new(10, Duration::from_millis(1));
        let result = await_ready(
            policy,
            || {
                let seen = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, Infallible>(if seen >= 2 { "running" } else { "starting" }) }
            },
            |state| *state == "running",
        )
        .await;
        assert_eq!(result, Ok("running"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn describe_failure_aborts_without_retry() {
        let calls = AtomicU32::new(0);
        let policy = PollPolicy::new(4, Duration::from_millis(1));
        let result: Result<&str, PollError<DescribeFailure>> = await_ready(
            policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DescribeFailure) }
            },
            |_snapshot: &&str| false,
        )
        .await;
        assert_eq!(result, Err(PollError::Describe(DescribeFailure)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_budget_times_out_without_describing() {
        let calls = AtomicU32::new(0);
        let policy = PollPolicy::new(0, Duration::from_millis(1));
        let result: Result<&str, PollError<DescribeFailure>> = await_ready(
            policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("running") }
            },
            |_snapshot: &&str| true,
        )
        .await;
        assert_eq!(result, Err(PollError::Timeout { attempts: 0 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
