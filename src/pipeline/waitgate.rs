//! Bounded polling gate
//!
//! Waits for an external condition (a binary appearing on PATH, a lock
//! being released) at a fixed interval, up to an explicit deadline.
//! Unbounded waits are a latent availability bug; every gate here times
//! out rather than hanging forever, and the caller decides whether a
//! timeout is fatal.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::ProvisionError;

/// Reference poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The condition became true within the deadline
    Ready,
    /// The deadline elapsed first
    Timeout,
}

impl WaitOutcome {
    /// Map a timeout to a fatal error for callers that require readiness.
    pub fn ok_or_timeout(self, what: &str, deadline: Duration) -> Result<(), ProvisionError> {
        match self {
            Self::Ready => Ok(()),
            Self::Timeout => Err(ProvisionError::WaitTimeout {
                what: what.to_string(),
                seconds: deadline.as_secs(),
            }),
        }
    }
}

/// Poll `predicate` at `poll_interval` until it returns true or `deadline`
/// elapses.
///
/// Returns within one poll interval of the deadline. Cancellable: dropping
/// the returned future (e.g. when the pipeline deadline fires) stops the
/// polling.
pub async fn wait_for<F, Fut>(
    what: &str,
    mut predicate: F,
    poll_interval: Duration,
    deadline: Duration,
) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = Instant::now();
    loop {
        if predicate().await {
            debug!("Condition ready: {}", what);
            return WaitOutcome::Ready;
        }
        if started.elapsed() >= deadline {
            debug!("Gave up waiting for {} after {:?}", what, deadline);
            return WaitOutcome::Timeout;
        }
        sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn test_immediately_true_predicate() {
        let outcome = wait_for(
            "nothing",
            || async { true },
            Duration::from_millis(10),
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(outcome, WaitOutcome::Ready);
    }

    #[tokio::test]
    async fn test_timeout_bounds() {
        let deadline = Duration::from_millis(45);
        let interval = Duration::from_millis(10);

        let started = StdInstant::now();
        let outcome = wait_for("never", || async { false }, interval, deadline).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, WaitOutcome::Timeout);
        assert!(elapsed >= deadline, "returned before deadline: {elapsed:?}");
        // No more than one poll interval past the deadline, plus scheduling slack
        assert!(
            elapsed < deadline + interval + Duration::from_millis(50),
            "returned too long after deadline: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_ready_after_n_polls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_pred = calls.clone();

        let outcome = wait_for(
            "third time",
            move || {
                let calls = calls_in_pred.clone();
                async move { calls.fetch_add(1, Ordering::SeqCst) >= 2 }
            },
            Duration::from_millis(5),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(outcome, WaitOutcome::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_timeout_maps_to_error() {
        let err = WaitOutcome::Timeout
            .ok_or_timeout("docker binary", Duration::from_secs(30))
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::WaitTimeout { ref what, seconds: 30 } if what == "docker binary"
        ));
        assert!(
            WaitOutcome::Ready
                .ok_or_timeout("docker binary", Duration::from_secs(30))
                .is_ok()
        );
    }
}
