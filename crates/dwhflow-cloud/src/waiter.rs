//! Readiness polling
//!
//! Polls a remote status on a fixed interval until it reaches the goal, a
//! terminal failure is observed, the maximum wait elapses, or the caller
//! cancels. Sleeping happens on the tokio timer, so waiting never blocks
//! other tasks and cancellation is observed between polls.

use crate::error::{ErrorClass, RemoteErrorKind};
use crate::idempotent::{Operation, classify};
use crate::provider::RemoteResult;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Polling configuration
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Delay between two status reads
    pub poll_interval: Duration,

    /// Give up after this much time
    pub max_wait: Duration,

    /// Log the current status at info level this often
    pub report_every: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(30 * 60),
            report_every: Duration::from_secs(30),
        }
    }
}

impl WaitConfig {
    pub fn new(poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            poll_interval,
            max_wait,
            ..Default::default()
        }
    }
}

/// What the waiter is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitGoal {
    /// The probe reports `Ready`
    Condition,
    /// The resource disappears; a not-found read counts as ready
    Deletion,
}

/// Result of a single status read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<S> {
    Ready(S),
    Pending(S),
    /// Terminal failure, polling further is pointless
    Failed(S),
}

/// How a wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<S> {
    /// Goal reached; `status` is `None` when a deletion completed
    Ready {
        status: Option<S>,
        polls: u32,
        elapsed: Duration,
    },
    TimedOut {
        last_status: Option<S>,
        polls: u32,
        elapsed: Duration,
    },
    ObservedTerminalFailure { status: String, polls: u32 },
    Cancelled { polls: u32 },
}

impl<S> WaitOutcome<S> {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready { .. })
    }

    pub fn polls(&self) -> u32 {
        match self {
            WaitOutcome::Ready { polls, .. }
            | WaitOutcome::TimedOut { polls, .. }
            | WaitOutcome::ObservedTerminalFailure { polls, .. }
            | WaitOutcome::Cancelled { polls } => *polls,
        }
    }
}

/// Fixed-interval status poller
#[derive(Debug, Clone)]
pub struct Waiter {
    config: WaitConfig,
    cancel: CancellationToken,
}

impl Waiter {
    pub fn new(config: WaitConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Poll `probe` until the goal holds.
    ///
    /// Each poll performs exactly one status read. A not-found read while
    /// waiting for deletion is `Ready`; a transient read failure is logged and
    /// polled again; any other read failure ends the wait as a terminal failure.
    pub async fn wait_until<S, F, Fut>(
        &self,
        what: &str,
        goal: WaitGoal,
        mut probe: F,
    ) -> WaitOutcome<S>
    where
        S: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<Probe<S>>>,
    {
        let started = Instant::now();
        let mut polls = 0u32;
        let mut last_status: Option<S> = None;
        let mut last_report = Duration::ZERO;

        if self.cancel.is_cancelled() {
            return WaitOutcome::Cancelled { polls };
        }

        loop {
            polls += 1;

            match probe().await {
                Ok(Probe::Ready(status)) => {
                    let elapsed = started.elapsed();
                    tracing::info!(
                        target_resource = %what,
                        status = %status,
                        elapsed_s = elapsed.as_secs(),
                        polls = polls,
                        "Ready"
                    );
                    return WaitOutcome::Ready {
                        status: Some(status),
                        polls,
                        elapsed,
                    };
                }
                Ok(Probe::Failed(status)) => {
                    tracing::error!(
                        target_resource = %what,
                        status = %status,
                        "Terminal status observed"
                    );
                    return WaitOutcome::ObservedTerminalFailure {
                        status: status.to_string(),
                        polls,
                    };
                }
                Ok(Probe::Pending(status)) => {
                    tracing::debug!(
                        target_resource = %what,
                        status = %status,
                        polls = polls,
                        "Not ready yet"
                    );
                    last_status = Some(status);
                }
                Err(err) if goal == WaitGoal::Deletion && err.kind == RemoteErrorKind::NotFound => {
                    let elapsed = started.elapsed();
                    tracing::info!(
                        target_resource = %what,
                        elapsed_s = elapsed.as_secs(),
                        "Deleted"
                    );
                    return WaitOutcome::Ready {
                        status: None,
                        polls,
                        elapsed,
                    };
                }
                Err(err) => match classify(Operation::Describe, &err) {
                    ErrorClass::Transient => {
                        tracing::warn!(
                            target_resource = %what,
                            error = %err,
                            "Status read failed, polling again"
                        );
                    }
                    _ => {
                        tracing::error!(target_resource = %what, error = %err, "Status read failed");
                        return WaitOutcome::ObservedTerminalFailure {
                            status: err.to_string(),
                            polls,
                        };
                    }
                },
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.max_wait {
                tracing::warn!(
                    target_resource = %what,
                    elapsed_s = elapsed.as_secs(),
                    polls = polls,
                    "Gave up waiting"
                );
                return WaitOutcome::TimedOut {
                    last_status,
                    polls,
                    elapsed,
                };
            }

            if elapsed >= last_report + self.config.report_every {
                last_report = elapsed;
                if let Some(status) = &last_status {
                    tracing::info!(
                        target_resource = %what,
                        status = %status,
                        elapsed_s = elapsed.as_secs(),
                        "Still waiting"
                    );
                }
            }

            // Never sleep past the deadline; the last read happens right at it
            let pause = self
                .config
                .poll_interval
                .min(self.config.max_wait.saturating_sub(elapsed));
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::warn!(target_resource = %what, polls = polls, "Wait cancelled");
                    return WaitOutcome::Cancelled { polls };
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn scripted(
        script: Vec<RemoteResult<Probe<&'static str>>>,
    ) -> impl FnMut() -> std::future::Ready<RemoteResult<Probe<&'static str>>> {
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        move || {
            let next = script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Probe::Pending("creating")));
            std::future::ready(next)
        }
    }

    fn waiter(poll: u64, max: u64) -> Waiter {
        Waiter::new(
            WaitConfig::new(Duration::from_secs(poll), Duration::from_secs(max)),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_three_polls() {
        let probe = scripted(vec![
            Ok(Probe::Pending("creating")),
            Ok(Probe::Pending("creating")),
            Ok(Probe::Ready("available")),
        ]);

        let outcome = waiter(2, 60)
            .wait_until("dwhcluster", WaitGoal::Condition, probe)
            .await;

        match outcome {
            WaitOutcome::Ready {
                status,
                polls,
                elapsed,
            } => {
                assert_eq!(status, Some("available"));
                assert_eq!(polls, 3);
                assert!(elapsed >= Duration::from_secs(4));
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_available_times_out() {
        let probe = scripted(vec![]);

        let outcome = waiter(2, 10)
            .wait_until("dwhcluster", WaitGoal::Condition, probe)
            .await;

        match outcome {
            WaitOutcome::TimedOut {
                last_status,
                elapsed,
                ..
            } => {
                assert_eq!(last_status, Some("creating"));
                assert!(elapsed >= Duration::from_secs(10));
            }
            other => panic!("expected TimedOut, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_overshoot_max_wait() {
        let probe = scripted(vec![]);

        let outcome = waiter(10, 15)
            .wait_until("dwhcluster", WaitGoal::Condition, probe)
            .await;

        match outcome {
            WaitOutcome::TimedOut { polls, elapsed, .. } => {
                // Reads at 0s, 10s and a final one at the 15s deadline
                assert_eq!(polls, 3);
                assert!(elapsed >= Duration::from_secs(15));
                assert!(elapsed < Duration::from_secs(16));
            }
            other => panic!("expected TimedOut, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_during_deletion_is_ready() {
        let probe = scripted(vec![
            Ok(Probe::Pending("deleting")),
            Err(RemoteError::not_found("Cluster dwhcluster not found.")),
        ]);

        let outcome = waiter(10, 600)
            .wait_until("dwhcluster", WaitGoal::Deletion, probe)
            .await;

        match outcome {
            WaitOutcome::Ready {
                status,
                polls,
                elapsed,
            } => {
                assert_eq!(status, None);
                assert_eq!(polls, 2);
                assert!(elapsed >= Duration::from_secs(10));
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_while_waiting_for_availability_is_terminal() {
        let probe = scripted(vec![Err(RemoteError::not_found("Cluster dwhcluster not found."))]);

        let outcome = waiter(2, 60)
            .wait_until("dwhcluster", WaitGoal::Condition, probe)
            .await;

        assert!(matches!(
            outcome,
            WaitOutcome::ObservedTerminalFailure { polls: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_read_errors_keep_polling() {
        let probe = scripted(vec![
            Err(RemoteError::new(RemoteErrorKind::Throttled, "Rate exceeded")),
            Ok(Probe::Ready("available")),
        ]);

        let outcome = waiter(2, 60)
            .wait_until("dwhcluster", WaitGoal::Condition, probe)
            .await;

        assert!(outcome.is_ready());
        assert_eq!(outcome.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_stops_immediately() {
        let probe = scripted(vec![
            Ok(Probe::Pending("creating")),
            Ok(Probe::Failed("incompatible-network")),
        ]);

        let outcome = waiter(2, 60)
            .wait_until("dwhcluster", WaitGoal::Condition, probe)
            .await;

        assert_eq!(
            outcome,
            WaitOutcome::ObservedTerminalFailure {
                status: "incompatible-network".to_string(),
                polls: 2,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_between_polls() {
        let cancel = CancellationToken::new();
        let waiter = Waiter::new(
            WaitConfig::new(Duration::from_secs(10), Duration::from_secs(3600)),
            cancel.clone(),
        );

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let outcome = waiter
            .wait_until("dwhcluster", WaitGoal::Condition, scripted(vec![]))
            .await;
        canceller.await.unwrap();

        assert_eq!(outcome, WaitOutcome::Cancelled { polls: 3 });
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_poll() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let waiter = Waiter::new(WaitConfig::default(), cancel);

        let outcome = waiter
            .wait_until("dwhcluster", WaitGoal::Condition, scripted(vec![]))
            .await;
        assert_eq!(outcome, WaitOutcome::Cancelled { polls: 0 });
    }
}
