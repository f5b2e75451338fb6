//! State Poller
//!
//! Queries the status client at a fixed interval until the target state is
//! observed, the wait budget is spent, or the caller cancels.
//!
//! Elapsed time is counted in whole intervals, not wall-clock time: a slow
//! status query does not eat into the budget, so the real wait can exceed
//! `max_wait` by the accumulated query latency. With the default 15s / 240s
//! the poller performs at most 16 queries.

use crate::error::PollError;
use crate::instance::{LifecycleState, StatusClient};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Smallest accepted interval; a zero interval would never advance
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Fixed-interval polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    interval: Duration,
    max_wait: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            max_wait,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Upper bound on status queries for one wait
    pub fn max_queries(&self) -> u32 {
        let interval = self.interval.as_nanos();
        self.max_wait.as_nanos().div_ceil(interval) as u32
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(15), Duration::from_secs(240))
    }
}

/// Waits for a container instance to reach a lifecycle state
pub struct StatePoller<'a> {
    status: &'a dyn StatusClient,
    config: PollConfig,
}

impl<'a> StatePoller<'a> {
    pub fn new(status: &'a dyn StatusClient, config: PollConfig) -> Self {
        Self { status, config }
    }

    /// Poll until `target` is observed. Returns the observed state, or why
    /// it was not reached.
    pub async fn wait_for(
        &self,
        resource_id: &str,
        target: &LifecycleState,
        cancel: &CancellationToken,
    ) -> Result<LifecycleState, PollError> {
        let mut elapsed = Duration::ZERO;
        let mut last: Option<LifecycleState> = None;
        tracing::debug!(
            max_queries = self.config.max_queries(),
            "Waiting for {} to become {}",
            resource_id,
            target
        );

        while elapsed < self.config.max_wait {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled {
                    target: target.clone(),
                    last,
                });
            }

            let current = self.status.lifecycle_state(resource_id).await?;
            tracing::info!(
                current = %current,
                target = %target,
                elapsed_secs = elapsed.as_secs(),
                "Current state: {} | Target: {} | Elapsed: {}s",
                current,
                target,
                elapsed.as_secs()
            );

            if &current == target {
                return Ok(current);
            }
            last = Some(current);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Wait for {} cancelled", target);
                    return Err(PollError::Cancelled {
                        target: target.clone(),
                        last,
                    });
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
            elapsed += self.config.interval;
        }

        Err(PollError::Timeout {
            target: target.clone(),
            max_wait: self.config.max_wait,
            last,
        })
    }
}
