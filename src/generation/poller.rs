//! Poll Loop
//!
//! The orchestrator owns the wait for vendor tasks: a fixed-interval,
//! bounded-attempt loop. There is no backoff and no cancellation; a task
//! that is not terminal when the budget runs out is reported as a per-item
//! timeout. A poll request that itself fails (transport hiccup) consumes
//! one attempt and the loop keeps going.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::vendor::{GenerationVendor, TaskHandle, TaskState, VendorError};
use crate::metrics;

/// Poll cadence and budget
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Delay between polls
    pub interval: Duration,

    /// Maximum number of polls before the task counts as timed out
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 40,
        }
    }
}

impl PollPolicy {
    /// Set the delay between polls
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the attempt budget
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

/// Poll `task` until it reaches a terminal state, within `policy`'s budget.
///
/// Returns the result URL of a finished task. A `failed` task, a finished
/// task without a result URL, and an exhausted budget are all per-item
/// errors for the caller's envelope.
pub async fn poll_to_completion(
    vendor: &dyn GenerationVendor,
    task: &TaskHandle,
    policy: &PollPolicy,
) -> Result<String, VendorError> {
    for attempt in 1..=policy.max_attempts {
        sleep(policy.interval).await;

        let poll = match vendor.poll(task).await {
            Ok(poll) => poll,
            Err(e) => {
                // A failed poll request consumes an attempt; the task may
                // still finish on a later poll.
                warn!(
                    task_id = %task.task_id,
                    attempt,
                    error = %e,
                    "poll request failed"
                );
                continue;
            }
        };

        debug!(task_id = %task.task_id, attempt, status = ?poll.status, "polled task");

        match poll.status {
            TaskState::Pending | TaskState::Processing => {}
            TaskState::Done => {
                return poll.result_url.ok_or(VendorError::MissingResult {
                    task_id: task.task_id.clone(),
                });
            }
            TaskState::Failed => {
                return Err(VendorError::TaskFailed {
                    task_id: task.task_id.clone(),
                    reason: poll.error.unwrap_or_else(|| "unspecified".to_string()),
                });
            }
        }
    }

    metrics::POLL_TIMEOUTS_TOTAL.inc();
    Err(VendorError::PollTimeout {
        task_id: task.task_id.clone(),
        attempts: policy.max_attempts,
    })
}
