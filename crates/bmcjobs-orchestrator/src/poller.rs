//! Job polling
//!
//! Polls a job resource at a fixed interval until it reaches a terminal
//! state, the job deadline passes, or the mutation is cancelled.

use bmcjobs_redfish::{JobState, JobStatus, RedfishError, RedfishService};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{next_wait, sleep_unless_cancelled, Clock};
use crate::error::{MutationError, Phase, Result};
use crate::submit::JobHandle;

/// Result of a job that completed successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: String,
    pub final_status: JobStatus,
    pub polls: u32,
    /// Time from submission until the terminal state was observed
    pub elapsed: Duration,
}

/// Waits for a job to finish
pub struct JobPoller<'a> {
    service: &'a dyn RedfishService,
    clock: &'a dyn Clock,
    cancel: &'a CancellationToken,
}

impl<'a> JobPoller<'a> {
    pub fn new(
        service: &'a dyn RedfishService,
        clock: &'a dyn Clock,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            service,
            clock,
            cancel,
        }
    }

    fn transport(&self, job: &str, source: RedfishError) -> MutationError {
        MutationError::Transport {
            endpoint: self.service.endpoint().to_string(),
            phase: Phase::JobPoll,
            resource: job.to_string(),
            job: Some(job.to_string()),
            source,
        }
    }

    fn cancelled(&self, job: &str) -> MutationError {
        MutationError::Cancelled {
            endpoint: self.service.endpoint().to_string(),
            phase: Phase::JobPoll,
            job: Some(job.to_string()),
        }
    }

    async fn fetch(&self, job: &str) -> Result<JobStatus> {
        let document = self
            .service
            .get_json(job)
            .await
            .map_err(|e| self.transport(job, e))?;

        JobStatus::from_value(&document).ok_or_else(|| {
            self.transport(
                job,
                RedfishError::InvalidResponse {
                    uri: job.to_string(),
                    reason: "job document has neither TaskState nor JobState".to_string(),
                },
            )
        })
    }

    /// Poll `handle` until it finishes.
    ///
    /// `on_status` sees every parsed status, terminal or not. The first poll
    /// is immediate; each later poll waits the handle's interval (at least
    /// one second), clamped so no wait overshoots the deadline.
    pub async fn wait<F>(&self, handle: &JobHandle, mut on_status: F) -> Result<JobOutcome>
    where
        F: FnMut(&JobStatus) + Send,
    {
        let endpoint = self.service.endpoint();
        let job = handle.id.as_str();
        let deadline = handle.deadline();
        let mut polls = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(job));
            }

            let status = self.fetch(job).await?;
            polls += 1;
            debug!(
                endpoint,
                job,
                state = %status.raw_state,
                percent = ?status.percent_complete,
                polls,
                "Polled job"
            );
            on_status(&status);

            let now = self.clock.now();
            match status.state {
                JobState::Completed => {
                    let elapsed = now.saturating_duration_since(handle.started);
                    info!(endpoint, job, polls, elapsed = ?elapsed, "Job completed");
                    return Ok(JobOutcome {
                        job_id: handle.id.clone(),
                        final_status: status,
                        polls,
                        elapsed,
                    });
                }
                JobState::Failed => {
                    let message = status
                        .message
                        .clone()
                        .unwrap_or_else(|| format!("job ended in state {}", status.raw_state));
                    warn!(endpoint, job, message = %message, "Job failed");
                    return Err(MutationError::JobFailed {
                        endpoint: endpoint.to_string(),
                        job: handle.id.clone(),
                        message,
                    });
                }
                JobState::Running => {}
            }

            if deadline.is_some_and(|deadline| now >= deadline) {
                warn!(endpoint, job, timeout = ?handle.timeout, "Job did not finish in time");
                return Err(MutationError::JobTimedOut {
                    endpoint: endpoint.to_string(),
                    job: handle.id.clone(),
                    timeout: handle.timeout,
                });
            }

            let wait = next_wait(handle.poll_interval, deadline, now);
            if !sleep_unless_cancelled(self.clock, self.cancel, wait).await {
                return Err(self.cancelled(job));
            }
        }
    }
}
