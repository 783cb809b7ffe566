//! Power reset coordination for OnReset changes
//!
//! An OnReset change is staged by the controller and only committed when
//! the host restarts. The coordinator requests the reset and waits for the
//! host to report `On` again.

use bmcjobs_redfish::{PowerState, RedfishError, RedfishService, ResetType};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{deadline_after, next_wait, sleep_unless_cancelled, Clock};
use crate::error::{MutationError, Phase, Result};
use crate::settings::{DEFAULT_RESET_POLL_INTERVAL, DEFAULT_RESET_TIMEOUT};

/// Reset parameters for one OnReset mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetRequest {
    /// Requested reset type
    pub reset_type: ResetType,
    /// Time allowed for the host to come back
    pub timeout: Duration,
    /// Interval between power-state polls
    pub poll_interval: Duration,
}

impl Default for ResetRequest {
    fn default() -> Self {
        Self::new(ResetType::default())
    }
}

impl ResetRequest {
    /// Reset with the default timeout and poll interval
    pub fn new(reset_type: ResetType) -> Self {
        Self {
            reset_type,
            timeout: DEFAULT_RESET_TIMEOUT,
            poll_interval: DEFAULT_RESET_POLL_INTERVAL,
        }
    }

    /// Set the reset timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the power-state poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Result of a completed reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetOutcome {
    /// Reset type actually sent to the controller
    pub issued: ResetType,
    /// Power-state polls after the reset request
    pub polls: u32,
    /// Time from the reset request until the host reported on
    pub elapsed: Duration,
}

/// Drives a host reset and waits for the host to come back
pub struct PowerResetCoordinator<'a> {
    service: &'a dyn RedfishService,
    clock: &'a dyn Clock,
    cancel: &'a CancellationToken,
}

impl<'a> PowerResetCoordinator<'a> {
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
            phase: Phase::Reset,
            resource: "host power".to_string(),
            job: Some(job.to_string()),
            source,
        }
    }

    fn cancelled(&self, job: &str) -> MutationError {
        MutationError::Cancelled {
            endpoint: self.service.endpoint().to_string(),
            phase: Phase::Reset,
            job: Some(job.to_string()),
        }
    }

    /// Reset the host and wait until it reports `On`.
    ///
    /// `job` is the job staged by the preceding submission. On failure it is
    /// left outstanding on the controller and named in the error.
    pub async fn reset_and_wait(&self, request: &ResetRequest, job: &str) -> Result<ResetOutcome> {
        let endpoint = self.service.endpoint();

        let current = self
            .service
            .power_state()
            .await
            .map_err(|e| self.transport(job, e))?;

        // Controllers refuse to restart a host that is off
        let issued = if current == PowerState::Off && request.reset_type.is_restart() {
            info!(endpoint, requested = %request.reset_type, "Host is off, powering on instead");
            ResetType::On
        } else {
            request.reset_type
        };

        if self.cancel.is_cancelled() {
            return Err(self.cancelled(job));
        }
        self.service
            .reset(issued)
            .await
            .map_err(|e| self.transport(job, e))?;
        info!(endpoint, reset_type = %issued, job, "Reset requested, waiting for host");

        let started = self.clock.now();
        let deadline = deadline_after(started, request.timeout);
        let mut polls = 0u32;
        let mut now = started;

        // The host still reports On until a restart takes effect, so the
        // first power check waits one interval
        loop {
            let wait = next_wait(request.poll_interval, deadline, now);
            if !sleep_unless_cancelled(self.clock, self.cancel, wait).await {
                return Err(self.cancelled(job));
            }

            let state = self
                .service
                .power_state()
                .await
                .map_err(|e| self.transport(job, e))?;
            polls += 1;
            debug!(endpoint, power_state = %state, polls, "Polled host power state");

            now = self.clock.now();
            if state == PowerState::On {
                let elapsed = now.saturating_duration_since(started);
                info!(endpoint, elapsed = ?elapsed, "Host is back on");
                return Ok(ResetOutcome {
                    issued,
                    polls,
                    elapsed,
                });
            }

            if deadline.is_some_and(|deadline| now >= deadline) {
                warn!(endpoint, job, last_state = %state, "Host did not come back before reset timeout");
                return Err(MutationError::ResetTimeout {
                    endpoint: endpoint.to_string(),
                    job: job.to_string(),
                    timeout: request.timeout,
                    last_state: state,
                });
            }
        }
    }
}
