//! Mutation submission
//!
//! A controller acknowledges an asynchronous change with `202 Accepted`
//! and a `Location` header naming the job. Anything else is a failed
//! submission. Submission is attempted exactly once.

use bmcjobs_redfish::{RedfishResponse, RedfishService};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::clock::{deadline_after, Clock};
use crate::error::{MutationError, Phase, Result};

/// HTTP method of a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationMethod {
    /// Create a member of a collection
    Post,
    /// Update an entity or its settings resource
    Patch,
    /// Delete an entity
    Delete,
}

impl std::fmt::Display for MutationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationMethod::Post => write!(f, "POST"),
            MutationMethod::Patch => write!(f, "PATCH"),
            MutationMethod::Delete => write!(f, "DELETE"),
        }
    }
}

/// Handle to a job accepted by the controller
#[derive(Debug, Clone)]
pub struct JobHandle {
    /// Job URI from the `Location` header
    pub id: String,
    /// Wall-clock submission time
    pub submitted_at: DateTime<Utc>,
    /// Monotonic submission time from the orchestration clock
    pub started: Instant,
    /// Interval between polls
    pub poll_interval: Duration,
    /// Time allowed for the job to finish, measured from `started`
    pub timeout: Duration,
}

impl JobHandle {
    /// Instant after which the job counts as timed out; `None` when the
    /// timeout is too large to represent, meaning no deadline
    pub fn deadline(&self) -> Option<Instant> {
        deadline_after(self.started, self.timeout)
    }
}

/// Issue one mutation request and extract the job handle
pub async fn submit(
    service: &dyn RedfishService,
    clock: &dyn Clock,
    method: MutationMethod,
    target: &str,
    body: Option<&Value>,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<JobHandle> {
    let endpoint = service.endpoint();
    let empty = Value::Object(Default::default());
    let body = body.unwrap_or(&empty);

    let response = match method {
        MutationMethod::Post => service.post(target, body).await,
        MutationMethod::Patch => service.patch(target, body).await,
        MutationMethod::Delete => service.delete(target).await,
    }
    .map_err(|source| MutationError::Transport {
        endpoint: endpoint.to_string(),
        phase: Phase::Submission,
        resource: target.to_string(),
        job: None,
        source,
    })?;

    let job = accepted_job(endpoint, target, &response)?;
    info!(endpoint, method = %method, target, job = %job, "Mutation accepted");

    Ok(JobHandle {
        id: job,
        submitted_at: Utc::now(),
        started: clock.now(),
        poll_interval,
        timeout,
    })
}

fn accepted_job(endpoint: &str, target: &str, response: &RedfishResponse) -> Result<String> {
    if response.status != 202 {
        let message = response.error_message().unwrap_or_else(|| {
            let body = String::from_utf8_lossy(&response.body).trim().to_string();
            if body.is_empty() {
                "no error details".to_string()
            } else {
                body
            }
        });
        warn!(endpoint, target, status = response.status, message = %message, "Mutation rejected");
        return Err(MutationError::SubmissionRejected {
            endpoint: endpoint.to_string(),
            resource: target.to_string(),
            status: response.status,
            message,
        });
    }

    match response.location() {
        Some(location) => Ok(location.to_string()),
        None => {
            warn!(endpoint, target, "Mutation accepted without a job location");
            Err(MutationError::MissingJobLocation {
                endpoint: endpoint.to_string(),
                resource: target.to_string(),
            })
        }
    }
}
