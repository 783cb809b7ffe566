//! Error types for mutation orchestration
//!
//! Every variant names the endpoint it concerns so a failed mutation can be
//! diagnosed from the error alone. Nothing here is retried internally.

use bmcjobs_redfish::{ApplyTime, PowerState, RedfishError};
use std::time::Duration;
use thiserror::Error;

/// Phase of a mutation in which an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the endpoint lock
    Lock,
    /// Querying and checking apply-time support
    Capability,
    /// Issuing the create/update/delete request
    Submission,
    /// Power reset and wait for the host
    Reset,
    /// Polling the job resource
    JobPoll,
    /// Locating the resulting entity
    Resolution,
    /// Reading an entity outside a mutation
    Read,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Lock => write!(f, "endpoint lock"),
            Phase::Capability => write!(f, "capability check"),
            Phase::Submission => write!(f, "submission"),
            Phase::Reset => write!(f, "reset"),
            Phase::JobPoll => write!(f, "job polling"),
            Phase::Resolution => write!(f, "entity resolution"),
            Phase::Read => write!(f, "read"),
        }
    }
}

fn list_apply_times(values: &[ApplyTime]) -> String {
    if values.is_empty() {
        return "none".to_string();
    }
    values
        .iter()
        .map(ApplyTime::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error type for mutation orchestration
#[derive(Debug, Error)]
pub enum MutationError {
    /// Requested apply time is not advertised by the controller
    #[error(
        "{resource} on {endpoint} does not support apply time {requested} (supported: {})",
        list_apply_times(.supported)
    )]
    CapabilityUnsupported {
        endpoint: String,
        resource: String,
        requested: ApplyTime,
        supported: Vec<ApplyTime>,
    },

    /// Controller answered the submission with something other than 202
    #[error("submission to {resource} on {endpoint} rejected with status {status}: {message}")]
    SubmissionRejected {
        endpoint: String,
        resource: String,
        status: u16,
        message: String,
    },

    /// Controller accepted the submission without a job location
    #[error("submission to {resource} on {endpoint} was accepted without a job Location header")]
    MissingJobLocation { endpoint: String, resource: String },

    /// Request could not be completed at the transport level
    #[error("{phase} request to {resource} on {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        phase: Phase,
        resource: String,
        /// Job submitted before the failure, still outstanding on the controller
        job: Option<String>,
        #[source]
        source: RedfishError,
    },

    /// Host did not come back within the reset timeout
    #[error(
        "host behind {endpoint} did not power on within {timeout:?} (last state: {last_state}); job {job} left outstanding"
    )]
    ResetTimeout {
        endpoint: String,
        job: String,
        timeout: Duration,
        last_state: PowerState,
    },

    /// Job ended in failure
    #[error("job {job} on {endpoint} failed: {message}")]
    JobFailed {
        endpoint: String,
        job: String,
        message: String,
    },

    /// Job did not reach a terminal state in time
    #[error("job {job} on {endpoint} did not finish within {timeout:?}")]
    JobTimedOut {
        endpoint: String,
        job: String,
        timeout: Duration,
    },

    /// No entity with the requested name
    #[error("no entity named '{name}' in {collection} on {endpoint}")]
    EntityNotFound {
        endpoint: String,
        collection: String,
        name: String,
    },

    /// More than one entity with the requested name
    #[error(
        "{} entities named '{name}' in {collection} on {endpoint}: {}",
        .matches.len(),
        .matches.join(", ")
    )]
    AmbiguousMatch {
        endpoint: String,
        collection: String,
        name: String,
        matches: Vec<String>,
    },

    /// Mutation was cancelled externally
    #[error("mutation on {endpoint} cancelled during {phase}")]
    Cancelled {
        endpoint: String,
        phase: Phase,
        job: Option<String>,
    },
}

impl MutationError {
    /// Endpoint the error concerns
    pub fn endpoint(&self) -> &str {
        match self {
            MutationError::CapabilityUnsupported { endpoint, .. }
            | MutationError::SubmissionRejected { endpoint, .. }
            | MutationError::MissingJobLocation { endpoint, .. }
            | MutationError::Transport { endpoint, .. }
            | MutationError::ResetTimeout { endpoint, .. }
            | MutationError::JobFailed { endpoint, .. }
            | MutationError::JobTimedOut { endpoint, .. }
            | MutationError::EntityNotFound { endpoint, .. }
            | MutationError::AmbiguousMatch { endpoint, .. }
            | MutationError::Cancelled { endpoint, .. } => endpoint,
        }
    }

    /// Phase the error occurred in
    pub fn phase(&self) -> Phase {
        match self {
            MutationError::CapabilityUnsupported { .. } => Phase::Capability,
            MutationError::SubmissionRejected { .. } | MutationError::MissingJobLocation { .. } => {
                Phase::Submission
            }
            MutationError::ResetTimeout { .. } => Phase::Reset,
            MutationError::JobFailed { .. } | MutationError::JobTimedOut { .. } => Phase::JobPoll,
            MutationError::EntityNotFound { .. } | MutationError::AmbiguousMatch { .. } => {
                Phase::Resolution
            }
            MutationError::Transport { phase, .. } | MutationError::Cancelled { phase, .. } => {
                *phase
            }
        }
    }

    /// Job left running on the controller when the mutation aborted.
    ///
    /// No cleanup is attempted; callers decide whether to cancel it.
    pub fn outstanding_job(&self) -> Option<&str> {
        match self {
            MutationError::ResetTimeout { job, .. } | MutationError::JobTimedOut { job, .. } => {
                Some(job)
            }
            MutationError::Transport { job, .. } | MutationError::Cancelled { job, .. } => {
                job.as_deref()
            }
            _ => None,
        }
    }
}

/// Result type for mutation operations
pub type Result<T> = std::result::Result<T, MutationError>;
