//! Scriptable in-memory controller for testing
//!
//! `MockRedfishService` answers the [`RedfishService`] calls from a script:
//! accepted submissions mint job URIs whose polls walk through the
//! configured job documents, power-state reads walk through the configured
//! states, and every call is recorded.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{RedfishError, Result};
use crate::job::JobStatus;
use crate::service::{RedfishResponse, RedfishService};
use crate::types::{ApplyTime, PowerState, ResetType};

/// Kind of call recorded by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Get,
    Post,
    Patch,
    Delete,
    ApplyTimes,
    PowerState,
    Reset,
}

/// A call made against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub uri: String,
}

#[derive(Debug, Clone)]
enum SubmissionScript {
    Accept,
    Respond(RedfishResponse),
    TransportFailure(String),
}

#[derive(Debug)]
struct MockState {
    apply_times: Vec<ApplyTime>,
    submission: SubmissionScript,
    job_script: Vec<Value>,
    jobs: HashMap<String, usize>,
    finished_jobs: HashSet<String>,
    submitted: Vec<String>,
    documents: HashMap<String, Value>,
    power_script: Vec<PowerState>,
    power_cursor: usize,
    resets: Vec<ResetType>,
    calls: Vec<RecordedCall>,
    in_flight: usize,
    peak_in_flight: usize,
}

/// In-memory controller for tests
#[derive(Debug)]
pub struct MockRedfishService {
    endpoint: String,
    state: Mutex<MockState>,
}

impl MockRedfishService {
    /// Controller that supports both apply times, accepts every submission,
    /// completes jobs on the first poll and reports the host as on.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: Mutex::new(MockState {
                apply_times: vec![ApplyTime::Immediate, ApplyTime::OnReset],
                submission: SubmissionScript::Accept,
                job_script: vec![Self::job_document("Completed", None)],
                jobs: HashMap::new(),
                finished_jobs: HashSet::new(),
                submitted: Vec::new(),
                documents: HashMap::new(),
                power_script: vec![PowerState::On],
                power_cursor: 0,
                resets: Vec::new(),
                calls: Vec::new(),
                in_flight: 0,
                peak_in_flight: 0,
            }),
        }
    }

    /// Build a task document with the given `TaskState` and message
    pub fn job_document(task_state: &str, message: Option<&str>) -> Value {
        match message {
            Some(message) => json!({
                "TaskState": task_state,
                "Messages": [{ "Message": message }]
            }),
            None => json!({ "TaskState": task_state }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advertised apply times
    pub fn with_apply_times(mut self, apply_times: Vec<ApplyTime>) -> Self {
        self.state_mut().apply_times = apply_times;
        self
    }

    /// Answer every submission with this response instead of accepting it
    pub fn with_submission_response(mut self, response: RedfishResponse) -> Self {
        self.state_mut().submission = SubmissionScript::Respond(response);
        self
    }

    /// Fail every submission at the transport level
    pub fn with_transport_failure(mut self, message: impl Into<String>) -> Self {
        self.state_mut().submission = SubmissionScript::TransportFailure(message.into());
        self
    }

    /// Documents returned by successive polls of each job; the last repeats
    pub fn with_job_documents(mut self, documents: Vec<Value>) -> Self {
        self.state_mut().job_script = documents;
        self
    }

    /// Shorthand for [`with_job_documents`](Self::with_job_documents) with bare task states
    pub fn with_job_states(self, states: &[&str]) -> Self {
        let documents = states
            .iter()
            .map(|state| Self::job_document(state, None))
            .collect();
        self.with_job_documents(documents)
    }

    /// Serve a document on GET
    pub fn with_document(mut self, uri: impl Into<String>, document: Value) -> Self {
        self.state_mut().documents.insert(uri.into(), document);
        self
    }

    /// Successive power-state reads; the last repeats
    pub fn with_power_states(mut self, states: Vec<PowerState>) -> Self {
        self.state_mut().power_script = states;
        self
    }

    /// All recorded calls
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls of one kind
    pub fn call_count(&self, kind: CallKind) -> usize {
        self.state().calls.iter().filter(|c| c.kind == kind).count()
    }

    /// Number of GETs against one URI
    pub fn get_count(&self, uri: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.kind == CallKind::Get && c.uri == uri)
            .count()
    }

    /// Job URIs minted so far, in submission order
    pub fn submitted_jobs(&self) -> Vec<String> {
        self.state().submitted.clone()
    }

    /// Resets requested so far
    pub fn resets(&self) -> Vec<ResetType> {
        self.state().resets.clone()
    }

    /// Jobs accepted but not yet observed in a terminal state
    pub fn in_flight(&self) -> usize {
        self.state().in_flight
    }

    /// Highest number of simultaneously outstanding jobs
    pub fn peak_in_flight(&self) -> usize {
        self.state().peak_in_flight
    }

    fn record(state: &mut MockState, kind: CallKind, uri: &str) {
        state.calls.push(RecordedCall {
            kind,
            uri: uri.to_string(),
        });
    }

    fn submit(&self, kind: CallKind, uri: &str) -> Result<RedfishResponse> {
        let mut state = self.state();
        Self::record(&mut state, kind, uri);

        match state.submission.clone() {
            SubmissionScript::Accept => {
                let job = format!(
                    "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_{:04}",
                    state.submitted.len() + 1
                );
                state.jobs.insert(job.clone(), 0);
                state.submitted.push(job.clone());
                state.in_flight += 1;
                state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
                Ok(RedfishResponse::new(202).with_header("Location", job))
            }
            SubmissionScript::Respond(response) => Ok(response),
            SubmissionScript::TransportFailure(message) => {
                Err(RedfishError::ConnectionFailed(message))
            }
        }
    }
}

#[async_trait]
impl RedfishService for MockRedfishService {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get(&self, uri: &str) -> Result<RedfishResponse> {
        let mut state = self.state();
        Self::record(&mut state, CallKind::Get, uri);

        if let Some(cursor) = state.jobs.get(uri).copied() {
            let last = state.job_script.len().saturating_sub(1);
            let document = state
                .job_script
                .get(cursor.min(last))
                .cloned()
                .unwrap_or(Value::Null);
            state.jobs.insert(uri.to_string(), cursor + 1);

            let terminal = JobStatus::from_value(&document)
                .map(|status| status.state.is_terminal())
                .unwrap_or(false);
            if terminal && state.finished_jobs.insert(uri.to_string()) {
                state.in_flight = state.in_flight.saturating_sub(1);
            }
            return Ok(RedfishResponse::new(200).with_json(&document));
        }

        Ok(match state.documents.get(uri) {
            Some(document) => RedfishResponse::new(200).with_json(document),
            None => RedfishResponse::new(404),
        })
    }

    async fn post(&self, uri: &str, _body: &Value) -> Result<RedfishResponse> {
        self.submit(CallKind::Post, uri)
    }

    async fn patch(&self, uri: &str, _body: &Value) -> Result<RedfishResponse> {
        self.submit(CallKind::Patch, uri)
    }

    async fn delete(&self, uri: &str) -> Result<RedfishResponse> {
        self.submit(CallKind::Delete, uri)
    }

    async fn operation_apply_time_values(&self, sub_resource: &str) -> Result<Vec<ApplyTime>> {
        let mut state = self.state();
        Self::record(&mut state, CallKind::ApplyTimes, sub_resource);
        Ok(state.apply_times.clone())
    }

    async fn power_state(&self) -> Result<PowerState> {
        let mut state = self.state();
        Self::record(&mut state, CallKind::PowerState, "");

        let last = state.power_script.len().saturating_sub(1);
        let power = state
            .power_script
            .get(state.power_cursor.min(last))
            .copied()
            .unwrap_or(PowerState::Unknown);
        state.power_cursor += 1;
        Ok(power)
    }

    async fn reset(&self, reset_type: ResetType) -> Result<()> {
        let mut state = self.state();
        Self::record(&mut state, CallKind::Reset, reset_type.as_str());
        state.resets.push(reset_type);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;

    #[tokio::test]
    async fn test_accepted_submission_mints_job() {
        let mock = MockRedfishService::new("https://bmc.local")
            .with_job_states(&["Running", "Completed"]);

        let response = mock
            .post("/redfish/v1/Systems/1/Storage/RAID.1/Volumes", &json!({}))
            .await
            .unwrap();
        assert_eq!(response.status, 202);

        let job = response.location().unwrap().to_string();
        assert_eq!(mock.submitted_jobs(), vec![job.clone()]);
        assert_eq!(mock.in_flight(), 1);

        let first = JobStatus::from_value(&mock.get_json(&job).await.unwrap()).unwrap();
        assert_eq!(first.state, JobState::Running);
        let second = JobStatus::from_value(&mock.get_json(&job).await.unwrap()).unwrap();
        assert_eq!(second.state, JobState::Completed);
        let repeated = JobStatus::from_value(&mock.get_json(&job).await.unwrap()).unwrap();
        assert_eq!(repeated.state, JobState::Completed);

        assert_eq!(mock.in_flight(), 0);
        assert_eq!(mock.peak_in_flight(), 1);
        assert_eq!(mock.get_count(&job), 3);
    }

    #[tokio::test]
    async fn test_scripted_submission_response() {
        let mock = MockRedfishService::new("https://bmc.local")
            .with_submission_response(RedfishResponse::new(400));

        let response = mock.delete("/redfish/v1/Volumes/1").await.unwrap();
        assert_eq!(response.status, 400);
        assert!(mock.submitted_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let mock = MockRedfishService::new("https://bmc.local").with_transport_failure("refused");
        let err = mock.patch("/redfish/v1/Volumes/1", &json!({})).await.unwrap_err();
        assert!(matches!(err, RedfishError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn test_power_script_repeats_last_state() {
        let mock = MockRedfishService::new("https://bmc.local")
            .with_power_states(vec![PowerState::Off, PowerState::On]);

        assert_eq!(mock.power_state().await.unwrap(), PowerState::Off);
        assert_eq!(mock.power_state().await.unwrap(), PowerState::On);
        assert_eq!(mock.power_state().await.unwrap(), PowerState::On);

        mock.reset(ResetType::PowerCycle).await.unwrap();
        assert_eq!(mock.resets(), vec![ResetType::PowerCycle]);
        assert_eq!(mock.call_count(CallKind::PowerState), 3);
    }

    #[tokio::test]
    async fn test_unknown_document_is_not_found() {
        let mock = MockRedfishService::new("https://bmc.local")
            .with_document("/redfish/v1/Systems", json!({ "Members": [] }));

        assert_eq!(mock.get("/redfish/v1/Systems").await.unwrap().status, 200);
        assert_eq!(mock.get("/redfish/v1/Nope").await.unwrap().status, 404);
        assert!(matches!(
            mock.get_json("/redfish/v1/Nope").await,
            Err(RedfishError::UnexpectedStatus { status: 404, .. })
        ));
    }
}
