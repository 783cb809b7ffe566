//! Mutation execution engine
//!
//! This module provides the `MutationExecutor` that drives one
//! create/update/delete against a controller from submission to a
//! resolved entity.

use bmcjobs_redfish::{ApplyTime, JobState, RedfishError, RedfishService, ResetType};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::capability::validate_apply_time;
use crate::clock::{Clock, TokioClock};
use crate::error::{MutationError, Phase, Result};
use crate::poller::JobPoller;
use crate::registry::EndpointLocks;
use crate::reset::{PowerResetCoordinator, ResetRequest};
use crate::resolver::{resolve_by_name, EntityRef};
use crate::settings::MutationSettings;
use crate::submit::{submit, MutationMethod};

/// When the controller applies a mutation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ApplyPolicy {
    /// Applied as soon as the job runs
    #[default]
    Immediate,
    /// Staged until the host restarts; the executor issues the reset
    OnReset(ResetRequest),
}

impl ApplyPolicy {
    /// Apply time checked against the controller's advertised set
    pub fn apply_time(&self) -> ApplyTime {
        match self {
            ApplyPolicy::Immediate => ApplyTime::Immediate,
            ApplyPolicy::OnReset(_) => ApplyTime::OnReset,
        }
    }
}

/// Collection scan used to find the entity after the job completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityLookup {
    pub collection: String,
    pub name: String,
}

/// One create/update/delete against a controller
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    /// URI the mutation is sent to
    pub target: String,
    pub method: MutationMethod,
    /// Opaque JSON payload; an empty object is sent when absent
    pub body: Option<Value>,
    /// Sub-resource whose `@Redfish.OperationApplyTimeSupport` governs the change
    pub capability_source: String,
    pub policy: ApplyPolicy,
    /// Overrides the executor's default job timeout
    pub job_timeout: Option<Duration>,
    /// How to find the resulting entity; the target itself when absent
    pub lookup: Option<EntityLookup>,
}

impl MutationRequest {
    fn new(method: MutationMethod, target: impl Into<String>, body: Option<Value>) -> Self {
        let target = target.into();
        Self {
            capability_source: target.clone(),
            target,
            method,
            body,
            policy: ApplyPolicy::Immediate,
            job_timeout: None,
            lookup: None,
        }
    }

    /// POST `body` to a collection
    pub fn create(collection: impl Into<String>, body: Value) -> Self {
        Self::new(MutationMethod::Post, collection, Some(body))
    }

    /// PATCH `body` onto an entity or its settings resource
    pub fn update(target: impl Into<String>, body: Value) -> Self {
        Self::new(MutationMethod::Patch, target, Some(body))
    }

    /// DELETE an entity
    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(MutationMethod::Delete, target, None)
    }

    pub fn with_policy(mut self, policy: ApplyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_capability_source(mut self, source: impl Into<String>) -> Self {
        self.capability_source = source.into();
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Resolve the entity by scanning `collection` for `name` once the job completes
    pub fn resolve_by_name(mut self, collection: impl Into<String>, name: impl Into<String>) -> Self {
        self.lookup = Some(EntityLookup {
            collection: collection.into(),
            name: name.into(),
        });
        self
    }
}

/// Result of a successful mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub entity: EntityRef,
    pub job_id: String,
    /// Job polls until the terminal state
    pub polls: u32,
    /// Time from acquiring the endpoint lock to the resolved entity
    pub elapsed: Duration,
}

/// Event emitted during mutation execution
#[derive(Debug, Clone)]
pub enum MutationEvent {
    /// Endpoint lock acquired, mutation starting
    Started {
        mutation: Uuid,
        endpoint: String,
        method: MutationMethod,
        target: String,
    },
    /// Controller accepted the mutation as a job
    Submitted { mutation: Uuid, job: String },
    /// Host is back on after the reset that commits an OnReset change
    HostReady {
        mutation: Uuid,
        reset_type: ResetType,
        polls: u32,
    },
    /// Job status observed while polling
    JobProgress {
        mutation: Uuid,
        job: String,
        state: JobState,
        percent: Option<u8>,
    },
    /// Mutation completed
    Completed {
        mutation: Uuid,
        entity: EntityRef,
        job: String,
    },
    /// Mutation failed
    Failed {
        mutation: Uuid,
        phase: Phase,
        error: String,
    },
}

/// Mutation execution engine
///
/// Runs a mutation by:
/// 1. Taking the endpoint lock
/// 2. Checking the requested apply time against the controller
/// 3. Submitting the request and capturing the job
/// 4. Resetting the host for OnReset changes
/// 5. Polling the job to a terminal state
/// 6. Resolving the resulting entity
pub struct MutationExecutor {
    /// Per-endpoint locks, shareable between executors
    locks: Arc<EndpointLocks>,

    /// Time source for deadlines and poll sleeps
    clock: Arc<dyn Clock>,

    settings: MutationSettings,

    /// Event sender for mutation events
    event_sender: broadcast::Sender<MutationEvent>,
}

impl std::fmt::Debug for MutationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationExecutor")
            .field("locks", &self.locks)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for MutationExecutor {
    fn default() -> Self {
        Self::new(MutationSettings::default())
    }
}

impl MutationExecutor {
    /// Create an executor with its own lock registry and the tokio clock
    pub fn new(settings: MutationSettings) -> Self {
        let (event_sender, _) = broadcast::channel(settings.event_capacity.max(1));
        Self {
            locks: Arc::new(EndpointLocks::new()),
            clock: Arc::new(TokioClock),
            settings,
            event_sender,
        }
    }

    /// Share a lock registry with other executors
    pub fn with_locks(mut self, locks: Arc<EndpointLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn locks(&self) -> &Arc<EndpointLocks> {
        &self.locks
    }

    pub fn settings(&self) -> &MutationSettings {
        &self.settings
    }

    /// Subscribe to mutation events
    pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.event_sender.subscribe()
    }

    fn emit(&self, event: MutationEvent) {
        // No subscribers is fine
        let _ = self.event_sender.send(event);
    }

    /// Run one mutation to completion.
    ///
    /// The endpoint lock is held from before the capability check until
    /// the entity is resolved, and released on every exit path. Nothing is
    /// retried; a failed mutation reports the phase it failed in and any
    /// job it left on the controller.
    pub async fn run_mutation(
        &self,
        service: &dyn RedfishService,
        request: MutationRequest,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome> {
        let id = Uuid::new_v4();
        let span = info_span!(
            "mutation",
            id = %id,
            endpoint = %service.endpoint(),
            method = %request.method,
            target = %request.target,
        );

        let result = self.execute(id, service, &request, cancel).instrument(span).await;

        if let Err(e) = &result {
            warn!(mutation = %id, endpoint = %e.endpoint(), phase = %e.phase(), error = %e, "Mutation failed");
            self.emit(MutationEvent::Failed {
                mutation: id,
                phase: e.phase(),
                error: e.to_string(),
            });
        }
        result
    }

    async fn execute(
        &self,
        id: Uuid,
        service: &dyn RedfishService,
        request: &MutationRequest,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome> {
        let endpoint = service.endpoint();
        let clock = self.clock.as_ref();
        let cancelled = |phase: Phase, job: Option<&str>| MutationError::Cancelled {
            endpoint: endpoint.to_string(),
            phase,
            job: job.map(str::to_string),
        };

        let _guard = self
            .locks
            .acquire_cancellable(endpoint, cancel)
            .await
            .ok_or_else(|| cancelled(Phase::Lock, None))?;
        let started = clock.now();

        info!("Starting mutation");
        self.emit(MutationEvent::Started {
            mutation: id,
            endpoint: endpoint.to_string(),
            method: request.method,
            target: request.target.clone(),
        });

        validate_apply_time(service, &request.capability_source, request.policy.apply_time()).await?;

        if cancel.is_cancelled() {
            return Err(cancelled(Phase::Submission, None));
        }
        let handle = submit(
            service,
            clock,
            request.method,
            &request.target,
            request.body.as_ref(),
            self.settings.job_poll_interval,
            request.job_timeout.unwrap_or(self.settings.job_timeout),
        )
        .await?;
        self.emit(MutationEvent::Submitted {
            mutation: id,
            job: handle.id.clone(),
        });

        if let ApplyPolicy::OnReset(reset) = &request.policy {
            let outcome = PowerResetCoordinator::new(service, clock, cancel)
                .reset_and_wait(reset, &handle.id)
                .await?;
            self.emit(MutationEvent::HostReady {
                mutation: id,
                reset_type: outcome.issued,
                polls: outcome.polls,
            });
        }

        let sender = &self.event_sender;
        let job = JobPoller::new(service, clock, cancel)
            .wait(&handle, |status| {
                let _ = sender.send(MutationEvent::JobProgress {
                    mutation: id,
                    job: handle.id.clone(),
                    state: status.state,
                    percent: status.percent_complete,
                });
            })
            .await?;

        let entity = match &request.lookup {
            Some(lookup) => resolve_by_name(service, &lookup.collection, &lookup.name).await?,
            None => EntityRef::new(request.target.clone()),
        };

        let elapsed = clock.now().saturating_duration_since(started);
        info!(entity = %entity, job = %job.job_id, elapsed = ?elapsed, "Mutation completed");
        self.emit(MutationEvent::Completed {
            mutation: id,
            entity: entity.clone(),
            job: job.job_id.clone(),
        });

        Ok(MutationOutcome {
            entity,
            job_id: job.job_id,
            polls: job.polls,
            elapsed,
        })
    }

    /// Read an entity under the endpoint lock.
    ///
    /// Returns `None` on 404: the entity is gone and callers should forget it.
    pub async fn read_entity(&self, service: &dyn RedfishService, uri: &str) -> Result<Option<Value>> {
        let endpoint = service.endpoint();
        let transport = |source: RedfishError| MutationError::Transport {
            endpoint: endpoint.to_string(),
            phase: Phase::Read,
            resource: uri.to_string(),
            job: None,
            source,
        };

        let _guard = self.locks.acquire(endpoint).await;
        let response = service.get(uri).await.map_err(transport)?;

        if response.status == 404 {
            debug!(endpoint, uri, "Entity no longer exists");
            return Ok(None);
        }
        if !response.is_success() {
            return Err(transport(RedfishError::UnexpectedStatus {
                status: response.status,
                uri: uri.to_string(),
            }));
        }

        response.json().map(Some).map_err(|e| {
            transport(RedfishError::InvalidResponse {
                uri: uri.to_string(),
                reason: e.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmcjobs_redfish::{CallKind, MockRedfishService, RedfishResponse};
    use serde_json::json;

    const VOLUMES: &str = "/redfish/v1/Systems/System.Embedded.1/Storage/RAID.Integrated.1-1/Volumes";

    fn drain(rx: &mut broadcast::Receiver<MutationEvent>) -> Vec<MutationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_request_constructors() {
        let create = MutationRequest::create(VOLUMES, json!({ "Name": "data" }))
            .resolve_by_name(VOLUMES, "data");
        assert_eq!(create.method, MutationMethod::Post);
        assert_eq!(create.capability_source, VOLUMES);
        assert_eq!(create.policy.apply_time(), ApplyTime::Immediate);
        assert_eq!(create.lookup.unwrap().name, "data");

        let delete = MutationRequest::delete(format!("{VOLUMES}/Disk.Virtual.0"))
            .with_capability_source(VOLUMES)
            .with_policy(ApplyPolicy::OnReset(ResetRequest::default()));
        assert_eq!(delete.method, MutationMethod::Delete);
        assert!(delete.body.is_none());
        assert_eq!(delete.capability_source, VOLUMES);
        assert_eq!(delete.policy.apply_time(), ApplyTime::OnReset);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_follow_mutation() {
        let mock = MockRedfishService::new("https://bmc.local").with_job_documents(vec![
            json!({ "TaskState": "Running", "PercentComplete": 40 }),
            json!({ "TaskState": "Completed", "PercentComplete": 100 }),
        ]);
        let executor = MutationExecutor::default();
        let mut rx = executor.subscribe();

        let outcome = executor
            .run_mutation(
                &mock,
                MutationRequest::update(format!("{VOLUMES}/Disk.Virtual.0"), json!({})),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.entity.as_str(), format!("{VOLUMES}/Disk.Virtual.0"));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], MutationEvent::Started { method: MutationMethod::Patch, .. }));
        assert!(matches!(events[1], MutationEvent::Submitted { .. }));
        assert!(matches!(
            events[2],
            MutationEvent::JobProgress {
                state: JobState::Running,
                percent: Some(40),
                ..
            }
        ));
        assert!(matches!(
            events[3],
            MutationEvent::JobProgress {
                state: JobState::Completed,
                percent: Some(100),
                ..
            }
        ));
        assert!(matches!(events[4], MutationEvent::Completed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_emits_failed_event() {
        let mock = MockRedfishService::new("https://bmc.local")
            .with_submission_response(RedfishResponse::new(500));
        let executor = MutationExecutor::default();
        let mut rx = executor.subscribe();

        let err = executor
            .run_mutation(
                &mock,
                MutationRequest::delete(format!("{VOLUMES}/Disk.Virtual.0")),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::SubmissionRejected { status: 500, .. }));

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(MutationEvent::Failed {
                phase: Phase::Submission,
                ..
            })
        ));
        assert!(!executor.locks().is_locked("https://bmc.local"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_waiting_for_lock() {
        let mock = MockRedfishService::new("https://bmc.local");
        let executor = MutationExecutor::default();
        let _held = executor.locks().acquire("https://bmc.local").await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = executor
            .run_mutation(&mock, MutationRequest::delete(VOLUMES), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MutationError::Cancelled {
                phase: Phase::Lock,
                job: None,
                ..
            }
        ));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_resolves_entity_from_member_documents() {
        let os = format!("{VOLUMES}/Disk.Virtual.0:RAID.Integrated.1-1");
        let data = format!("{VOLUMES}/Disk.Virtual.1:RAID.Integrated.1-1");
        let mock = MockRedfishService::new("https://bmc.local")
            .with_document(
                VOLUMES,
                json!({ "Members": [{ "@odata.id": os.clone() }, { "@odata.id": data.clone() }] }),
            )
            .with_document(os.clone(), json!({ "Name": "os" }))
            .with_document(data.clone(), json!({ "Name": "data" }));
        let executor = MutationExecutor::default();

        let outcome = executor
            .run_mutation(
                &mock,
                MutationRequest::create(VOLUMES, json!({ "Name": "data" }))
                    .resolve_by_name(VOLUMES, "data"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.entity.as_str(), data);
        assert_eq!(mock.get_count(&os), 1);
        assert_eq!(mock.get_count(&data), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_job_timeout() {
        let mock = MockRedfishService::new("https://bmc.local")
            .with_job_states(&["Running", "Running", "Completed"]);
        let executor = MutationExecutor::default();

        let outcome = executor
            .run_mutation(
                &mock,
                MutationRequest::delete(format!("{VOLUMES}/Disk.Virtual.0"))
                    .with_job_timeout(Duration::MAX),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.polls, 3);
        assert_eq!(outcome.elapsed, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_read_entity() {
        let uri = format!("{VOLUMES}/Disk.Virtual.0");
        let mock = MockRedfishService::new("https://bmc.local")
            .with_document(uri.clone(), json!({ "Name": "data", "CapacityBytes": 1024 }));
        let executor = MutationExecutor::default();

        let doc = executor.read_entity(&mock, &uri).await.unwrap().unwrap();
        assert_eq!(doc["Name"], "data");

        let gone = executor
            .read_entity(&mock, &format!("{VOLUMES}/Disk.Virtual.9"))
            .await
            .unwrap();
        assert!(gone.is_none());
        assert_eq!(mock.call_count(CallKind::Get), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_settings_still_build_channel() {
        let executor = MutationExecutor::new(MutationSettings {
            event_capacity: 0,
            ..MutationSettings::default()
        });
        let _rx = executor.subscribe();
        assert_eq!(executor.settings().event_capacity, 0);
    }
}
