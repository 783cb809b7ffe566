//! bmcjobs Orchestrator
//!
//! This crate turns a single create/update/delete against a BMC's Redfish
//! API into a linearized, observable operation: the controller accepts the
//! request as a job, and the orchestrator drives that job to a resolved
//! entity or a typed error.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              MutationExecutor                        │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │          EndpointLocks                      │    │
//! │  │   one mutation per controller at a time     │    │
//! │  └─────────────────────────────────────────────┘    │
//! │                      │                               │
//! │                      ▼                               │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │   capability → submit → reset → poll        │    │
//! │  │   → resolve, against a RedfishService       │    │
//! │  └─────────────────────────────────────────────┘    │
//! │                      │                               │
//! │                      ▼                               │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │         MutationEvent Stream                │    │
//! │  │   Started | Progress | Completed            │    │
//! │  └─────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use bmcjobs_orchestrator::{ApplyPolicy, MutationExecutor, MutationRequest, MutationSettings};
//! use bmcjobs_redfish::{RedfishClient, RedfishConfig, ResetType};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RedfishClient::new(RedfishConfig::new("https://10.0.0.5", "root", "calvin"))?;
//! let settings = MutationSettings::storage_volume();
//! let executor = MutationExecutor::new(settings.clone());
//!
//! let volumes = "/redfish/v1/Systems/System.Embedded.1/Storage/RAID.Integrated.1-1/Volumes";
//! let request = MutationRequest::create(volumes, json!({ "Name": "data", "RAIDType": "RAID1" }))
//!     .with_policy(ApplyPolicy::OnReset(settings.reset_request(ResetType::ForceRestart)))
//!     .resolve_by_name(volumes, "data");
//!
//! let outcome = executor
//!     .run_mutation(&client, request, &CancellationToken::new())
//!     .await?;
//! println!("created {}", outcome.entity);
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod clock;
pub mod error;
pub mod executor;
pub mod poller;
pub mod registry;
pub mod reset;
pub mod resolver;
pub mod settings;
pub mod submit;

pub use capability::{check_apply_time, validate_apply_time};
pub use clock::{Clock, TokioClock, MIN_POLL_INTERVAL};
pub use error::{MutationError, Phase, Result};
pub use executor::{
    ApplyPolicy, EntityLookup, MutationEvent, MutationExecutor, MutationOutcome, MutationRequest,
};
pub use poller::{JobOutcome, JobPoller};
pub use registry::{EndpointGuard, EndpointLocks};
pub use reset::{PowerResetCoordinator, ResetOutcome, ResetRequest};
pub use resolver::{resolve_by_name, select_unique, EntityRef};
pub use settings::MutationSettings;
pub use submit::{submit, JobHandle, MutationMethod};
