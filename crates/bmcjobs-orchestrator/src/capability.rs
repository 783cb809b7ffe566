//! Apply-time capability check
//!
//! A mutation may only request an apply time the target sub-resource
//! advertises in `@Redfish.OperationApplyTimeSupport`. The check runs
//! before anything is submitted.

use bmcjobs_redfish::{ApplyTime, RedfishService};
use tracing::{debug, warn};

use crate::error::{MutationError, Phase, Result};

/// Check `requested` against an advertised set
pub fn check_apply_time(
    endpoint: &str,
    resource: &str,
    requested: ApplyTime,
    supported: &[ApplyTime],
) -> Result<()> {
    if supported.contains(&requested) {
        return Ok(());
    }

    warn!(
        endpoint,
        resource,
        requested = %requested,
        supported = ?supported,
        "Apply time not supported by controller"
    );
    Err(MutationError::CapabilityUnsupported {
        endpoint: endpoint.to_string(),
        resource: resource.to_string(),
        requested,
        supported: supported.to_vec(),
    })
}

/// Query the sub-resource's advertised apply times and check `requested`.
///
/// Returns the advertised set on success.
pub async fn validate_apply_time(
    service: &dyn RedfishService,
    resource: &str,
    requested: ApplyTime,
) -> Result<Vec<ApplyTime>> {
    let endpoint = service.endpoint();

    let supported = service
        .operation_apply_time_values(resource)
        .await
        .map_err(|source| MutationError::Transport {
            endpoint: endpoint.to_string(),
            phase: Phase::Capability,
            resource: resource.to_string(),
            job: None,
            source,
        })?;
    debug!(endpoint, resource, supported = ?supported, "Advertised apply times");

    check_apply_time(endpoint, resource, requested, &supported)?;
    Ok(supported)
}
