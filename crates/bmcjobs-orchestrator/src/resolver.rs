//! Entity resolution after a completed job
//!
//! Controllers do not return the URI of the entity a job created, so the
//! parent collection is scanned for a member whose `Name` is the requested
//! name. `DisplayName` and other labels are not consulted.

use bmcjobs_redfish::{RedfishError, RedfishService};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{MutationError, Phase, Result};

/// Stable `@odata.id` of a created or altered entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRef(String);

impl EntityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn name_of(doc: &Value) -> Option<&str> {
    doc.get("Name").and_then(Value::as_str)
}

/// Pick the single candidate, or fail with the count found
pub fn select_unique(
    endpoint: &str,
    collection: &str,
    name: &str,
    mut matches: Vec<String>,
) -> Result<EntityRef> {
    match matches.len() {
        0 => Err(MutationError::EntityNotFound {
            endpoint: endpoint.to_string(),
            collection: collection.to_string(),
            name: name.to_string(),
        }),
        1 => Ok(EntityRef(matches.remove(0))),
        _ => Err(MutationError::AmbiguousMatch {
            endpoint: endpoint.to_string(),
            collection: collection.to_string(),
            name: name.to_string(),
            matches,
        }),
    }
}

/// Find the member of `collection` whose `Name` is `name`
pub async fn resolve_by_name(
    service: &dyn RedfishService,
    collection: &str,
    name: &str,
) -> Result<EntityRef> {
    let endpoint = service.endpoint();
    let transport = |resource: &str, source: RedfishError| MutationError::Transport {
        endpoint: endpoint.to_string(),
        phase: Phase::Resolution,
        resource: resource.to_string(),
        job: None,
        source,
    };

    let listing = service
        .get_json(collection)
        .await
        .map_err(|e| transport(collection, e))?;
    let members = listing
        .get("Members")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut matches = Vec::new();
    for member in &members {
        let Some(id) = member.get("@odata.id").and_then(Value::as_str) else {
            debug!(endpoint, collection, "Skipping collection member without @odata.id");
            continue;
        };

        let matched = match name_of(member) {
            Some(inline) => inline == name,
            None => {
                let doc = service.get_json(id).await.map_err(|e| transport(id, e))?;
                let fetched = name_of(&doc) == Some(name);
                fetched
            }
        };

        if matched {
            matches.push(id.to_string());
        }
    }

    debug!(endpoint, collection, name, members = members.len(), matches = matches.len(), "Scanned collection");
    let entity = select_unique(endpoint, collection, name, matches)?;
    info!(endpoint, entity = %entity, "Resolved entity");
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmcjobs_redfish::MockRedfishService;
    use serde_json::json;

    const VOLUMES: &str = "/redfish/v1/Systems/System.Embedded.1/Storage/RAID.Integrated.1-1/Volumes";

    fn volume(n: u32) -> String {
        format!("{VOLUMES}/Disk.Virtual.{n}:RAID.Integrated.1-1")
    }

    #[tokio::test]
    async fn test_single_inline_match() {
        let mock = MockRedfishService::new("https://bmc.local").with_document(
            VOLUMES,
            json!({
                "Members": [
                    { "@odata.id": volume(0), "Name": "os" },
                    { "@odata.id": volume(1), "Name": "data" }
                ]
            }),
        );

        let entity = resolve_by_name(&mock, VOLUMES, "data").await.unwrap();
        assert_eq!(entity, EntityRef::new(volume(1)));
        assert_eq!(mock.get_count(&volume(0)), 0);
    }

    #[tokio::test]
    async fn test_members_fetched_when_name_not_inline() {
        let mock = MockRedfishService::new("https://bmc.local")
            .with_document(
                VOLUMES,
                json!({ "Members": [{ "@odata.id": volume(0) }, { "@odata.id": volume(1) }] }),
            )
            .with_document(volume(0), json!({ "Name": "os" }))
            .with_document(volume(1), json!({ "Name": "data" }));

        let entity = resolve_by_name(&mock, VOLUMES, "data").await.unwrap();
        assert_eq!(entity.as_str(), volume(1));
        assert_eq!(mock.get_count(&volume(0)), 1);
        assert_eq!(mock.get_count(&volume(1)), 1);
    }

    #[tokio::test]
    async fn test_display_name_is_not_a_match() {
        let mock = MockRedfishService::new("https://bmc.local").with_document(
            VOLUMES,
            json!({
                "Members": [
                    { "@odata.id": volume(0), "Name": "os", "DisplayName": "data" },
                    { "@odata.id": volume(1), "Name": "data", "DisplayName": "Virtual Disk 1" }
                ]
            }),
        );

        let entity = resolve_by_name(&mock, VOLUMES, "data").await.unwrap();
        assert_eq!(entity.as_str(), volume(1));
    }

    #[tokio::test]
    async fn test_no_match() {
        let mock = MockRedfishService::new("https://bmc.local").with_document(
            VOLUMES,
            json!({ "Members": [{ "@odata.id": volume(0), "Name": "os" }] }),
        );

        let err = resolve_by_name(&mock, VOLUMES, "data").await.unwrap_err();
        assert!(matches!(err, MutationError::EntityNotFound { .. }));
        assert_eq!(err.phase(), Phase::Resolution);
    }

    #[tokio::test]
    async fn test_duplicate_names_are_ambiguous() {
        let mock = MockRedfishService::new("https://bmc.local").with_document(
            VOLUMES,
            json!({
                "Members": [
                    { "@odata.id": volume(0), "Name": "data" },
                    { "@odata.id": volume(1), "Name": "data" }
                ]
            }),
        );

        match resolve_by_name(&mock, VOLUMES, "data").await.unwrap_err() {
            MutationError::AmbiguousMatch { matches, .. } => {
                assert_eq!(matches, vec![volume(0), volume(1)]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_collection_is_transport_error() {
        let mock = MockRedfishService::new("https://bmc.local");

        let err = resolve_by_name(&mock, VOLUMES, "data").await.unwrap_err();
        assert!(matches!(
            err,
            MutationError::Transport {
                phase: Phase::Resolution,
                source: RedfishError::UnexpectedStatus { status: 404, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_entity_ref_serializes_as_string() {
        let entity = EntityRef::new("/redfish/v1/Volumes/1");
        assert_eq!(serde_json::to_value(&entity).unwrap(), json!("/redfish/v1/Volumes/1"));
        assert_eq!(entity.to_string(), "/redfish/v1/Volumes/1");
    }
}
