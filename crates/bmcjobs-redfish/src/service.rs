//! Management-API service trait and response type

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{RedfishError, Result};
use crate::types::{ApplyTime, PowerState, ResetType};

/// Raw HTTP response from a controller
#[derive(Debug, Clone, PartialEq)]
pub struct RedfishResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, keyed by lowercase name
    headers: BTreeMap<String, String>,
    /// Response body
    pub body: Vec<u8>,
}

impl RedfishResponse {
    /// Create an empty response with the given status
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set a JSON body
    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = body.to_string().into_bytes();
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Non-blank `Location` header
    pub fn location(&self) -> Option<&str> {
        self.header("location")
            .map(str::trim)
            .filter(|location| !location.is_empty())
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON
    pub fn json(&self) -> std::result::Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Message from a Redfish `error` object, if the body carries one
    pub fn error_message(&self) -> Option<String> {
        let doc = self.json().ok()?;
        let error = doc.get("error")?;

        error
            .get("@Message.ExtendedInfo")
            .and_then(Value::as_array)
            .and_then(|info| info.iter().find_map(|m| m.get("Message")?.as_str()))
            .or_else(|| error.get("message").and_then(Value::as_str))
            .map(str::to_string)
    }
}

/// Trait for the management-API operations the orchestration core consumes
///
/// Implementations handle transport, authentication and URI resolution.
/// URIs are either absolute or relative to the controller's base URL, the
/// way `@odata.id` and `Location` values arrive from the controller.
#[async_trait]
pub trait RedfishService: Send + Sync {
    /// Identity of the physical controller (host or base URL)
    fn endpoint(&self) -> &str;

    /// GET a resource
    async fn get(&self, uri: &str) -> Result<RedfishResponse>;

    /// POST a JSON body
    async fn post(&self, uri: &str, body: &Value) -> Result<RedfishResponse>;

    /// PATCH a JSON body
    async fn patch(&self, uri: &str, body: &Value) -> Result<RedfishResponse>;

    /// DELETE a resource
    async fn delete(&self, uri: &str) -> Result<RedfishResponse>;

    /// Apply times the sub-resource advertises for operations on it
    async fn operation_apply_time_values(&self, sub_resource: &str) -> Result<Vec<ApplyTime>>;

    /// Current host power state
    async fn power_state(&self) -> Result<PowerState>;

    /// Request a host reset
    async fn reset(&self, reset_type: ResetType) -> Result<()>;

    /// GET a resource and parse it as JSON, requiring a 2xx status
    async fn get_json(&self, uri: &str) -> Result<Value> {
        let response = self.get(uri).await?;
        if !response.is_success() {
            return Err(RedfishError::UnexpectedStatus {
                status: response.status,
                uri: uri.to_string(),
            });
        }

        response.json().map_err(|e| RedfishError::InvalidResponse {
            uri: uri.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Read `@Redfish.OperationApplyTimeSupport.SupportedValues` from a resource
pub fn parse_apply_time_support(doc: &Value) -> Vec<ApplyTime> {
    let Some(values) = doc
        .get("@Redfish.OperationApplyTimeSupport")
        .and_then(|support| support.get("SupportedValues"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut supported = Vec::with_capacity(values.len());
    for value in values.iter().filter_map(Value::as_str) {
        match ApplyTime::from_wire(value) {
            Some(apply_time) if !supported.contains(&apply_time) => supported.push(apply_time),
            Some(_) => {}
            None => debug!(value, "Ignoring unsupported apply time value"),
        }
    }
    supported
}
