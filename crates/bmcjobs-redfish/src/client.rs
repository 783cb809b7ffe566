//! Redfish HTTP client
//!
//! Talks to a controller over HTTPS with basic authentication. Relative
//! URIs (`@odata.id`, `Location`) are resolved against the configured base
//! URL.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::error::{RedfishError, Result};
use crate::service::{parse_apply_time_support, RedfishResponse, RedfishService};
use crate::types::{ApplyTime, PowerState, RedfishConfig, ResetType};

const SYSTEMS_COLLECTION: &str = "/redfish/v1/Systems";

/// Redfish REST API client
#[derive(Debug)]
pub struct RedfishClient {
    config: RedfishConfig,
    base: Url,
    http: reqwest::Client,
    system_uri: OnceCell<String>,
}

impl RedfishClient {
    /// Create a new Redfish client
    pub fn new(config: RedfishConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            RedfishError::InvalidConfig(format!("base URL '{}': {}", config.base_url, e))
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| RedfishError::InvalidConfig(e.to_string()))?;

        let system_uri = OnceCell::new_with(
            config
                .system_id
                .as_ref()
                .map(|id| format!("{}/{}", SYSTEMS_COLLECTION, id)),
        );

        Ok(Self {
            config,
            base,
            http,
            system_uri,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Resolve a relative or absolute URI against the base URL
    pub fn resolve_uri(&self, uri: &str) -> Result<Url> {
        self.base
            .join(uri)
            .map_err(|e| RedfishError::InvalidConfig(format!("URI '{}': {}", uri, e)))
    }

    async fn send(&self, method: Method, uri: &str, body: Option<&Value>) -> Result<RedfishResponse> {
        let url = self.resolve_uri(uri)?;
        debug!(method = %method, url = %url, "Redfish request");

        let mut request = self
            .http
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(RedfishError::AuthenticationFailed(format!(
                "{} returned {}",
                uri, status
            )));
        }

        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        let mut parsed = RedfishResponse::new(status);
        for (name, value) in headers {
            parsed = parsed.with_header(&name, value);
        }
        parsed.body = body;
        Ok(parsed)
    }

    /// URI of the ComputerSystem this client resets
    async fn systems_url(&self) -> Result<&str> {
        self.system_uri
            .get_or_try_init(|| async {
                let collection = self.get_json(SYSTEMS_COLLECTION).await?;
                collection
                    .get("Members")
                    .and_then(Value::as_array)
                    .and_then(|members| members.first())
                    .and_then(|member| member.get("@odata.id"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| RedfishError::InvalidResponse {
                        uri: SYSTEMS_COLLECTION.to_string(),
                        reason: "no ComputerSystem members".to_string(),
                    })
            })
            .await
            .map(String::as_str)
    }

    /// Execute a ComputerSystem action
    async fn execute_action(&self, action: &str, body: &Value) -> Result<()> {
        let system_uri = self.systems_url().await?;
        let system = self.get_json(system_uri).await?;

        let target = system
            .get("Actions")
            .and_then(|actions| actions.get(format!("#{}", action)))
            .and_then(|a| a.get("target"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}/Actions/{}", system_uri, action));

        let response = self.post(&target, body).await?;
        if !response.is_success() {
            return Err(RedfishError::UnexpectedStatus {
                status: response.status,
                uri: target,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RedfishService for RedfishClient {
    fn endpoint(&self) -> &str {
        self.base_url()
    }

    async fn get(&self, uri: &str) -> Result<RedfishResponse> {
        self.send(Method::GET, uri, None).await
    }

    async fn post(&self, uri: &str, body: &Value) -> Result<RedfishResponse> {
        self.send(Method::POST, uri, Some(body)).await
    }

    async fn patch(&self, uri: &str, body: &Value) -> Result<RedfishResponse> {
        self.send(Method::PATCH, uri, Some(body)).await
    }

    async fn delete(&self, uri: &str) -> Result<RedfishResponse> {
        self.send(Method::DELETE, uri, None).await
    }

    async fn operation_apply_time_values(&self, sub_resource: &str) -> Result<Vec<ApplyTime>> {
        let doc = self.get_json(sub_resource).await?;
        Ok(parse_apply_time_support(&doc))
    }

    async fn power_state(&self) -> Result<PowerState> {
        let system_uri = self.systems_url().await?;
        let system = self.get_json(system_uri).await?;

        Ok(system
            .get("PowerState")
            .and_then(Value::as_str)
            .map(PowerState::from_wire)
            .unwrap_or(PowerState::Unknown))
    }

    async fn reset(&self, reset_type: ResetType) -> Result<()> {
        info!(endpoint = %self.base_url(), reset_type = %reset_type, "Requesting host reset");
        self.execute_action("ComputerSystem.Reset", &json!({ "ResetType": reset_type.as_str() }))
            .await
    }
}
