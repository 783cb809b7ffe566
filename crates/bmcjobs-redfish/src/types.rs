//! Common types for Redfish operations

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// When the controller commits a submitted change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplyTime {
    /// Commit as soon as the job runs
    Immediate,
    /// Stage the change until the next host reset
    OnReset,
}

impl ApplyTime {
    /// Redfish wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyTime::Immediate => "Immediate",
            ApplyTime::OnReset => "OnReset",
        }
    }

    /// Parse a Redfish wire name. Values this crate does not drive
    /// (e.g. `AtMaintenanceWindowStart`) yield `None`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "Immediate" => Some(ApplyTime::Immediate),
            "OnReset" => Some(ApplyTime::OnReset),
            _ => None,
        }
    }

    /// `@Redfish.OperationApplyTime` fragment for create/delete payloads
    pub fn operation_annotation(&self) -> Value {
        json!({ "@Redfish.OperationApplyTime": self.as_str() })
    }

    /// `@Redfish.SettingsApplyTime` fragment for settings PATCH payloads
    pub fn settings_annotation(&self) -> Value {
        json!({ "@Redfish.SettingsApplyTime": { "ApplyTime": self.as_str() } })
    }
}

impl std::fmt::Display for ApplyTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `ComputerSystem.Reset` action type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResetType {
    /// Power on a host that is off
    On,
    /// Hard restart without OS shutdown
    #[default]
    ForceRestart,
    /// Restart after an orderly OS shutdown
    GracefulRestart,
    /// Remove and restore power
    PowerCycle,
}

impl ResetType {
    /// Redfish wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetType::On => "On",
            ResetType::ForceRestart => "ForceRestart",
            ResetType::GracefulRestart => "GracefulRestart",
            ResetType::PowerCycle => "PowerCycle",
        }
    }

    /// Whether this reset restarts a running host
    pub fn is_restart(&self) -> bool {
        !matches!(self, ResetType::On)
    }
}

impl std::fmt::Display for ResetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power state of the host behind a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Host is powered on
    On,
    /// Host is powered off
    Off,
    /// Host is transitioning to on
    PoweringOn,
    /// Host is transitioning to off
    PoweringOff,
    /// Power state is unknown
    Unknown,
}

impl PowerState {
    /// Parse the `PowerState` property of a ComputerSystem
    pub fn from_wire(value: &str) -> Self {
        match value {
            "On" => PowerState::On,
            "Off" => PowerState::Off,
            "PoweringOn" => PowerState::PoweringOn,
            "PoweringOff" => PowerState::PoweringOff,
            _ => PowerState::Unknown,
        }
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
            PowerState::PoweringOn => write!(f, "powering on"),
            PowerState::PoweringOff => write!(f, "powering off"),
            PowerState::Unknown => write!(f, "unknown"),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Redfish REST API configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct RedfishConfig {
    /// Base URL (e.g., https://bmc.example.com)
    pub base_url: String,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Skip TLS verification (for self-signed certs)
    #[serde(default)]
    pub insecure: bool,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// ComputerSystem id; the first member of `/redfish/v1/Systems` when unset
    #[serde(default)]
    pub system_id: Option<String>,
}

impl RedfishConfig {
    /// Create new Redfish config
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            insecure: false,
            request_timeout_secs: default_request_timeout_secs(),
            system_id: None,
        }
    }

    /// Allow insecure TLS (self-signed certs)
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Pin the ComputerSystem instead of discovering it
    pub fn with_system_id(mut self, id: impl Into<String>) -> Self {
        self.system_id = Some(id.into());
        self
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl std::fmt::Debug for RedfishConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedfishConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("insecure", &self.insecure)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("system_id", &self.system_id)
            .finish_non_exhaustive()
    }
}
