//! Error types for Redfish operations

use thiserror::Error;

/// Error type for Redfish transport and protocol failures
#[derive(Debug, Error)]
pub enum RedfishError {
    /// Connection to the controller failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Controller rejected the credentials (401/403)
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Request exceeded the client timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Any other request-level failure
    #[error("request failed: {0}")]
    Request(String),

    /// Controller answered with a status the caller cannot use
    #[error("unexpected status {status} from {uri}")]
    UnexpectedStatus { status: u16, uri: String },

    /// Response body was missing or malformed
    #[error("invalid response from {uri}: {reason}")]
    InvalidResponse { uri: String, reason: String },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for RedfishError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RedfishError::Timeout(err.to_string())
        } else if err.is_connect() {
            RedfishError::ConnectionFailed(err.to_string())
        } else {
            RedfishError::Request(err.to_string())
        }
    }
}

/// Result type for Redfish operations
pub type Result<T> = std::result::Result<T, RedfishError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RedfishError::ConnectionFailed("host unreachable".to_string());
        assert_eq!(err.to_string(), "connection failed: host unreachable");

        let err = RedfishError::UnexpectedStatus {
            status: 404,
            uri: "/redfish/v1/Systems/1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unexpected status 404 from /redfish/v1/Systems/1"
        );

        let err = RedfishError::InvalidResponse {
            uri: "/redfish/v1/TaskService/Tasks/JID_1".to_string(),
            reason: "missing TaskState".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid response from /redfish/v1/TaskService/Tasks/JID_1: missing TaskState"
        );
    }
}
