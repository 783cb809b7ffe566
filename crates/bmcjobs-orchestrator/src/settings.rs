//! Orchestration settings
//!
//! Defaults match the storage-volume resource: jobs are polled every 10s
//! for up to 1200s, and an OnReset change waits up to 120s for the host.

use bmcjobs_redfish::ResetType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::reset::ResetRequest;

/// Default interval between job polls
pub const DEFAULT_JOB_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default job timeout
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(1200);

/// Default time to wait for the host after a reset
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between power-state polls
pub const DEFAULT_RESET_POLL_INTERVAL: Duration = Duration::from_secs(10);

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Timing and channel settings for a [`MutationExecutor`](crate::MutationExecutor)
///
/// Durations are whole seconds when (de)serialized. Poll intervals shorter
/// than [`MIN_POLL_INTERVAL`](crate::clock::MIN_POLL_INTERVAL) are raised to
/// it when polling, and timeouts too large to add to the current instant
/// mean no deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationSettings {
    /// Interval between job polls
    #[serde(with = "secs")]
    pub job_poll_interval: Duration,

    /// Job timeout used when a request does not set one
    #[serde(with = "secs")]
    pub job_timeout: Duration,

    /// Time to wait for the host after a reset
    #[serde(with = "secs")]
    pub reset_timeout: Duration,

    /// Interval between power-state polls
    #[serde(with = "secs")]
    pub reset_poll_interval: Duration,

    /// Capacity of the mutation event channel
    pub event_capacity: usize,
}

impl Default for MutationSettings {
    fn default() -> Self {
        Self {
            job_poll_interval: DEFAULT_JOB_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            reset_poll_interval: DEFAULT_RESET_POLL_INTERVAL,
            event_capacity: 256,
        }
    }
}

impl MutationSettings {
    /// Settings for storage-volume create/update/delete
    pub fn storage_volume() -> Self {
        Self::default()
    }

    /// Set the job poll interval
    pub fn with_job_poll_interval(mut self, interval: Duration) -> Self {
        self.job_poll_interval = interval;
        self
    }

    /// Set the default job timeout
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Set the reset timeout
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set the power-state poll interval
    pub fn with_reset_poll_interval(mut self, interval: Duration) -> Self {
        self.reset_poll_interval = interval;
        self
    }

    /// Reset request using these settings' timings
    pub fn reset_request(&self, reset_type: ResetType) -> ResetRequest {
        ResetRequest::new(reset_type)
            .with_timeout(self.reset_timeout)
            .with_poll_interval(self.reset_poll_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_volume_defaults() {
        let settings = MutationSettings::storage_volume();
        assert_eq!(settings.job_poll_interval, Duration::from_secs(10));
        assert_eq!(settings.job_timeout, Duration::from_secs(1200));
        assert_eq!(settings.reset_timeout, Duration::from_secs(120));
        assert_eq!(settings.reset_poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_deserialize_partial_settings() {
        let settings: MutationSettings =
            serde_json::from_str(r#"{ "job_timeout": 600, "reset_timeout": 300 }"#).unwrap();

        assert_eq!(settings.job_timeout, Duration::from_secs(600));
        assert_eq!(settings.reset_timeout, Duration::from_secs(300));
        assert_eq!(settings.job_poll_interval, DEFAULT_JOB_POLL_INTERVAL);
        assert_eq!(settings.event_capacity, 256);
    }

    #[test]
    fn test_reset_request_uses_settings() {
        let settings = MutationSettings::default()
            .with_reset_timeout(Duration::from_secs(60))
            .with_reset_poll_interval(Duration::from_secs(5));

        let request = settings.reset_request(ResetType::GracefulRestart);
        assert_eq!(request.reset_type, ResetType::GracefulRestart);
        assert_eq!(request.timeout, Duration::from_secs(60));
        assert_eq!(request.poll_interval, Duration::from_secs(5));
    }
}
