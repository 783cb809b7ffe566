//! bmcjobs Redfish client
//!
//! This crate provides the management-API side of BMC job orchestration:
//! the [`RedfishService`] operations the orchestration core consumes, an
//! HTTP implementation, and the Redfish wire types shared with callers.
//!
//! # Modules
//!
//! - **service**: the `RedfishService` trait and raw `RedfishResponse`
//! - **client**: `RedfishClient`, the `reqwest`-backed implementation
//! - **job**: task/job status documents collapsed into `JobStatus`
//! - **types**: apply times, reset types, power states, configuration
//! - **mock**: `MockRedfishService`, a scriptable controller for tests
//!
//! # Example
//!
//! ```no_run
//! use bmcjobs_redfish::{RedfishClient, RedfishConfig, RedfishService};
//!
//! # async fn example() -> bmcjobs_redfish::Result<()> {
//! let config = RedfishConfig::new("https://10.0.0.5", "root", "calvin").with_insecure(true);
//! let client = RedfishClient::new(config)?;
//!
//! let supported = client
//!     .operation_apply_time_values("/redfish/v1/Systems/System.Embedded.1/Storage/RAID.Integrated.1-1/Volumes")
//!     .await?;
//! println!("power: {}, apply times: {:?}", client.power_state().await?, supported);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod job;
pub mod mock;
pub mod service;
pub mod types;

pub use client::RedfishClient;
pub use error::{RedfishError, Result};
pub use job::{JobState, JobStatus};
pub use mock::{CallKind, MockRedfishService, RecordedCall};
pub use service::{parse_apply_time_support, RedfishResponse, RedfishService};
pub use types::{ApplyTime, PowerState, RedfishConfig, ResetType};
