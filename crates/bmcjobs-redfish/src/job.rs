//! Job and task status documents
//!
//! Controllers report asynchronous work either as a standard Redfish
//! `Task` (`TaskState`, `TaskStatus`, `Messages`) or as an OEM job
//! (`JobState`, `Message`). Both collapse into [`JobStatus`].

use serde_json::Value;

/// Coarse job state used by pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Still queued or executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
}

impl JobState {
    /// Whether polling can stop
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Parsed status of one job resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    /// Coarse state
    pub state: JobState,
    /// State string as reported by the controller
    pub raw_state: String,
    /// Controller message, verbatim
    pub message: Option<String>,
    /// `PercentComplete`, clamped to 100
    pub percent_complete: Option<u8>,
}

impl JobStatus {
    /// Parse a task or job document. Returns `None` when the document
    /// carries neither `TaskState` nor `JobState`.
    pub fn from_value(doc: &Value) -> Option<Self> {
        let raw_state = doc
            .get("TaskState")
            .or_else(|| doc.get("JobState"))
            .and_then(Value::as_str)?
            .to_string();

        let mut state = classify(&raw_state);

        // A task can finish with TaskState=Completed and a Critical health
        if state == JobState::Completed
            && doc.get("TaskStatus").and_then(Value::as_str) == Some("Critical")
        {
            state = JobState::Failed;
        }

        let percent_complete = doc
            .get("PercentComplete")
            .and_then(Value::as_u64)
            .map(|p| p.min(100) as u8);

        Some(Self {
            state,
            raw_state,
            message: message_of(doc),
            percent_complete,
        })
    }
}

fn classify(raw_state: &str) -> JobState {
    match raw_state {
        "Completed" => JobState::Completed,
        "Exception" | "Killed" | "Cancelled" | "Failed" | "CompletedWithErrors" => JobState::Failed,
        _ => JobState::Running,
    }
}

fn message_of(doc: &Value) -> Option<String> {
    if let Some(message) = doc.get("Message").and_then(Value::as_str) {
        if !message.is_empty() {
            return Some(message.to_string());
        }
    }

    doc.get("Messages")
        .and_then(Value::as_array)?
        .iter()
        .rev()
        .filter_map(|m| m.get("Message").and_then(Value::as_str))
        .find(|m| !m.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_states() {
        let running = JobStatus::from_value(&json!({ "TaskState": "Starting" })).unwrap();
        assert_eq!(running.state, JobState::Running);
        assert!(!running.state.is_terminal());

        let done = JobStatus::from_value(&json!({ "TaskState": "Completed" })).unwrap();
        assert_eq!(done.state, JobState::Completed);

        let killed = JobStatus::from_value(&json!({ "TaskState": "Killed" })).unwrap();
        assert_eq!(killed.state, JobState::Failed);
        assert_eq!(killed.raw_state, "Killed");
    }

    #[test]
    fn test_oem_job_document() {
        let doc = json!({
            "Id": "JID_878264525940",
            "JobState": "Failed",
            "Message": "disk not found",
            "PercentComplete": 100
        });
        let status = JobStatus::from_value(&doc).unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.message.as_deref(), Some("disk not found"));
        assert_eq!(status.percent_complete, Some(100));
    }

    #[test]
    fn test_task_messages_use_latest_entry() {
        let doc = json!({
            "TaskState": "Exception",
            "Messages": [
                { "Message": "Job scheduled" },
                { "Message": "Unable to create virtual disk" }
            ]
        });
        let status = JobStatus::from_value(&doc).unwrap();
        assert_eq!(
            status.message.as_deref(),
            Some("Unable to create virtual disk")
        );
    }

    #[test]
    fn test_completed_with_critical_status_is_failure() {
        let doc = json!({ "TaskState": "Completed", "TaskStatus": "Critical" });
        assert_eq!(JobStatus::from_value(&doc).unwrap().state, JobState::Failed);
    }

    #[test]
    fn test_document_without_state() {
        assert!(JobStatus::from_value(&json!({ "Id": "JID_1" })).is_none());
    }

    #[test]
    fn test_percent_is_clamped() {
        let doc = json!({ "TaskState": "Running", "PercentComplete": 250 });
        assert_eq!(JobStatus::from_value(&doc).unwrap().percent_complete, Some(100));
    }
}
