//! Task log entries recorded against a task through the payments socket.

use serde::{Deserialize, Serialize};

use crate::step::StepStatus;

/// Severity of a task log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// A message/level/status triple attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLog {
    pub task_id: String,
    pub message: String,
    pub level: LogLevel,
    /// Status the task moves to, when the entry marks a transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_status: Option<StepStatus>,
}

impl TaskLog {
    pub fn info(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            message: message.into(),
            level: LogLevel::Info,
            task_status: None,
        }
    }

    pub fn error(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            message: message.into(),
            level: LogLevel::Error,
            task_status: None,
        }
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.task_status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_without_status_when_absent() {
        let log = TaskLog::info("task-1", "Starting image generation...");
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["level"], "info");
        assert!(json.get("task_status").is_none());
    }

    #[test]
    fn serializes_status_with_wire_name() {
        let log = TaskLog::error("task-1", "No character data provided.")
            .with_status(StepStatus::Failed);
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["task_status"], "Failed");
    }
}
