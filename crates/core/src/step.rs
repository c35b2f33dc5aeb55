//! Task step records exchanged with the payments API.
//!
//! A step is owned by the external orchestration system. The agent only
//! reads it ([`TaskStep`]), and writes status/output back through a
//! [`StepUpdate`]. Nothing here is persisted locally.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;
use crate::types::Did;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Execution status of a step, using the payments API wire names.
///
/// Only [`Pending`](StepStatus::Pending) steps are processed. The
/// intermediate states are accepted so that status checks on foreign
/// steps do not fail deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    #[serde(rename = "Pending")]
    Pending,
    #[serde(rename = "In_Progress")]
    InProgress,
    #[serde(rename = "Not_Ready")]
    NotReady,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Failed")]
    Failed,
}

impl StepStatus {
    /// Wire name of the status, as sent to the payments API.
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "Pending",
            StepStatus::InProgress => "In_Progress",
            StepStatus::NotReady => "Not_Ready",
            StepStatus::Completed => "Completed",
            StepStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step identifier
// ---------------------------------------------------------------------------

/// Identifier triple of a step, as carried by subscription notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    pub did: Did,
    pub task_id: String,
    pub step_id: String,
}

impl StepRef {
    /// Decode a notification payload.
    ///
    /// The payments socket sends the payload either as a JSON object or as
    /// a string holding that object's JSON encoding; both are accepted.
    /// Unknown fields are ignored.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, CoreError> {
        let parsed = match payload {
            serde_json::Value::String(raw) => serde_json::from_str::<StepRef>(raw),
            other => serde_json::from_value::<StepRef>(other.clone()),
        };
        let step = parsed.map_err(|e| CoreError::InvalidPayload(e.to_string()))?;

        if step.step_id.is_empty() {
            return Err(CoreError::InvalidPayload("step_id is empty".into()));
        }
        Ok(step)
    }
}

// ---------------------------------------------------------------------------
// Step record
// ---------------------------------------------------------------------------

/// A step as returned by the payments API `get step` query.
///
/// Optional fields accept both a missing key and an explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub did: Did,
    pub task_id: String,
    pub step_id: String,
    pub step_status: StepStatus,
    /// Free-text (or JSON object) character description.
    #[serde(default, deserialize_with = "null_as_default")]
    pub input_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Artifact URLs produced for the step.
    #[serde(default, deserialize_with = "null_as_default")]
    pub output_artifacts: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_last: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl TaskStep {
    pub fn step_ref(&self) -> StepRef {
        StepRef {
            did: self.did.clone(),
            task_id: self.task_id.clone(),
            step_id: self.step_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Step update
// ---------------------------------------------------------------------------

/// Output text reported with a completed step.
pub const COMPLETED_OUTPUT: &str = "Image generated and uploaded to IPFS";

/// Body of the `update step` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub step_id: String,
    pub task_id: String,
    pub step_status: StepStatus,
    pub output: String,
    pub is_last: bool,
    pub output_artifacts: Vec<String>,
}

impl StepUpdate {
    /// Completed update carrying the uploaded artifact URLs.
    pub fn completed(step: &StepRef, output_artifacts: Vec<String>) -> Self {
        Self {
            step_id: step.step_id.clone(),
            task_id: step.task_id.clone(),
            step_status: StepStatus::Completed,
            output: COMPLETED_OUTPUT.to_string(),
            is_last: true,
            output_artifacts,
        }
    }

    /// Failed update with a human-readable reason and no artifacts.
    pub fn failed(step: &StepRef, reason: impl Into<String>) -> Self {
        Self {
            step_id: step.step_id.clone(),
            task_id: step.task_id.clone(),
            step_status: StepStatus::Failed,
            output: reason.into(),
            is_last: true,
            output_artifacts: Vec::new(),
        }
    }
}
