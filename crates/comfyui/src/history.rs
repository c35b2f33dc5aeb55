//! Typed view of the ComfyUI `/history/{prompt_id}` response.
//!
//! The endpoint returns `{"<prompt_id>": {"outputs": {...}, "status": {...}}}`
//! once the prompt has finished, and `{}` while it is still queued or
//! running.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// Reference to an output file, as accepted by `/view`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "output".to_string()
}

/// Outputs produced by one node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// Execution status block of a history entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionStatus {
    #[serde(default)]
    pub status_str: String,
    #[serde(default)]
    pub completed: bool,
    /// `[event_name, data]` pairs recorded during execution.
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// History of a single prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
    #[serde(default)]
    pub status: ExecutionStatus,
}

/// Where a prompt is in its lifecycle, as seen through history.
#[derive(Debug, Clone)]
pub enum PromptState {
    /// Not in history yet: queued or running.
    Pending,
    Succeeded(HistoryEntry),
    /// Execution failed with the given message.
    Failed(String),
}

impl HistoryEntry {
    /// First image of `node_id`, falling back to the first image of any node.
    pub fn first_image(&self, node_id: &str) -> Option<&ImageRef> {
        self.outputs
            .get(node_id)
            .and_then(|out| out.images.first())
            .or_else(|| self.outputs.values().find_map(|out| out.images.first()))
    }

    /// Human-readable message from the `execution_error` event, if any.
    pub fn error_message(&self) -> Option<String> {
        self.status.messages.iter().find_map(|msg| {
            let pair = msg.as_array()?;
            if pair.first()?.as_str()? != "execution_error" {
                return None;
            }
            let data = pair.get(1)?;
            let message = data
                .get("exception_message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .trim();
            Some(match data.get("node_type").and_then(Value::as_str) {
                Some(node) => format!("{node}: {message}"),
                None => message.to_string(),
            })
        })
    }
}

/// Interpret a `/history/{prompt_id}` body.
pub fn prompt_state(history: &Value, prompt_id: &str) -> Result<PromptState, serde_json::Error> {
    let Some(raw) = history.get(prompt_id) else {
        return Ok(PromptState::Pending);
    };
    let entry: HistoryEntry = serde_json::from_value(raw.clone())?;

    if entry.status.status_str == "error" {
        let message = entry
            .error_message()
            .unwrap_or_else(|| "execution failed".to_string());
        return Ok(PromptState::Failed(message));
    }
    if entry.status.completed || !entry.outputs.is_empty() {
        return Ok(PromptState::Succeeded(entry));
    }
    Ok(PromptState::Pending)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn success(prompt_id: &str) -> Value {
        json!({
            prompt_id: {
                "outputs": {
                    "9": {"images": [{"filename": "imagen_00001_.png", "subfolder": "", "type": "output"}]}
                },
                "status": {"status_str": "success", "completed": true, "messages": []}
            }
        })
    }

    #[test]
    fn empty_history_is_pending() {
        assert_matches!(prompt_state(&json!({}), "p-1").unwrap(), PromptState::Pending);
    }

    #[test]
    fn completed_history_yields_save_image_output() {
        let state = prompt_state(&success("p-1"), "p-1").unwrap();
        let PromptState::Succeeded(entry) = state else {
            panic!("Expected Succeeded, got {state:?}");
        };
        let image = entry.first_image("9").unwrap();
        assert_eq!(image.filename, "imagen_00001_.png");
        assert_eq!(image.kind, "output");
    }

    #[test]
    fn other_prompt_ids_are_ignored() {
        assert_matches!(prompt_state(&success("p-2"), "p-1").unwrap(), PromptState::Pending);
    }

    #[test]
    fn first_image_falls_back_to_any_node() {
        let entry: HistoryEntry = serde_json::from_value(json!({
            "outputs": {"12": {"images": [{"filename": "a.png"}]}}
        }))
        .unwrap();
        let image = entry.first_image("9").unwrap();
        assert_eq!(image.filename, "a.png");
        assert_eq!(image.subfolder, "");
        assert_eq!(image.kind, "output");
    }

    #[test]
    fn execution_error_is_reported() {
        let history = json!({
            "p-1": {
                "outputs": {},
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [
                        ["execution_start", {"prompt_id": "p-1"}],
                        ["execution_error", {"node_type": "CheckpointLoaderSimple", "exception_message": "ckpt not found\n"}]
                    ]
                }
            }
        });
        assert_matches!(
            prompt_state(&history, "p-1").unwrap(),
            PromptState::Failed(msg) if msg == "CheckpointLoaderSimple: ckpt not found"
        );
    }
}
