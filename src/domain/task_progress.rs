//! Typed view of backend task progress.

use serde::{Deserialize, Serialize};

use super::{DispatchEvent, EventKind};

/// Progress of a backend task, read from `data.task` on a `task_update`
/// event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    /// Backend task identifier.
    #[serde(rename = "id")]
    pub task_id: String,
    /// Completion percentage; 0 when the backend omits it.
    #[serde(default)]
    pub progress: f64,
    /// Backend status string (`running`, `completed`, `failed`, ...).
    #[serde(default)]
    pub status: String,
    /// Kind of task, when reported.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
}

impl TaskProgress {
    /// Extracts task progress from a `task_update` event.
    ///
    /// Returns `None` for other kinds, or when `data.task` is missing or
    /// does not carry an `id`.
    #[must_use]
    pub fn from_event(event: &DispatchEvent) -> Option<Self> {
        if event.kind != EventKind::TaskUpdate {
            return None;
        }
        let task = event.data.as_ref()?.get("task")?;
        serde_json::from_value(task.clone()).ok()
    }

    /// Returns `true` once the task has finished, successfully or not.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "failed")
    }
}
