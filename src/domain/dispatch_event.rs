//! Events delivered to connection listeners.
//!
//! Every inbound frame, transport transition and local failure becomes a
//! [`DispatchEvent`]. Events are built synchronously, handed to listeners
//! and the [`super::EventBus`], then dropped; nothing is queued or retained.

use std::fmt;

use serde::Serialize;
use serde_json::json;

use super::chat_message::{ChatMessage, now_iso8601};

/// Category of a [`DispatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Regular chat message. Listeners on this kind also receive every
    /// other kind.
    Message,
    /// System notice from the backend.
    System,
    /// Backend error, malformed frame, send failure or transport error.
    Error,
    /// System notice carrying task progress.
    TaskUpdate,
    /// The socket opened (initially or after a reconnect).
    Connected,
    /// The socket closed.
    Disconnected,
}

impl EventKind {
    /// Derives the kind of an inbound chat message.
    ///
    /// System messages are `system`, or `task_update` when `data.task` is
    /// present or `data.status == "working"`. An error flag overrides the
    /// role-based kind. Everything else is `message`.
    #[must_use]
    pub fn classify(message: &ChatMessage) -> Self {
        if message.error {
            return Self::Error;
        }
        if !message.is_system() {
            return Self::Message;
        }
        let is_task = message.data.as_ref().is_some_and(|data| {
            data.get("task").is_some_and(|task| !task.is_null())
                || data.get("status").and_then(|s| s.as_str()) == Some("working")
        });
        if is_task { Self::TaskUpdate } else { Self::System }
    }

    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::System => "system",
            Self::Error => "error",
            Self::TaskUpdate => "task_update",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized event handed to listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchEvent {
    /// Event category.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The chat message, for events derived from an inbound frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
    /// Passthrough payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl DispatchEvent {
    /// Builds the event for a normalized inbound message.
    #[must_use]
    pub fn from_message(message: ChatMessage) -> Self {
        Self {
            kind: EventKind::classify(&message),
            data: message.data.clone(),
            message: Some(message),
        }
    }

    /// Socket opened.
    #[must_use]
    pub fn connected() -> Self {
        Self {
            kind: EventKind::Connected,
            message: None,
            data: Some(json!({ "timestamp": now_iso8601() })),
        }
    }

    /// Socket closed with the given close code and reason.
    #[must_use]
    pub fn disconnected(code: u16, reason: &str) -> Self {
        Self {
            kind: EventKind::Disconnected,
            message: None,
            data: Some(json!({
                "code": code,
                "reason": reason,
                "timestamp": now_iso8601(),
            })),
        }
    }

    /// Locally detected failure with a diagnostic message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            message: None,
            data: Some(json!({
                "message": message.into(),
                "timestamp": now_iso8601(),
            })),
        }
    }

    /// Returns the diagnostic text of an error event, or the content of the
    /// attached message.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.get("message"))
            .and_then(|m| m.as_str())
            .or_else(|| self.message.as_ref().map(|m| m.content.as_str()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Role;

    fn message(role: Role, error: bool, data: Option<serde_json::Value>) -> ChatMessage {
        ChatMessage {
            id: "m1".to_string(),
            role,
            content: "hello".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            error,
            data,
        }
    }

    #[test]
    fn assistant_and_user_are_messages() {
        assert_eq!(
            EventKind::classify(&message(Role::Assistant, false, None)),
            EventKind::Message
        );
        assert_eq!(
            EventKind::classify(&message(Role::User, false, None)),
            EventKind::Message
        );
        assert_eq!(
            EventKind::classify(&message(Role::Other("tool".into()), false, None)),
            EventKind::Message
        );
    }

    #[test]
    fn plain_system_is_system() {
        let msg = message(Role::System, false, Some(json!({ "client_id": "abc" })));
        assert_eq!(EventKind::classify(&msg), EventKind::System);
    }

    #[test]
    fn system_with_task_is_task_update() {
        let msg = message(Role::System, false, Some(json!({ "task": { "id": "t1" } })));
        assert_eq!(EventKind::classify(&msg), EventKind::TaskUpdate);
    }

    #[test]
    fn system_with_working_status_is_task_update() {
        let msg = message(Role::System, false, Some(json!({ "status": "working" })));
        assert_eq!(EventKind::classify(&msg), EventKind::TaskUpdate);
    }

    #[test]
    fn null_task_is_not_a_task_update() {
        let msg = message(Role::System, false, Some(json!({ "task": null })));
        assert_eq!(EventKind::classify(&msg), EventKind::System);
    }

    #[test]
    fn error_flag_overrides_every_role() {
        for role in [Role::User, Role::Assistant, Role::System] {
            let msg = message(role, true, Some(json!({ "task": {} })));
            assert_eq!(EventKind::classify(&msg), EventKind::Error);
        }
    }

    #[test]
    fn from_message_copies_data() {
        let data = json!({ "task": { "id": "t1", "progress": 10 } });
        let event = DispatchEvent::from_message(message(Role::System, false, Some(data.clone())));
        assert_eq!(event.kind, EventKind::TaskUpdate);
        assert_eq!(event.data, Some(data));
        assert!(event.message.is_some());
    }

    #[test]
    fn disconnected_carries_code_and_reason() {
        let event = DispatchEvent::disconnected(1000, "Normal closure");
        let Some(data) = event.data else {
            panic!("expected data");
        };
        assert_eq!(data["code"], 1000);
        assert_eq!(data["reason"], "Normal closure");
        assert!(data["timestamp"].is_string());
    }

    #[test]
    fn error_text_is_exposed() {
        let event = DispatchEvent::error("boom");
        assert_eq!(event.kind, EventKind::Error);
        assert_eq!(event.text(), Some("boom"));
    }

    #[test]
    fn serializes_kind_as_type() {
        let json = serde_json::to_value(DispatchEvent::connected()).unwrap_or_default();
        assert_eq!(json["type"], "connected");
        assert!(json.get("message").is_none());
    }
}
