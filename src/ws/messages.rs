//! WebSocket frame types exchanged with the chat backend.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::chat_message::{generate_message_id, now_iso8601};
use crate::domain::{ChatMessage, Role};

/// `client_id` sent before the backend has assigned a session identifier.
pub const UNKNOWN_CLIENT_ID: &str = "unknown";

/// Frame received from the backend.
///
/// Every field is optional and unknown fields are ignored. Scalar fields are
/// read loosely: falsy values (`null`, `false`, `0`, `""`) count as absent,
/// numbers and booleans given where text is expected are stringified, and
/// `error` is true for any truthy value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundFrame {
    /// Server-assigned message ID.
    #[serde(default, deserialize_with = "loose_text")]
    pub id: Option<String>,
    /// Sender role.
    #[serde(default, deserialize_with = "loose_role")]
    pub role: Option<Role>,
    /// Message text.
    #[serde(default, deserialize_with = "loose_text")]
    pub content: Option<String>,
    /// ISO-8601 timestamp.
    #[serde(default, deserialize_with = "loose_text")]
    pub timestamp: Option<String>,
    /// Error flag.
    #[serde(default, deserialize_with = "loose_flag")]
    pub error: Option<bool>,
    /// Free-form payload (`client_id`, `task`, `status`, ...).
    #[serde(default)]
    pub data: Option<Value>,
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.filter(is_truthy).map(|value| match value {
        Value::String(text) => text,
        other => other.to_string(),
    }))
}

fn loose_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_text(deserializer)?.map(Role::from))
}

fn loose_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.map(|value| is_truthy(&value)))
}

impl InboundFrame {
    /// Parses a text frame. Anything but a JSON object is rejected.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when `text` is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let object = serde_json::from_str::<serde_json::Map<String, Value>>(text)?;
        serde_json::from_value(Value::Object(object))
    }

    /// Returns the session identifier announced by a system frame in
    /// `data.client_id`.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        if self.role != Some(Role::System) {
            return None;
        }
        self.data
            .as_ref()?
            .get("client_id")?
            .as_str()
            .filter(|id| !id.is_empty())
    }

    /// Fills in missing fields and produces a [`ChatMessage`].
    ///
    /// A missing or empty `id` is generated, a missing `timestamp` becomes
    /// the receipt time, a missing `role` is `system`.
    #[must_use]
    pub fn normalize(self) -> ChatMessage {
        ChatMessage {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(generate_message_id),
            role: self.role.unwrap_or(Role::System),
            content: self.content.unwrap_or_default(),
            timestamp: self
                .timestamp
                .filter(|ts| !ts.is_empty())
                .unwrap_or_else(now_iso8601),
            error: self.error.unwrap_or(false),
            data: self.data,
        }
    }
}

/// Discriminator of an outbound frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutboundType {
    /// Chat text typed by the user.
    Text,
    /// Backend command, e.g. `task cancel <id>`.
    Command,
    /// Request for the status of a task; `content` is the task ID.
    TaskStatus,
}

/// Frame sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Frame type discriminator.
    #[serde(rename = "type")]
    pub frame_type: OutboundType,
    /// Text, command or task ID.
    pub content: String,
    /// Session identifier, or `"unknown"` before one was assigned.
    pub client_id: String,
    /// ISO-8601 send time.
    pub timestamp: String,
}

impl OutboundFrame {
    /// Builds a frame stamped with the current time.
    #[must_use]
    pub fn new(frame_type: OutboundType, content: impl Into<String>, client_id: Option<&str>) -> Self {
        Self {
            frame_type,
            content: content.into(),
            client_id: client_id.unwrap_or(UNKNOWN_CLIENT_ID).to_string(),
            timestamp: now_iso8601(),
        }
    }
}
