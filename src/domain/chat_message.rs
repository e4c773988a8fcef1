//! Normalized chat message and sender role.
//!
//! A [`ChatMessage`] is what listeners see after an inbound frame has been
//! parsed and its missing fields filled in. Fields that were present on the
//! wire are carried through untouched.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Author of a chat message.
///
/// The backend sends `user`, `assistant` or `system`; any other string is
/// preserved verbatim in [`Role::Other`] so that unknown roles still reach
/// listeners.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Message typed by the human user.
    User,
    /// Reply produced by the agent.
    Assistant,
    /// Backend notice (session info, task progress, errors).
    System,
    /// Role string not known to this client.
    Other(String),
}

impl Role {
    /// Returns the wire representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            _ => Self::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned ID, or a generated `msg_<uuid>` when absent.
    pub id: String,
    /// Sender role.
    pub role: Role,
    /// Message text. Empty when the frame carried none.
    pub content: String,
    /// ISO-8601 timestamp; receipt time when the frame carried none.
    pub timestamp: String,
    /// Whether the backend flagged this message as an error.
    #[serde(default)]
    pub error: bool,
    /// Free-form payload attached by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ChatMessage {
    /// Returns `true` if this is a system message.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Generates an ID for a message that arrived without one.
#[must_use]
pub fn generate_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// Current UTC time as ISO-8601 with millisecond precision and a `Z` suffix,
/// e.g. `2024-03-01T09:15:02.123Z`.
#[must_use]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
