//! # chat-realtime
//!
//! Reconnecting WebSocket client for a chat/agent backend that also
//! reports task progress.
//!
//! A [`RealtimeConnection`] keeps one logical chat session alive across
//! socket replacements, classifies every inbound JSON frame into a typed
//! [`DispatchEvent`] and delivers it to listeners registered per
//! [`EventKind`]. Outbound chat text, commands and task-status requests are
//! plain method calls that never fail loudly: problems surface as `error`
//! events.
//!
//! ## Architecture
//!
//! ```text
//! Caller (UI, CLI)
//!     │
//!     ├── RealtimeConnection (ws/connection)
//!     │       ├── ListenerRegistry (ws/subscription)
//!     │       └── EventBus (domain/)
//!     │
//!     ├── Frames: InboundFrame / OutboundFrame (ws/messages)
//!     │
//!     └── Connector (ws/transport)
//!             └── tokio-tungstenite
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use chat_realtime::config::ReconnectPolicy;
//! use chat_realtime::{EventKind, RealtimeConnection};
//!
//! # async fn run() -> Result<(), chat_realtime::ClientError> {
//! let conn = RealtimeConnection::new("ws://localhost:8080/ws", ReconnectPolicy::default());
//! conn.add_event_listener(EventKind::Message, |event| {
//!     if let Some(message) = &event.message {
//!         println!("{}: {}", message.role, message.content);
//!     }
//! });
//! conn.connect().await?;
//! conn.send_text_message("hello");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod ws;

pub use domain::{ChatMessage, DispatchEvent, EventKind, Role, TaskProgress};
pub use error::ClientError;
pub use ws::{ConnectionStatus, RealtimeConnection};
