//! Domain layer: chat messages, dispatch events and the event bus.
//!
//! Nothing here knows about sockets. The `ws` layer parses frames into
//! these types and drives delivery.

pub mod chat_message;
pub mod dispatch_event;
pub mod event_bus;
pub mod task_progress;

pub use chat_message::{ChatMessage, Role};
pub use dispatch_event::{DispatchEvent, EventKind};
pub use event_bus::EventBus;
pub use task_progress::TaskProgress;
