//! WebSocket layer: frames, transport and the reconnecting connection.
//!
//! The chat backend exposes a single `/ws` endpoint speaking JSON text
//! frames. [`RealtimeConnection`] is the entry point; the other modules are
//! its building blocks.

pub mod connection;
pub mod messages;
pub mod subscription;
pub mod transport;

pub use connection::{ConnectionStatus, Lifecycle, RealtimeConnection};
pub use messages::{InboundFrame, OutboundFrame, OutboundType};
pub use subscription::{Listener, ListenerId};
pub use transport::{Connector, TungsteniteConnector};
