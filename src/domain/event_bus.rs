//! Async fan-out of dispatched events.
//!
//! Callbacks registered on the connection run inline on the socket task.
//! [`EventBus`] is the other way to consume the same stream: each
//! [`subscribe`](EventBus::subscribe) call returns a receiver that can be
//! awaited from any task.
//!
//! The bus keeps the last `capacity` events. A receiver that falls further
//! behind does not block the connection; its next `recv` returns
//! [`broadcast::error::RecvError::Lagged`] with the number of events it
//! missed, then resumes at the oldest event still retained.

use tokio::sync::broadcast;

use super::DispatchEvent;

/// Bounded broadcast of [`DispatchEvent`]s to async consumers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
    /// Creates a bus retaining up to `capacity` undelivered events per
    /// receiver. Zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Hands `event` to every current receiver.
    ///
    /// Never blocks and never fails: with nobody subscribed the event is
    /// dropped, and a full buffer evicts the oldest event for slow
    /// receivers instead of waiting.
    pub fn publish(&self, event: DispatchEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("no event bus subscribers");
        }
    }

    /// Receiver of every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }
}
