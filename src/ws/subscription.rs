//! Per-connection listener registry.
//!
//! Tracks which callbacks a connection delivers each [`EventKind`] to and
//! invokes them in registration order.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::domain::{DispatchEvent, EventKind};

/// Callback invoked for each dispatched event.
pub type Listener = Arc<dyn Fn(&DispatchEvent) + Send + Sync>;

/// Handle returned by registration, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listeners of one connection, grouped by event kind.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventKind, usize> = self
            .listeners
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("next_id", &self.next_id)
            .field("listeners", &counts)
            .finish()
    }
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener for `kind`.
    pub fn add(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.entry(kind).or_default().push((id, listener));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered for
    /// `kind`.
    pub fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        list.len() != before
    }

    /// Returns the listeners an event of `kind` is delivered to: those
    /// registered for `kind`, followed by the `message` listeners when
    /// `kind` is not `message` itself.
    #[must_use]
    pub fn targets(&self, kind: EventKind) -> Vec<Listener> {
        let mut targets = self.callbacks(kind);
        if kind != EventKind::Message {
            targets.extend(self.callbacks(EventKind::Message));
        }
        targets
    }

    fn callbacks(&self, kind: EventKind) -> Vec<Listener> {
        self.listeners
            .get(&kind)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }
}

/// Invokes each listener in order. A panicking listener is logged and
/// skipped; the remaining listeners still run.
pub fn deliver(listeners: &[Listener], event: &DispatchEvent) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            tracing::warn!(kind = %event.kind, "event listener panicked");
        }
    }
}
