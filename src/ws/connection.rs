//! Reconnecting chat connection.
//!
//! [`RealtimeConnection`] owns one logical chat session on top of a
//! physical WebSocket that is replaced on every reconnect. Inbound frames
//! become [`DispatchEvent`]s delivered to registered listeners and to the
//! [`EventBus`]; outbound chat text and commands go through the `send_*`
//! methods.
//!
//! # Failure reporting
//!
//! Only [`RealtimeConnection::connect`] returns an error. Malformed frames,
//! sends while closed, transport errors and an exhausted reconnect budget
//! are reported as `error`/`disconnected` events.
//!
//! # Tasks
//!
//! Each open socket has one driver task consuming [`TransportEvent`]s. A
//! pending reconnect is one timer task. Both are aborted by
//! [`RealtimeConnection::disconnect`]. State lives behind a mutex that is
//! never held while listeners run, so a listener may call back into the
//! connection. A generation counter makes events from a superseded socket
//! inert.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::messages::{InboundFrame, OutboundFrame, OutboundType};
use super::subscription::{ListenerId, ListenerRegistry, deliver};
use super::transport::{
    ABNORMAL_CLOSURE, Connector, NORMAL_CLOSURE, OutgoingFrame, TransportEvent, TransportHandle,
    TungsteniteConnector,
};
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::domain::{DispatchEvent, EventBus, EventKind};
use crate::error::ClientError;

/// Error event text for a send attempted while the socket is not open.
pub const NOT_CONNECTED_MESSAGE: &str = "Cannot send message: WebSocket is not connected";

/// Error event text for a frame the transport refused.
pub const SEND_FAILED_MESSAGE: &str = "Failed to send message";

/// Error event text for an inbound frame that is not a JSON object.
pub const PARSE_FAILED_MESSAGE: &str = "Failed to parse WebSocket message";

/// Error event text emitted when no reconnect attempts are left.
pub const RECONNECT_EXHAUSTED_MESSAGE: &str = "Reconnect attempts exhausted";

/// Capacity of the event bus when none is configured.
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// Internal lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Never connected.
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Socket open; sends are accepted.
    Open,
    /// The transport failed and its close is pending.
    Closing,
    /// No socket.
    Closed,
}

/// Caller-facing connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Handshake in flight.
    Connecting,
    /// Socket open.
    Connected,
    /// No socket; never connected or lost unexpectedly.
    Disconnected,
    /// Closed by the caller, or closing after a transport failure.
    Closed,
}

impl ConnectionStatus {
    /// Returns the status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for a socket to be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Caller,
    Reconnect,
}

#[derive(Debug)]
struct State {
    lifecycle: Lifecycle,
    auto_reconnect: bool,
    /// Set by `disconnect`, cleared by the next `connect`.
    shut_down: bool,
    reconnect_attempts: u32,
    client_id: Option<String>,
    generation: u64,
    outgoing: Option<mpsc::UnboundedSender<OutgoingFrame>>,
    driver: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Shared {
    url: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    state: Mutex<State>,
    listeners: Mutex<ListenerRegistry>,
    bus: EventBus,
}

/// A chat session with the backend over a reconnecting WebSocket.
///
/// Dropping the connection disconnects it.
#[derive(Debug)]
pub struct RealtimeConnection {
    shared: Arc<Shared>,
}

impl RealtimeConnection {
    /// Creates a connection to `url` using the `tokio-tungstenite`
    /// transport. Nothing is opened until [`RealtimeConnection::connect`].
    #[must_use]
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self::with_connector(url, policy, Arc::new(TungsteniteConnector))
    }

    /// Creates a connection from loaded configuration.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::build(
            config.resolved_url(),
            config.reconnect,
            Arc::new(TungsteniteConnector),
            config.event_bus_capacity,
        )
    }

    /// Creates a connection with a custom transport.
    #[must_use]
    pub fn with_connector(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self::build(url.into(), policy, connector, DEFAULT_EVENT_BUS_CAPACITY)
    }

    fn build(
        url: String,
        policy: ReconnectPolicy,
        connector: Arc<dyn Connector>,
        bus_capacity: usize,
    ) -> Self {
        let state = State {
            lifecycle: Lifecycle::Idle,
            auto_reconnect: policy.auto_reconnect,
            shut_down: false,
            reconnect_attempts: 0,
            client_id: None,
            generation: 0,
            outgoing: None,
            driver: None,
            reconnect_timer: None,
        };
        Self {
            shared: Arc::new(Shared {
                url,
                policy,
                connector,
                state: Mutex::new(state),
                listeners: Mutex::new(ListenerRegistry::new()),
                bus: EventBus::new(bus_capacity),
            }),
        }
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Opens the socket and waits for the handshake.
    ///
    /// Emits `connected` on success. On failure an `error` and a
    /// `disconnected` event are emitted and a reconnect is scheduled per
    /// the policy, then the error is returned. Calling `connect` after
    /// [`RealtimeConnection::disconnect`] re-arms auto-reconnect.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AlreadyActive`] if a socket is open or connecting.
    /// - [`ClientError::Handshake`] / [`ClientError::HandshakeTimeout`] if
    ///   the transport could not open the socket.
    /// - [`ClientError::Aborted`] if `disconnect` ran during the handshake.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.shared.open(Trigger::Caller).await
    }

    /// Closes the socket and cancels any pending reconnect. Idempotent.
    ///
    /// Emits `disconnected` (code 1000) if a socket was open.
    pub fn disconnect(&self) {
        self.shared.shutdown();
    }

    /// Sends chat text. Returns `false` and emits `error` if the socket is
    /// not open or refuses the frame.
    pub fn send_text_message(&self, content: &str) -> bool {
        self.shared.send(OutboundType::Text, content)
    }

    /// Sends a backend command, e.g. `task list`.
    pub fn send_command(&self, command: &str) -> bool {
        self.shared.send(OutboundType::Command, command)
    }

    /// Asks the backend for the status of a task.
    pub fn request_task_status(&self, task_id: &str) -> bool {
        self.shared.send(OutboundType::TaskStatus, task_id)
    }

    /// Asks the backend to cancel a task.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        self.send_command(&format!("task cancel {task_id}"))
    }

    /// Registers a listener for `kind`. Listeners on
    /// [`EventKind::Message`] also receive every other kind.
    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&DispatchEvent) + Send + Sync + 'static,
    {
        self.shared.listeners().add(kind, Arc::new(listener))
    }

    /// Removes a listener. Returns `false` if it was not registered for
    /// `kind`.
    pub fn remove_event_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.shared.listeners().remove(kind, id)
    }

    /// Returns a receiver of every dispatched event, once per event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.shared.bus.subscribe()
    }

    /// Returns `true` if the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lifecycle() == Lifecycle::Open
    }

    /// Caller-facing status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let state = self.shared.state();
        match state.lifecycle {
            Lifecycle::Connecting => ConnectionStatus::Connecting,
            Lifecycle::Open => ConnectionStatus::Connected,
            Lifecycle::Closing => ConnectionStatus::Closed,
            Lifecycle::Closed if state.shut_down => ConnectionStatus::Closed,
            Lifecycle::Idle | Lifecycle::Closed => ConnectionStatus::Disconnected,
        }
    }

    /// Internal lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.state().lifecycle
    }

    /// Session identifier assigned by the backend, if any.
    #[must_use]
    pub fn client_id(&self) -> Option<String> {
        self.shared.state().client_id.clone()
    }

    /// Reconnect attempts made since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.state().reconnect_attempts
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, ListenerRegistry> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn open(self: &Arc<Self>, trigger: Trigger) -> Result<(), ClientError> {
        let generation = {
            let mut state = self.state();
            if matches!(state.lifecycle, Lifecycle::Connecting | Lifecycle::Open) {
                return Err(ClientError::AlreadyActive);
            }
            match trigger {
                Trigger::Caller => {
                    state.auto_reconnect = self.policy.auto_reconnect;
                    state.shut_down = false;
                    if let Some(timer) = state.reconnect_timer.take() {
                        timer.abort();
                    }
                }
                Trigger::Reconnect => {
                    // The timer task is the caller; drop its handle.
                    state.reconnect_timer = None;
                    if !state.auto_reconnect {
                        return Err(ClientError::Aborted);
                    }
                }
            }
            if let Some(driver) = state.driver.take() {
                driver.abort();
            }
            if let Some(outgoing) = state.outgoing.take() {
                let _ = outgoing.send(OutgoingFrame::Close);
            }
            state.lifecycle = Lifecycle::Connecting;
            state.generation += 1;
            state.generation
        };

        tracing::debug!(url = %self.url, ?trigger, generation, "opening websocket");
        let attempt = self.connector.connect(&self.url);
        let result = match self.policy.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or_else(|_| Err(ClientError::HandshakeTimeout(limit))),
            None => attempt.await,
        };

        match result {
            Ok(handle) => self.on_open(generation, handle),
            Err(err) => Err(self.on_handshake_failure(generation, err)),
        }
    }

    fn on_open(self: &Arc<Self>, generation: u64, handle: TransportHandle) -> Result<(), ClientError> {
        let TransportHandle { outgoing, incoming } = handle;
        {
            let mut state = self.state();
            if state.generation != generation {
                let _ = outgoing.send(OutgoingFrame::Close);
                return Err(ClientError::Aborted);
            }
            state.lifecycle = Lifecycle::Open;
            state.reconnect_attempts = 0;
            state.outgoing = Some(outgoing);
        }

        tracing::info!(url = %self.url, "websocket connected");
        self.emit(DispatchEvent::connected());

        // Spawned after `connected` so no frame is dispatched before it.
        let driver = tokio::spawn(Arc::clone(self).drive(generation, incoming));
        let mut state = self.state();
        if state.generation == generation {
            state.driver = Some(driver);
        } else {
            driver.abort();
        }
        Ok(())
    }

    /// Returns the error `connect` reports: `err`, or
    /// [`ClientError::Aborted`] when the attempt was superseded meanwhile.
    fn on_handshake_failure(self: &Arc<Self>, generation: u64, err: ClientError) -> ClientError {
        {
            let mut state = self.state();
            if state.generation != generation {
                tracing::debug!(url = %self.url, error = %err, "superseded handshake failed");
                return ClientError::Aborted;
            }
            state.lifecycle = Lifecycle::Closed;
        }
        tracing::warn!(url = %self.url, error = %err, "websocket handshake failed");
        self.emit(DispatchEvent::error(format!("WebSocket connection error: {err}")));
        self.emit(DispatchEvent::disconnected(ABNORMAL_CLOSURE, ""));
        self.schedule_reconnect();
        err
    }

    async fn drive(
        self: Arc<Self>,
        generation: u64,
        mut incoming: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = incoming.recv().await {
            match event {
                TransportEvent::Text(text) => self.handle_frame(&text),
                TransportEvent::Error(message) => self.on_transport_error(generation, &message),
                TransportEvent::Closed { code, reason } => {
                    self.on_closed(generation, code, &reason);
                    return;
                }
            }
        }
        self.on_closed(generation, ABNORMAL_CLOSURE, "");
    }

    fn handle_frame(&self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(error = %err, "discarding malformed frame");
                self.emit(DispatchEvent::error(PARSE_FAILED_MESSAGE));
                return;
            }
        };

        if let Some(session_id) = frame.session_id() {
            let mut state = self.state();
            if state.client_id.as_deref() != Some(session_id) {
                tracing::debug!("session identifier assigned");
                state.client_id = Some(session_id.to_string());
            }
        }

        self.emit(DispatchEvent::from_message(frame.normalize()));
    }

    fn on_transport_error(&self, generation: u64, message: &str) {
        {
            let mut state = self.state();
            if state.generation == generation && state.lifecycle == Lifecycle::Open {
                state.lifecycle = Lifecycle::Closing;
            }
        }
        tracing::warn!(url = %self.url, error = message, "websocket transport error");
        self.emit(DispatchEvent::error(format!("WebSocket connection error: {message}")));
    }

    fn on_closed(self: &Arc<Self>, generation: u64, code: u16, reason: &str) {
        {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.lifecycle = Lifecycle::Closed;
            state.outgoing = None;
            state.driver = None;
        }
        tracing::info!(url = %self.url, code, reason, "websocket closed");
        self.emit(DispatchEvent::disconnected(code, reason));
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let scheduled = {
            let mut state = self.state();
            if !state.auto_reconnect || state.lifecycle != Lifecycle::Closed {
                return;
            }
            if state.reconnect_attempts >= self.policy.max_attempts {
                None
            } else {
                state.reconnect_attempts += 1;
                let shared = Arc::clone(self);
                let delay = self.policy.interval;
                state.reconnect_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(err) = shared.open(Trigger::Reconnect).await {
                        tracing::debug!(error = %err, "reconnect attempt did not open");
                    }
                }));
                Some(state.reconnect_attempts)
            }
        };

        match scheduled {
            Some(attempt) => tracing::info!(
                url = %self.url,
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = u64::try_from(self.policy.interval.as_millis()).unwrap_or(u64::MAX),
                "scheduling reconnect"
            ),
            None => {
                tracing::warn!(
                    url = %self.url,
                    max_attempts = self.policy.max_attempts,
                    "reconnect attempts exhausted"
                );
                self.emit(DispatchEvent::error(RECONNECT_EXHAUSTED_MESSAGE));
            }
        }
    }

    fn send(&self, frame_type: OutboundType, content: &str) -> bool {
        let failure = {
            let state = self.state();
            match (&state.outgoing, state.lifecycle) {
                (Some(outgoing), Lifecycle::Open) => {
                    let frame = OutboundFrame::new(frame_type, content, state.client_id.as_deref());
                    match serde_json::to_string(&frame) {
                        Ok(json) => outgoing
                            .send(OutgoingFrame::Text(json))
                            .err()
                            .map(|_| SEND_FAILED_MESSAGE),
                        Err(_) => Some(SEND_FAILED_MESSAGE),
                    }
                }
                _ => Some(NOT_CONNECTED_MESSAGE),
            }
        };

        match failure {
            None => {
                tracing::trace!(?frame_type, "frame sent");
                true
            }
            Some(message) => {
                tracing::debug!(?frame_type, reason = message, "frame not sent");
                self.emit(DispatchEvent::error(message));
                false
            }
        }
    }

    fn shutdown(&self) {
        let (outgoing, was_open) = {
            let mut state = self.state();
            state.auto_reconnect = false;
            state.shut_down = true;
            if let Some(timer) = state.reconnect_timer.take() {
                timer.abort();
            }
            if let Some(driver) = state.driver.take() {
                driver.abort();
            }
            let was_open = matches!(state.lifecycle, Lifecycle::Open | Lifecycle::Closing);
            state.generation += 1;
            state.lifecycle = Lifecycle::Closed;
            (state.outgoing.take(), was_open)
        };

        if let Some(outgoing) = outgoing {
            let _ = outgoing.send(OutgoingFrame::Close);
        }
        if was_open {
            tracing::info!(url = %self.url, "websocket disconnected by caller");
            self.emit(DispatchEvent::disconnected(NORMAL_CLOSURE, ""));
        }
    }

    fn emit(&self, event: DispatchEvent) {
        let targets = self.listeners().targets(event.kind);
        tracing::trace!(kind = %event.kind, listeners = targets.len(), "dispatching event");
        deliver(&targets, &event);
        self.bus.publish(event);
    }
}
