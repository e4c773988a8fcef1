//! Transport seam between the connection state machine and the socket.
//!
//! A [`Connector`] performs the handshake and hands back a
//! [`TransportHandle`]: a pair of channels carrying outgoing frames to the
//! socket and transport events from it. [`TungsteniteConnector`] is the
//! production implementation.

use std::fmt;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ClientError;

/// Close code reported when the socket went away without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported when the peer sent a close frame without a status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Close code reported for a caller-initiated disconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Something the socket reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Text(String),
    /// The socket failed. A [`TransportEvent::Closed`] follows.
    Error(String),
    /// The socket closed. Always the last event.
    Closed {
        /// Close code from the peer, or [`ABNORMAL_CLOSURE`].
        code: u16,
        /// Close reason from the peer.
        reason: String,
    },
}

/// Something to write to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingFrame {
    /// A text frame.
    Text(String),
    /// Start the close handshake.
    Close,
}

/// Channels attached to an open socket.
#[derive(Debug)]
pub struct TransportHandle {
    /// Frames to write.
    pub outgoing: mpsc::UnboundedSender<OutgoingFrame>,
    /// Events read from the socket.
    pub incoming: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens WebSocket connections.
pub trait Connector: fmt::Debug + Send + Sync {
    /// Performs the handshake with `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Handshake`] when the socket cannot be opened.
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<TransportHandle, ClientError>>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
///
/// Each socket gets a writer task draining the outgoing channel and a
/// reader task forwarding text frames. Ping/pong is answered by the
/// protocol layer; binary frames are dropped. `wss://` URLs need the
/// `rustls` crate feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<TransportHandle, ClientError>> {
        let url = url.to_string();
        Box::pin(async move {
            let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| ClientError::Handshake(e.to_string()))?;
            let (mut ws_tx, mut ws_rx) = stream.split();

            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutgoingFrame>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportEvent>();

            tokio::spawn(async move {
                while let Some(frame) = out_rx.recv().await {
                    match frame {
                        OutgoingFrame::Text(text) => {
                            if ws_tx.send(Message::text(text)).await.is_err() {
                                break;
                            }
                        }
                        OutgoingFrame::Close => {
                            let _ = ws_tx.close().await;
                            break;
                        }
                    }
                }
            });

            tokio::spawn(async move {
                let mut close = None;
                while let Some(msg) = ws_rx.next().await {
                    match msg {
                        Ok(Message::Text(text)) => {
                            if in_tx.send(TransportEvent::Text(text.as_str().to_string())).is_err() {
                                return;
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            // Keep polling so the close reply is flushed.
                            close = Some(frame.map_or((NO_STATUS_RECEIVED, String::new()), |f| {
                                (u16::from(f.code), f.reason.as_str().to_string())
                            }));
                        }
                        Ok(_) => {}
                        Err(err) => {
                            if close.is_none() {
                                let _ = in_tx.send(TransportEvent::Error(err.to_string()));
                            }
                            break;
                        }
                    }
                }
                let (code, reason) = close.unwrap_or((ABNORMAL_CLOSURE, String::new()));
                let _ = in_tx.send(TransportEvent::Closed { code, reason });
            });

            Ok(TransportHandle {
                outgoing: out_tx,
                incoming: in_rx,
            })
        })
    }
}
