//! Persistent duplex channel to the assistant, keyed by session id
//!
//! State machine: `Idle -> Connecting -> Open -> Closed`. A channel closes on
//! read error, server close, failed handshake or explicit disconnect, and is
//! never reconnected automatically. Inbound frames are delivered through a
//! [`MessageStream`] that ends when the channel closes.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::context::ClientContext;
use crate::model::{ChatFrame, ChatRequest, Message};
use crate::{Error, Result};

/// Inbound messages buffered between the socket reader and the consumer
const INBOUND_BUFFER: usize = 64;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Never connected
    Idle,
    /// Handshake in progress
    Connecting,
    /// Connected; frames flow both ways
    Open,
    /// Disconnected, failed or closed by the server
    Closed,
}

struct Shared {
    state: ChannelState,
    /// Bumped on every connect so a stale reader cannot close a newer connection
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
    reader: Option<JoinHandle<()>>,
}

/// Realtime connection for one session
pub struct RealtimeChannel {
    url: Url,
    session_id: String,
    shared: Arc<Mutex<Shared>>,
}

impl RealtimeChannel {
    /// Create an idle channel for the context's current session
    ///
    /// # Errors
    ///
    /// Returns error if the realtime URL cannot be derived from the base URL
    pub fn new(ctx: &ClientContext) -> Result<Self> {
        let session_id = ctx.sessions().session_id();
        let url = ctx.realtime_url(&session_id)?;
        Ok(Self::with_url(url, session_id))
    }

    /// Create an idle channel for an explicit endpoint and session
    #[must_use]
    pub fn with_url(url: Url, session_id: impl Into<String>) -> Self {
        Self {
            url,
            session_id: session_id.into(),
            shared: Arc::new(Mutex::new(Shared {
                state: ChannelState::Idle,
                generation: 0,
                outbound: None,
                reader: None,
            })),
        }
    }

    /// Session the channel is keyed by
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Endpoint URL
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ChannelState {
        lock(&self.shared).state
    }

    /// Whether frames can be sent
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Open the connection and return the inbound message stream
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientInput` if already connecting or open, and
    /// `Error::Channel` if the handshake fails
    pub async fn connect(&self) -> Result<MessageStream> {
        let generation = {
            let mut shared = lock(&self.shared);
            if matches!(shared.state, ChannelState::Connecting | ChannelState::Open) {
                return Err(Error::ClientInput(
                    "realtime channel already connected".to_string(),
                ));
            }
            shared.state = ChannelState::Connecting;
            shared.generation += 1;
            shared.generation
        };

        tracing::debug!(url = %self.url, "realtime channel connecting");

        let ws = match tokio_tungstenite::connect_async(self.url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                let mut shared = lock(&self.shared);
                if shared.generation == generation {
                    shared.state = ChannelState::Closed;
                }
                tracing::warn!(url = %self.url, error = %e, "realtime handshake failed");
                return Err(Error::Channel(format!("connect failed: {e}")));
            }
        };

        let (mut write, mut read) = ws.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

        {
            let mut shared = lock(&self.shared);
            if shared.generation != generation || shared.state != ChannelState::Connecting {
                // disconnected while the handshake was in flight
                return Err(Error::Channel(
                    "disconnected during handshake".to_string(),
                ));
            }
            shared.state = ChannelState::Open;
            shared.outbound = Some(outbound_tx);

            let reader_shared = Arc::clone(&self.shared);
            let session_id = self.session_id.clone();
            shared.reader = Some(tokio::spawn(async move {
                while let Some(frame) = read.next().await {
                    match frame {
                        Ok(WsMessage::Text(text)) => {
                            let Some(message) = parse_frame(&text, &session_id) else {
                                continue;
                            };
                            if inbound_tx.send(message).await.is_err() {
                                tracing::trace!("inbound stream dropped, discarding message");
                            }
                        }
                        Ok(WsMessage::Close(frame)) => {
                            tracing::info!(?frame, "realtime channel closed by server");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "realtime channel read error");
                            break;
                        }
                    }
                }

                let mut shared = lock(&reader_shared);
                if shared.generation == generation && shared.state == ChannelState::Open {
                    shared.state = ChannelState::Closed;
                    shared.outbound = None;
                }
            }));
        }

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let closing = matches!(frame, WsMessage::Close(_));
                if let Err(e) = write.send(frame).await {
                    tracing::warn!(error = %e, "realtime channel write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = write.close().await;
        });

        tracing::info!(session_id = %self.session_id, "realtime channel open");
        Ok(MessageStream {
            inner: ReceiverStream::new(inbound_rx),
        })
    }

    /// Send a chat message over the open channel
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientInput` if the channel is not open and
    /// `Error::Channel` if the connection has gone away
    pub fn send(&self, text: &str) -> Result<()> {
        let mut shared = lock(&self.shared);

        let outbound = match (&shared.state, &shared.outbound) {
            (ChannelState::Open, Some(outbound)) => outbound,
            _ => {
                return Err(Error::ClientInput(
                    "realtime channel not connected".to_string(),
                ));
            }
        };

        let frame = serde_json::to_string(&ChatRequest::new(text, &self.session_id))?;
        if outbound.send(WsMessage::Text(frame)).is_err() {
            shared.state = ChannelState::Closed;
            shared.outbound = None;
            return Err(Error::Channel("connection closed".to_string()));
        }

        tracing::debug!(session_id = %self.session_id, "realtime message sent");
        Ok(())
    }

    /// Close the connection; a no-op if already closed
    ///
    /// An idle channel moves straight to `Closed`.
    pub fn disconnect(&self) {
        let mut shared = lock(&self.shared);

        match shared.state {
            ChannelState::Closed => {
                tracing::trace!("realtime channel already closed");
                return;
            }
            ChannelState::Idle => {
                shared.state = ChannelState::Closed;
                return;
            }
            ChannelState::Connecting | ChannelState::Open => {}
        }

        shared.state = ChannelState::Closed;
        if let Some(outbound) = shared.outbound.take() {
            let _ = outbound.send(WsMessage::Close(None));
        }
        if let Some(reader) = shared.reader.take() {
            reader.abort();
        }

        tracing::info!(session_id = %self.session_id, "realtime channel disconnected");
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("url", &self.url.as_str())
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Inbound messages in arrival order; ends when the channel closes
///
/// Dropping the stream discards further inbound messages but leaves the
/// channel open for sending.
#[derive(Debug)]
pub struct MessageStream {
    inner: ReceiverStream<Message>,
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Parse an inbound text frame, logging and dropping malformed ones
fn parse_frame(text: &str, session_id: &str) -> Option<Message> {
    match serde_json::from_str::<ChatFrame>(text) {
        Ok(frame) => Some(frame.into_message(session_id)),
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed realtime frame");
            None
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn channel() -> RealtimeChannel {
        RealtimeChannel::with_url(
            Url::parse("ws://127.0.0.1:9/api/v1/agent/ws/s1").unwrap(),
            "s1",
        )
    }

    #[test]
    fn test_parse_frame() {
        let msg = parse_frame(r#"{"message":"hello","type":"ai"}"#, "s1").unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.session_id, "s1");

        assert!(parse_frame("not json", "s1").is_none());
        assert!(parse_frame(r#"{"type":"ai"}"#, "s1").is_none());
    }

    #[test]
    fn test_send_when_idle_is_rejected() {
        let channel = channel();
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(matches!(channel.send("hi"), Err(Error::ClientInput(_))));
    }

    #[test]
    fn test_disconnect_when_idle_closes() {
        let channel = channel();
        channel.disconnect();
        assert_eq!(channel.state(), ChannelState::Closed);

        channel.disconnect();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(matches!(channel.send("hi"), Err(Error::ClientInput(_))));
    }

    #[tokio::test]
    async fn test_failed_handshake_closes() {
        let channel = channel();
        let err = channel.connect().await.unwrap_err();
        assert!(matches!(err, Error::Channel(_)));
        assert_eq!(channel.state(), ChannelState::Closed);

        channel.disconnect();
        assert_eq!(channel.state(), ChannelState::Closed);
    }
}
