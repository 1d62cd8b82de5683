//! Assistant session: the single source of truth for what the user said, what
//! the assistant replied, and which products resulted
//!
//! Every send gets a monotonically increasing sequence number. The transcript
//! is append-only; user messages are echoed before any network call. A send
//! whose reply carries a product-search intent issues one follow-up
//! suggestions fetch, and its result is applied only if no newer send has
//! started since (last-send-wins).
//!
//! State mutations are short synchronous critical sections that are never held
//! across an await, so concurrent sends interleave only at network
//! suspension points.

mod backend;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;

pub use backend::AssistantBackend;

use crate::model::{ChatRequest, Intent, Message, Product, Role, SuggestionCriteria};
use crate::realtime::RealtimeChannel;
use crate::store::SessionStore;
use crate::voice::VoiceRecording;
use crate::{Error, Result};

/// Buffered notifications per subscriber before old ones are dropped
const NOTIFICATION_CAPACITY: usize = 32;

/// Progress of the most recent send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    /// Nothing in flight for the latest send
    Idle,
    /// Waiting for the assistant reply
    AwaitingReply { seq: u64 },
    /// Reply received, waiting for product suggestions
    AwaitingSuggestions { seq: u64 },
}

impl SendPhase {
    const fn seq(self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::AwaitingReply { seq } | Self::AwaitingSuggestions { seq } => Some(seq),
        }
    }
}

/// What happened to the suggestion set after a text send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionsOutcome {
    /// The reply did not ask for suggestions
    NotRequested,
    /// The suggestion set was replaced
    Applied { count: usize },
    /// A newer send started first; the result was discarded or never fetched
    Superseded,
}

/// Result of a successful text send
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    /// Sequence number of the send
    pub seq: u64,
    /// Assistant reply appended to the transcript
    pub reply: Message,
    /// Intent attached to the reply
    pub intent: Option<Intent>,
    /// Effect on the suggestion set
    pub suggestions: SuggestionsOutcome,
}

/// User-visible failure report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Send the failure belongs to, if any
    pub seq: Option<u64>,
    /// Which step failed (`chat`, `suggestions`, `voice`, `realtime`, `input`)
    pub step: &'static str,
    /// Error classification
    pub kind: &'static str,
    /// Human-readable description
    pub message: String,
}

struct SessionState {
    transcript: Vec<Message>,
    suggestions: Vec<Product>,
    latest_seq: u64,
    phase: SendPhase,
}

impl SessionState {
    fn begin_send(&mut self) -> u64 {
        self.latest_seq += 1;
        self.phase = SendPhase::AwaitingReply {
            seq: self.latest_seq,
        };
        self.latest_seq
    }

    /// Return the phase to idle if it still belongs to `seq`
    fn settle(&mut self, seq: u64) {
        if self.phase.seq() == Some(seq) {
            self.phase = SendPhase::Idle;
        }
    }
}

/// Conversation with the shopping assistant
pub struct AssistantSession {
    backend: Arc<dyn AssistantBackend>,
    sessions: SessionStore,
    state: Mutex<SessionState>,
    notifications: broadcast::Sender<Notification>,
}

impl AssistantSession {
    /// Create a session with an empty transcript
    #[must_use]
    pub fn new(backend: Arc<dyn AssistantBackend>, sessions: SessionStore) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            backend,
            sessions,
            state: Mutex::new(SessionState {
                transcript: Vec::new(),
                suggestions: Vec::new(),
                latest_seq: 0,
                phase: SendPhase::Idle,
            }),
            notifications,
        }
    }

    /// Seed the transcript with an assistant greeting
    #[must_use]
    pub fn with_greeting(self, text: &str) -> Self {
        let message = Message::assistant(text, self.sessions.session_id());
        self.lock().transcript.push(message);
        self
    }

    /// Current session id, read from durable storage
    #[must_use]
    pub fn session_id(&self) -> String {
        self.sessions.session_id()
    }

    /// Snapshot of the transcript
    #[must_use]
    pub fn transcript(&self) -> Vec<Message> {
        self.lock().transcript.clone()
    }

    /// Snapshot of the current suggestion set
    #[must_use]
    pub fn suggestions(&self) -> Vec<Product> {
        self.lock().suggestions.clone()
    }

    /// Phase of the latest send
    #[must_use]
    pub fn phase(&self) -> SendPhase {
        self.lock().phase
    }

    /// Sequence number of the latest send (0 before any send)
    #[must_use]
    pub fn latest_seq(&self) -> u64 {
        self.lock().latest_seq
    }

    /// Subscribe to failure notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Send a text message
    ///
    /// The user message is appended before the chat request is issued and is
    /// never rolled back. A product-search reply triggers one suggestions
    /// fetch whose result replaces the suggestion set only if this is still
    /// the latest send.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientInput` for blank text, otherwise the error of the
    /// failed chat or suggestions call. Each failure is also published as a
    /// [`Notification`]. On failure no assistant message is synthesized and
    /// the suggestion set is left unchanged.
    pub async fn send_text(&self, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(self.fail(None, "input", Error::ClientInput("message is empty".to_string())));
        }

        let session_id = self.sessions.session_id();
        let seq = {
            let mut state = self.lock();
            state.transcript.push(Message::user(text, &session_id));
            state.begin_send()
        };
        tracing::debug!(seq, session_id = %session_id, "sending text");

        let request = ChatRequest::new(text, &session_id);
        let reply = match self.backend.chat(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                self.lock().settle(seq);
                return Err(self.fail(Some(seq), "chat", e));
            }
        };

        let wants_suggestions = reply.wants_suggestions();
        let intent = reply.intent.clone();
        let preferences = reply.suggestions.clone();
        let message = Message::assistant(reply.response, &session_id);

        let still_latest = {
            let mut state = self.lock();
            state.transcript.push(message.clone());
            let still_latest = state.latest_seq == seq;
            if wants_suggestions && still_latest {
                state.phase = SendPhase::AwaitingSuggestions { seq };
            } else {
                state.settle(seq);
            }
            still_latest
        };

        let outcome = |suggestions| SendOutcome {
            seq,
            reply: message.clone(),
            intent: intent.clone(),
            suggestions,
        };

        if !wants_suggestions {
            return Ok(outcome(SuggestionsOutcome::NotRequested));
        }
        if !still_latest {
            tracing::debug!(seq, "send superseded before suggestions fetch");
            return Ok(outcome(SuggestionsOutcome::Superseded));
        }

        let criteria = SuggestionCriteria::for_query(text, preferences);
        let products = match self.backend.suggestions(&criteria).await {
            Ok(products) => products,
            Err(e) => {
                self.lock().settle(seq);
                return Err(self.fail(Some(seq), "suggestions", e));
            }
        };

        let mut state = self.lock();
        if state.latest_seq != seq {
            tracing::debug!(seq, latest = state.latest_seq, "discarding superseded suggestions");
            return Ok(outcome(SuggestionsOutcome::Superseded));
        }

        let count = products.len();
        state.suggestions = products;
        state.settle(seq);
        drop(state);

        tracing::info!(seq, count, "suggestions updated");
        Ok(outcome(SuggestionsOutcome::Applied { count }))
    }

    /// Upload a voice recording and append the assistant's reply
    ///
    /// The spoken utterance is not echoed locally since its text is only
    /// known server-side. The upload counts as a new send, so suggestion
    /// results of earlier sends are discarded.
    ///
    /// # Errors
    ///
    /// Returns the upload error after publishing a [`Notification`]; the
    /// transcript is left unchanged
    pub async fn send_voice(&self, recording: VoiceRecording) -> Result<Message> {
        let session_id = self.sessions.session_id();
        let seq = self.lock().begin_send();
        tracing::debug!(seq, audio_bytes = recording.len(), "sending voice");

        match self.backend.voice(recording, &session_id).await {
            Ok(reply) => {
                let message = Message::assistant(reply.response, &session_id);
                let mut state = self.lock();
                state.transcript.push(message.clone());
                state.settle(seq);
                Ok(message)
            }
            Err(e) => {
                self.lock().settle(seq);
                Err(self.fail(Some(seq), "voice", e))
            }
        }
    }

    /// Send a text message over an open realtime channel
    ///
    /// The reply arrives through the channel's stream; feed it to
    /// [`Self::receive`] or [`Self::pump`].
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientInput` for blank text or a channel that is not
    /// open (nothing is appended), or the channel error after the user
    /// message was echoed
    pub fn send_realtime(&self, channel: &RealtimeChannel, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(self.fail(None, "input", Error::ClientInput("message is empty".to_string())));
        }
        if !channel.is_open() {
            return Err(self.fail(
                None,
                "realtime",
                Error::ClientInput("realtime channel not connected".to_string()),
            ));
        }

        let seq = {
            let mut state = self.lock();
            state
                .transcript
                .push(Message::user(text, channel.session_id()));
            state.begin_send()
        };

        channel.send(text).map_err(|e| {
            self.lock().settle(seq);
            self.fail(Some(seq), "realtime", e)
        })
    }

    /// Append a message that arrived over the realtime channel
    pub fn receive(&self, message: Message) {
        let mut state = self.lock();
        if message.role == Role::Assistant
            && matches!(state.phase, SendPhase::AwaitingReply { .. })
        {
            state.phase = SendPhase::Idle;
        }
        state.transcript.push(message);
    }

    /// Append every message from `stream` until it ends; returns the count
    pub async fn pump<S>(&self, stream: S) -> usize
    where
        S: Stream<Item = Message>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut received = 0;
        while let Some(message) = stream.next().await {
            self.receive(message);
            received += 1;
        }
        tracing::debug!(received, "realtime stream ended");
        received
    }

    fn fail(&self, seq: Option<u64>, step: &'static str, error: Error) -> Error {
        tracing::warn!(seq, step, kind = error.kind(), error = %error, "assistant request failed");

        // no subscribers is fine
        let _ = self.notifications.send(Notification {
            seq,
            step,
            kind: error.kind(),
            message: error.to_string(),
        });
        error
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for AssistantSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("AssistantSession")
            .field("transcript", &state.transcript.len())
            .field("suggestions", &state.suggestions.len())
            .field("phase", &state.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::model::ChatReply;
    use crate::store::MemoryStore;

    /// Replies to every chat with a fixed reply and never suggests
    struct EchoBackend;

    #[async_trait]
    impl AssistantBackend for EchoBackend {
        async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
            Ok(ChatReply {
                response: format!("echo: {}", request.message),
                intent: Some(Intent::new("greeting")),
                suggestions: None,
            })
        }

        async fn voice(&self, recording: VoiceRecording, _session_id: &str) -> Result<ChatReply> {
            Ok(ChatReply {
                response: format!("heard {} bytes", recording.len()),
                intent: None,
                suggestions: None,
            })
        }

        async fn suggestions(&self, _criteria: &SuggestionCriteria) -> Result<Vec<Product>> {
            Err(Error::Network("unexpected".to_string()))
        }
    }

    fn session() -> AssistantSession {
        AssistantSession::new(Arc::new(EchoBackend), SessionStore::new(MemoryStore::shared()))
    }

    #[tokio::test]
    async fn test_blank_text_rejected_without_echo() {
        let session = session();
        let mut notifications = session.subscribe();

        let err = session.send_text("   ").await.unwrap_err();
        assert!(matches!(err, Error::ClientInput(_)));
        assert!(session.transcript().is_empty());
        assert_eq!(session.latest_seq(), 0);

        let note = notifications.try_recv().unwrap();
        assert_eq!(note.step, "input");
        assert_eq!(note.kind, "client_input");
    }

    #[tokio::test]
    async fn test_non_search_reply() {
        let session = session();
        let outcome = session.send_text(" hello ").await.unwrap();

        assert_eq!(outcome.seq, 1);
        assert_eq!(outcome.suggestions, SuggestionsOutcome::NotRequested);
        assert_eq!(outcome.reply.text, "echo: hello");

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[0].text, "hello");
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(session.phase(), SendPhase::Idle);
    }

    #[tokio::test]
    async fn test_voice_appends_reply_only() {
        let session = session();
        let reply = session
            .send_voice(VoiceRecording::new(vec![1, 2, 3], "audio/wav"))
            .await
            .unwrap();

        assert_eq!(reply.text, "heard 3 bytes");
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, Role::Assistant);
        assert_eq!(session.latest_seq(), 1);
    }

    #[test]
    fn test_greeting_and_receive() {
        let session = session().with_greeting("Hi! What are you looking for today?");
        session.receive(Message::assistant("pushed", session.session_id()));

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].text, "Hi! What are you looking for today?");
        assert_eq!(transcript[1].text, "pushed");
    }

    #[test]
    fn test_realtime_send_requires_open_channel() {
        let session = session();
        let channel = RealtimeChannel::with_url(
            url::Url::parse("ws://127.0.0.1:9/api/v1/agent/ws/s").unwrap(),
            "s",
        );

        let err = session.send_realtime(&channel, "hello").unwrap_err();
        assert!(matches!(err, Error::ClientInput(_)));
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn test_pump_appends_in_order() {
        let session = session();
        let stream = futures::stream::iter(vec![
            Message::assistant("one", "s"),
            Message::assistant("two", "s"),
        ]);

        assert_eq!(tokio_test::block_on(session.pump(stream)), 2);
        let texts: Vec<String> = session.transcript().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }
}
