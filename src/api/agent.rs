//! Assistant endpoints: chat, voice, suggestions, intent and history

use serde::Serialize;

use crate::Result;
use crate::model::{
    ChatReply, ChatRequest, Conversation, Health, Intent, IntentAnalysis, Product,
    SuggestionCriteria,
};
use crate::transport::TransportClient;
use crate::voice::VoiceRecording;

/// Client for the `/api/v1/agent` endpoints
#[derive(Clone, Debug)]
pub struct AgentApi {
    transport: TransportClient,
}

#[derive(Serialize)]
struct IntentRequest<'a> {
    message: &'a str,
}

impl AgentApi {
    /// Create an agent client over `transport`
    #[must_use]
    pub const fn new(transport: TransportClient) -> Self {
        Self { transport }
    }

    /// Underlying transport
    #[must_use]
    pub const fn transport(&self) -> &TransportClient {
        &self.transport
    }

    /// Send a chat message
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the reply does not decode
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        tracing::debug!(session_id = %request.session_id, "sending chat message");
        self.transport.post("/api/v1/agent/chat", request).await
    }

    /// Upload a voice recording; the recording is consumed
    ///
    /// # Errors
    ///
    /// Returns error if the upload fails or the reply does not decode
    pub async fn voice(&self, recording: VoiceRecording, session_id: &str) -> Result<ChatReply> {
        tracing::debug!(session_id, audio_bytes = recording.len(), "uploading voice message");

        let form = reqwest::multipart::Form::new()
            .part("audio_file", recording.into_part()?)
            .text("session_id", session_id.to_string());

        self.transport.multipart("/api/v1/agent/voice", form).await
    }

    /// Fetch product suggestions for `criteria`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the list does not decode
    pub async fn suggestions(&self, criteria: &SuggestionCriteria) -> Result<Vec<Product>> {
        self.transport.post("/api/v1/agent/suggestions", criteria).await
    }

    /// Classify a message without sending it to the conversation
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn analyze_intent(&self, message: &str) -> Result<Intent> {
        let analysis: IntentAnalysis = self
            .transport
            .post("/api/v1/agent/intent", &IntentRequest { message })
            .await?;
        Ok(analysis.into())
    }

    /// Conversation history of a user
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn conversations(&self, user_id: i64) -> Result<Vec<Conversation>> {
        self.transport
            .get(&format!("/api/v1/agent/conversations/{user_id}"))
            .await
    }

    /// A single stored conversation
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn conversation(&self, session_id: &str) -> Result<Conversation> {
        self.transport
            .get(&format!("/api/v1/agent/conversation/{session_id}"))
            .await
    }

    /// Backend health check
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable or unhealthy
    pub async fn health(&self) -> Result<Health> {
        self.transport.get("/health").await
    }
}
