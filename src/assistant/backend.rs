//! Remote calls the assistant session depends on

use async_trait::async_trait;

use crate::Result;
use crate::api::AgentApi;
use crate::model::{ChatReply, ChatRequest, Product, SuggestionCriteria};
use crate::voice::VoiceRecording;

/// The three remote operations an assistant session orchestrates
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Send a chat message and wait for the reply
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply>;

    /// Upload a recording and wait for the reply
    async fn voice(&self, recording: VoiceRecording, session_id: &str) -> Result<ChatReply>;

    /// Fetch product suggestions
    async fn suggestions(&self, criteria: &SuggestionCriteria) -> Result<Vec<Product>>;
}

#[async_trait]
impl AssistantBackend for AgentApi {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        Self::chat(self, request).await
    }

    async fn voice(&self, recording: VoiceRecording, session_id: &str) -> Result<ChatReply> {
        Self::voice(self, recording, session_id).await
    }

    async fn suggestions(&self, criteria: &SuggestionCriteria) -> Result<Vec<Product>> {
        Self::suggestions(self, criteria).await
    }
}
