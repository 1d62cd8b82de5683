//! Agentmarket Assistant - client for a conversational shopping assistant
//!
//! This library provides the client side of the marketplace assistant:
//! - Text chat with intent-driven product suggestions
//! - Bounded voice recordings uploaded for server-side transcription
//! - A realtime duplex channel keyed by session id
//! - Catalog, seller and account endpoint wrappers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 AssistantSession                     │
//! │   Transcript  │  Suggestions  │  Last-send-wins     │
//! └──────┬──────────────┬───────────────────┬───────────┘
//!        │              │                   │
//! ┌──────▼──────┐ ┌─────▼──────┐ ┌──────────▼──────────┐
//! │ VoiceCapture│ │  AgentApi  │ │  RealtimeChannel    │
//! │   (cpal)    │ │            │ │  (WebSocket)        │
//! └─────────────┘ └─────┬──────┘ └──────────┬──────────┘
//!                       │                   │
//! ┌─────────────────────▼───────────────────▼───────────┐
//! │  TransportClient + ClientContext (base URL, store)  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod assistant;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod realtime;
pub mod store;
pub mod transport;
pub mod voice;

pub use api::{AgentApi, AuthApi, CatalogApi, SellerApi};
pub use assistant::{
    AssistantBackend, AssistantSession, Notification, SendOutcome, SendPhase, SuggestionsOutcome,
};
pub use config::Config;
pub use context::ClientContext;
pub use error::{Error, Result};
pub use model::{ChatReply, ChatRequest, Intent, Message, Product, Role};
pub use realtime::{ChannelState, MessageStream, RealtimeChannel};
pub use store::{
    AuthStore, FileStore, KeyValueStore, MemoryStore, SessionStore, SharedStore,
};
pub use transport::TransportClient;
pub use voice::{CpalMicrophone, VoiceCapture, VoiceRecording};
