//! Explicit client context
//!
//! Carries the API base URL, the durable store and the shared HTTP client.
//! Every component that talks to the backend or reads durable state is built
//! from a context instead of reaching for process-wide globals.

use std::time::Duration;

use url::Url;

use crate::config::Config;
use crate::store::{AuthStore, SessionStore, SharedStore};
use crate::{Error, Result};

/// Path prefix of the realtime endpoint, followed by the session id
const REALTIME_PATH: &str = "/api/v1/agent/ws";

/// Shared state handed to transport, realtime and session components
#[derive(Clone)]
pub struct ClientContext {
    base_url: String,
    store: SharedStore,
    http: reqwest::Client,
}

impl ClientContext {
    /// Create a context with a default HTTP client
    #[must_use]
    pub fn new(base_url: &str, store: SharedStore) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            http: reqwest::Client::new(),
        }
    }

    /// Create a context from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid or the HTTP client cannot be built
    pub fn from_config(config: &Config, store: SharedStore) -> Result<Self> {
        Url::parse(&config.api_url)
            .map_err(|e| Error::Config(format!("invalid API URL {}: {e}", config.api_url)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::new(&config.api_url, store).with_http_client(http))
    }

    /// Replace the HTTP client
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// API base URL without a trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Durable store handle
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Shared HTTP client
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Session id accessor over the durable store
    #[must_use]
    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.store.clone())
    }

    /// Credential accessor over the durable store
    #[must_use]
    pub fn auth(&self) -> AuthStore {
        AuthStore::new(self.store.clone())
    }

    /// WebSocket URL of the realtime endpoint for `session_id`
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is not an http(s) URL
    pub fn realtime_url(&self, session_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid API URL {}: {e}", self.base_url)))?;

        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(Error::Config(format!(
                    "unsupported API URL scheme: {other}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::Config(format!("cannot derive {scheme} URL")))?;

        let path = format!(
            "{}{REALTIME_PATH}/{session_id}",
            url.path().trim_end_matches('/')
        );
        url.set_path(&path);
        Ok(url)
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_base_url_trimmed() {
        let ctx = ClientContext::new("http://localhost:8000/", MemoryStore::shared());
        assert_eq!(ctx.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_realtime_url() {
        let ctx = ClientContext::new("http://localhost:8000", MemoryStore::shared());
        assert_eq!(
            ctx.realtime_url("session_1_abc").unwrap().as_str(),
            "ws://localhost:8000/api/v1/agent/ws/session_1_abc"
        );

        let ctx = ClientContext::new("https://market.example.com/backend/", MemoryStore::shared());
        assert_eq!(
            ctx.realtime_url("s").unwrap().as_str(),
            "wss://market.example.com/backend/api/v1/agent/ws/s"
        );
    }

    #[test]
    fn test_realtime_url_rejects_other_schemes() {
        let ctx = ClientContext::new("ftp://example.com", MemoryStore::shared());
        assert!(ctx.realtime_url("s").is_err());
    }
}
