//! HTTP transport with uniform credential injection and typed failures
//!
//! The transport never retries. Every call reads the credential from durable
//! storage when the request is built, so a login that completes while a call
//! is in flight only affects later calls.

use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::context::ClientContext;
use crate::{Error, Result};

/// Stateless request/response wrapper over the remote API
#[derive(Clone, Debug)]
pub struct TransportClient {
    ctx: ClientContext,
}

impl TransportClient {
    /// Create a transport over `ctx`
    #[must_use]
    pub const fn new(ctx: ClientContext) -> Self {
        Self { ctx }
    }

    /// Context this transport was built from
    #[must_use]
    pub const fn context(&self) -> &ClientContext {
        &self.ctx
    }

    /// Send a JSON request and decode a JSON response
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` on a non-success status, `Error::Network` if
    /// no response arrives and `Error::Decode` if the body does not decode
    pub async fn request<T, B>(&self, method: Method, endpoint: &str, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self.builder(method, endpoint);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.execute(request, endpoint).await
    }

    /// `GET` a JSON resource
    ///
    /// # Errors
    ///
    /// See [`Self::request`]
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.request::<T, ()>(Method::GET, endpoint, None).await
    }

    /// `GET` a JSON resource with query parameters
    ///
    /// # Errors
    ///
    /// See [`Self::request`]
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let request = self.builder(Method::GET, endpoint).query(query);
        self.execute(request, endpoint).await
    }

    /// `POST` a JSON body
    ///
    /// # Errors
    ///
    /// See [`Self::request`]
    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    /// `PUT` a JSON body
    ///
    /// # Errors
    ///
    /// See [`Self::request`]
    pub async fn put<T, B>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, endpoint, Some(body)).await
    }

    /// `DELETE` a resource, ignoring any response body
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` on a non-success status and `Error::Network`
    /// if no response arrives
    pub async fn delete(&self, endpoint: &str) -> Result<()> {
        let response = self.send(self.builder(Method::DELETE, endpoint), endpoint).await?;
        drop(response);
        Ok(())
    }

    /// `POST` a multipart form (file uploads, form logins)
    ///
    /// # Errors
    ///
    /// See [`Self::request`]
    pub async fn multipart<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T> {
        let request = self.builder(Method::POST, endpoint).multipart(form);
        self.execute(request, endpoint).await
    }

    fn builder(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{endpoint}", self.ctx.base_url());
        let request = self.ctx.http().request(method, url);

        match self.ctx.auth().token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, endpoint: &str) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(endpoint, error = %e, "request failed without response");
            Error::Network(e.to_string())
        })?;

        let status = response.status();
        tracing::debug!(endpoint, status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(endpoint, status = %status, body = %body, "API error");
            return Err(Error::Transport {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, endpoint: &str) -> Result<T> {
        let response = self.send(request, endpoint).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!(endpoint, error = %e, "failed to decode response");
            Error::Decode(e.to_string())
        })
    }
}
