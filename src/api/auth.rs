//! Login, registration and logout

use crate::Result;
use crate::model::{LoginResponse, Registration, User};
use crate::transport::TransportClient;

/// Client for the `/api/v1/auth` endpoints
#[derive(Clone, Debug)]
pub struct AuthApi {
    transport: TransportClient,
}

impl AuthApi {
    /// Create an auth client over `transport`
    #[must_use]
    pub const fn new(transport: TransportClient) -> Self {
        Self { transport }
    }

    /// Log in and persist the credential and user profile
    ///
    /// Calls already in flight keep the credential they were built with.
    ///
    /// # Errors
    ///
    /// Returns error if the credentials are rejected or cannot be persisted
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let form = reqwest::multipart::Form::new()
            .text("username", email.to_string())
            .text("password", password.to_string());

        let response: LoginResponse = self
            .transport
            .multipart("/api/v1/auth/login", form)
            .await?;

        self.transport
            .context()
            .auth()
            .store_login(&response.access_token, response.user.as_ref())?;

        Ok(response)
    }

    /// Register a new account
    ///
    /// # Errors
    ///
    /// Returns error if registration is rejected
    pub async fn register(&self, registration: &Registration) -> Result<User> {
        self.transport
            .post("/api/v1/auth/register", registration)
            .await
    }

    /// Forget the stored credential and user profile
    ///
    /// # Errors
    ///
    /// Returns error if storage cannot be updated
    pub fn logout(&self) -> Result<()> {
        self.transport.context().auth().logout()
    }
}
