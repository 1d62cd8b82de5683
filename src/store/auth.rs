//! Durable bearer credential and cached user profile

use super::{ACCESS_TOKEN_KEY, SharedStore, USER_KEY};
use crate::Result;
use crate::model::{User, UserRole};

/// Owns the credential and user profile persisted in durable storage
#[derive(Clone)]
pub struct AuthStore {
    store: SharedStore,
}

impl AuthStore {
    /// Create an auth store over `store`
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Current bearer credential, read from storage
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Cached user profile, if one is stored and decodes
    #[must_use]
    pub fn user(&self) -> Option<User> {
        let raw = self.store.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring undecodable stored user profile");
                None
            }
        }
    }

    /// Stored user if it has the seller role
    #[must_use]
    pub fn seller(&self) -> Option<User> {
        self.user().filter(|u| u.role == UserRole::Seller)
    }

    /// Whether a credential is present
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Persist a successful login
    ///
    /// # Errors
    ///
    /// Returns error if either value cannot be persisted
    pub fn store_login(&self, token: &str, user: Option<&User>) -> Result<()> {
        self.store.set(ACCESS_TOKEN_KEY, token)?;
        if let Some(user) = user {
            self.store.set(USER_KEY, &serde_json::to_string(user)?)?;
        }
        tracing::info!(user = user.map(|u| u.username.as_str()), "credential stored");
        Ok(())
    }

    /// Remove the credential and user profile
    ///
    /// # Errors
    ///
    /// Returns error if the removal cannot be persisted
    pub fn logout(&self) -> Result<()> {
        self.store.remove(ACCESS_TOKEN_KEY)?;
        self.store.remove(USER_KEY)?;
        tracing::info!("credential removed");
        Ok(())
    }
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStore")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn seller() -> User {
        User {
            id: 7,
            email: "s@example.com".to_string(),
            username: "retrokicks".to_string(),
            full_name: "Retro Kicks".to_string(),
            role: UserRole::Seller,
            is_active: true,
            is_verified: true,
        }
    }

    #[test]
    fn test_login_and_logout() {
        let auth = AuthStore::new(MemoryStore::shared());
        assert!(auth.token().is_none());
        assert!(auth.user().is_none());

        auth.store_login("abc", Some(&seller())).unwrap();
        assert_eq!(auth.token().as_deref(), Some("abc"));
        assert_eq!(auth.user().map(|u| u.id), Some(7));
        assert!(auth.seller().is_some());

        auth.logout().unwrap();
        assert!(!auth.is_authenticated());
        assert!(auth.user().is_none());
    }

    #[test]
    fn test_buyer_is_not_seller() {
        let auth = AuthStore::new(MemoryStore::shared());
        let mut buyer = seller();
        buyer.role = UserRole::Buyer;
        auth.store_login("abc", Some(&buyer)).unwrap();

        assert!(auth.user().is_some());
        assert!(auth.seller().is_none());
    }

    #[test]
    fn test_corrupt_profile_is_ignored() {
        let store = MemoryStore::shared();
        store.set(USER_KEY, "{not json").unwrap();
        assert!(AuthStore::new(store).user().is_none());
    }
}
