//! Durable conversation session id

use chrono::Utc;
use rand::Rng;

use super::{SESSION_ID_KEY, SharedStore};

/// Characters used for the random session suffix
const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random session suffix
const SUFFIX_LEN: usize = 9;

/// Owns the session id persisted in durable storage
#[derive(Clone)]
pub struct SessionStore {
    store: SharedStore,
}

impl SessionStore {
    /// Create a session store over `store`
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Return the persisted session id, creating and persisting one on first use
    ///
    /// Concurrent first calls agree on one id. A failed write is logged; the
    /// freshly generated id is still returned so the conversation can proceed
    /// for this process.
    #[must_use]
    pub fn session_id(&self) -> String {
        if let Some(id) = self.store.get(SESSION_ID_KEY).filter(|id| !id.is_empty()) {
            return id;
        }

        let candidate = generate_session_id();
        match self.store.get_or_insert(SESSION_ID_KEY, &candidate) {
            Ok(id) => {
                if id == candidate {
                    tracing::debug!(session_id = %id, "created session");
                }
                id
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist session id");
                candidate
            }
        }
    }

    /// Overwrite the persisted session id, e.g. to resume a shared session
    ///
    /// # Errors
    ///
    /// Returns error if the id is empty or cannot be persisted
    pub fn set_session_id(&self, id: &str) -> crate::Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(crate::Error::ClientInput("session id must not be empty".to_string()));
        }

        self.store.set(SESSION_ID_KEY, id)?;
        tracing::info!(session_id = %id, "session id replaced");
        Ok(())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

/// Generate a new session id: `session_<unix millis>_<9 base-36 chars>`
#[must_use]
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())]))
        .collect();

    format!("session_{}_{suffix}", Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_generated_id_shape() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_session_id_is_created_once() {
        let store = MemoryStore::shared();
        let sessions = SessionStore::new(store.clone());

        let first = sessions.session_id();
        let second = sessions.session_id();
        assert_eq!(first, second);
        assert_eq!(store.get(SESSION_ID_KEY), Some(first));
    }

    #[test]
    fn test_session_id_reused_across_instances() {
        let store = MemoryStore::shared();
        let first = SessionStore::new(store.clone()).session_id();
        let second = SessionStore::new(store).session_id();
        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_first_use_agrees_on_one_id() {
        let store = MemoryStore::shared();

        let ids: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let sessions = SessionStore::new(store.clone());
                    scope.spawn(move || sessions.session_id())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.iter().all(|id| id == &ids[0]));
        assert_eq!(store.get(SESSION_ID_KEY).as_ref(), Some(&ids[0]));
    }

    #[test]
    fn test_set_session_id_overwrites() {
        let sessions = SessionStore::new(MemoryStore::shared());
        let _ = sessions.session_id();

        sessions.set_session_id("shared-session").unwrap();
        assert_eq!(sessions.session_id(), "shared-session");

        assert!(sessions.set_session_id("   ").is_err());
        assert_eq!(sessions.session_id(), "shared-session");
    }
}
