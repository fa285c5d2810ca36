//! In-memory SSO session store.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use campusid_auth::storage::StorageError;
use campusid_auth::storage::session::{SsoSession, SsoSessionStore};

/// SSO sessions held in memory, keyed by browser token.
#[derive(Default)]
pub struct InMemorySsoSessionStore {
    sessions: RwLock<HashMap<String, SsoSession>>,
}

impl InMemorySsoSessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SsoSessionStore for InMemorySsoSessionStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<SsoSession>, StorageError> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .sessions
            .read()
            .await
            .get(token)
            .filter(|s| !s.is_expired_at(now))
            .cloned())
    }

    async fn upsert_session(&self, session: SsoSession) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        // One session per (organisation, service, subject); a fresh login
        // replaces the old one instead of multiplying cookies.
        sessions.retain(|_, s| {
            !(s.organisation == session.organisation
                && s.service == session.service
                && s.identity.subject == session.identity.subject)
        });
        sessions.insert(session.token.clone(), session);
        Ok(())
    }

    async fn remove_by_token(&self, token: &str) -> Result<(), StorageError> {
        self.sessions.write().await.remove(token);
        Ok(())
    }
}
