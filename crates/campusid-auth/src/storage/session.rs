//! SSO session storage trait.
//!
//! SSO sessions let a browser skip interactive login when it re-authorizes
//! for the same service. The browser holds an opaque session token in a
//! cookie; the record is additionally keyed by (organisation, service,
//! subject) so a fresh login for the same account refreshes rather than
//! multiplies sessions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::StorageError;
use crate::types::ResolvedIdentity;

/// A persisted SSO session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoSession {
    /// Opaque token presented by the browser.
    pub token: String,

    /// Organisation of the authenticated account.
    pub organisation: String,

    /// Service the session was created for.
    pub service: String,

    /// The authenticated identity.
    pub identity: ResolvedIdentity,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the session expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl SsoSession {
    /// Returns whether the session has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns whether the session matches the given service.
    #[must_use]
    pub fn is_for_service(&self, service: &str) -> bool {
        self.service == service
    }
}

/// Storage trait for SSO sessions.
#[async_trait]
pub trait SsoSessionStore: Send + Sync {
    /// Finds a session by its browser token. Expired sessions are treated
    /// as absent.
    async fn find_by_token(&self, token: &str) -> Result<Option<SsoSession>, StorageError>;

    /// Creates or refreshes a session. An existing session for the same
    /// (organisation, service, subject) is replaced.
    async fn upsert_session(&self, session: SsoSession) -> Result<(), StorageError>;

    /// Removes a session by its token. Idempotent.
    async fn remove_by_token(&self, token: &str) -> Result<(), StorageError>;
}
