//! Stage 2: identity resolution.
//!
//! An identity enters the flow either from a live SSO session or from the
//! completion record the external login/MFA frontend leaves behind. Both
//! paths converge on a [`ResolvedIdentity`]; locked and removal-marked
//! accounts are rejected here and never reach token issuance.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::storage::directory::IdentityDirectory;
use crate::storage::session::SsoSessionStore;
use crate::types::{LoginCompletion, ResolvedIdentity};

/// Resolves the authenticated identity for a pending authorization.
pub struct SessionResolver {
    config: Arc<AuthConfig>,
    sessions: Arc<dyn SsoSessionStore>,
    directory: Arc<dyn IdentityDirectory>,
}

impl SessionResolver {
    /// Creates the resolver.
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        sessions: Arc<dyn SsoSessionStore>,
        directory: Arc<dyn IdentityDirectory>,
    ) -> Self {
        Self {
            config,
            sessions,
            directory,
        }
    }

    /// Looks up an SSO session by its browser token.
    ///
    /// Returns `None` for unknown, expired, or foreign-service sessions;
    /// the caller falls through to interactive login either way.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the session store fails.
    pub async fn resolve_session(&self, token: &str) -> AuthResult<Option<ResolvedIdentity>> {
        let Some(session) = self.sessions.find_by_token(token).await? else {
            return Ok(None);
        };
        let now = OffsetDateTime::now_utc();
        if session.is_expired_at(now) || !session.is_for_service(&self.config.login.service) {
            return Ok(None);
        }
        Ok(Some(session.identity))
    }

    /// Consumes the login frontend's completion for a pending key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` when no completion exists yet
    /// (the browser arrived before login finished, or replayed the
    /// continuation) and `AuthError::AccessDenied` for locked or
    /// removal-marked accounts.
    pub async fn consume_completion(&self, pending_key: &str) -> AuthResult<ResolvedIdentity> {
        let completion = self
            .directory
            .take_login_completion(pending_key)
            .await?
            .ok_or_else(|| AuthError::invalid_request("login has not completed"))?;
        self.accept(&completion)
    }

    fn accept(&self, completion: &LoginCompletion) -> AuthResult<ResolvedIdentity> {
        if completion.locked {
            tracing::info!(subject = completion.subject, "rejected locked account");
            return Err(AuthError::access_denied("account is locked"));
        }
        if completion.marked_for_removal {
            tracing::info!(
                subject = completion.subject,
                "rejected account marked for removal"
            );
            return Err(AuthError::access_denied("account is marked for removal"));
        }
        Ok(ResolvedIdentity::from_completion(completion))
    }
}
