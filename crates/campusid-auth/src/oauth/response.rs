//! Stage 2: authorization response generation.
//!
//! Finalizes the pending authorization with the resolved identity, mints
//! the one-time code, snapshots the finalized state under it, and builds
//! the success redirect. The pending key is deleted once the code exists;
//! from then on the code is the only handle to the flow.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::oauth::authorize::AuthorizationResponse;
use crate::oauth::pending::{FlowStage, PendingAuthorization};
use crate::oauth::validator::PENDING_KEY_PREFIX;
use crate::storage::flow::FlowStore;
use crate::storage::session::{SsoSession, SsoSessionStore};
use crate::types::{RequestContext, ResolvedIdentity};

/// Storage key prefix for issued authorization codes.
pub const CODE_KEY_PREFIX: &str = "code:";

/// A completed stage-2 authorization.
#[derive(Debug)]
pub struct CompletedAuthorization {
    /// Redirect URL carrying the code back to the client.
    pub redirect_url: String,

    /// Fresh SSO session token for the browser cookie. `None` when the
    /// flow reused an existing session or sessions are disabled.
    pub session_token: Option<String>,
}

/// Finalizes pending authorizations into codes and redirects.
pub struct ResponseGenerator {
    config: Arc<AuthConfig>,
    flow_store: Arc<dyn FlowStore>,
    sessions: Arc<dyn SsoSessionStore>,
}

impl ResponseGenerator {
    /// Creates the generator.
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        flow_store: Arc<dyn FlowStore>,
        sessions: Arc<dyn SsoSessionStore>,
    ) -> Self {
        Self {
            config,
            flow_store,
            sessions,
        }
    }

    /// Completes the flow behind `pending_key` with `identity`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` for an unknown or expired
    /// pending key and for out-of-order stage transitions; storage
    /// failures propagate as server errors.
    pub async fn complete(
        &self,
        pending_key: &str,
        identity: ResolvedIdentity,
        had_session: bool,
        ctx: &RequestContext,
    ) -> AuthResult<CompletedAuthorization> {
        let store_key = format!("{PENDING_KEY_PREFIX}{pending_key}");
        let value = self.flow_store.get(&store_key).await?.ok_or_else(|| {
            AuthError::invalid_request("unknown or expired authorization request")
        })?;
        let mut pending: PendingAuthorization = serde_json::from_value(value)
            .map_err(|e| AuthError::internal(format!("pending state deserialization: {e}")))?;

        pending.advance_to(FlowStage::Authenticating)?;
        pending.finalize(identity, had_session)?;

        let session_token = if self.config.session.enabled && !had_session {
            Some(self.create_session(&pending).await?)
        } else {
            None
        };

        let code = PendingAuthorization::generate_key();
        let snapshot = serde_json::to_value(&pending)
            .map_err(|e| AuthError::internal(format!("pending state serialization: {e}")))?;
        self.flow_store
            .put(
                &format!("{CODE_KEY_PREFIX}{code}"),
                snapshot,
                self.config.oauth.authorization_code_lifetime,
                true,
            )
            .await?;

        // The pending key is dead once the code exists.
        self.flow_store.delete(&store_key).await?;

        let response = AuthorizationResponse {
            code,
            state: pending.state.clone(),
            scope: pending
                .scopes_reduced
                .then(|| pending.effective_scopes.clone()),
            iss: self.config.issuer.clone(),
        };
        let redirect_url = response
            .to_redirect_url(&pending.redirect_uri)
            .map_err(|e| AuthError::internal(format!("redirect construction: {e}")))?;

        tracing::info!(
            request_id = %pending.request_id,
            client_id = pending.client_id,
            remote = ?ctx.remote_addr,
            had_session,
            "authorization code issued"
        );

        Ok(CompletedAuthorization {
            redirect_url,
            session_token,
        })
    }

    async fn create_session(&self, pending: &PendingAuthorization) -> AuthResult<String> {
        let identity = pending
            .identity
            .clone()
            .ok_or_else(|| AuthError::internal("finalized flow without identity"))?;
        let now = OffsetDateTime::now_utc();
        let token = PendingAuthorization::generate_key();
        let session = SsoSession {
            token: token.clone(),
            organisation: identity.organisation.clone(),
            service: self.config.login.service.clone(),
            identity,
            created_at: now,
            expires_at: now + self.config.session.lifetime,
        };
        self.sessions.upsert_session(session).await?;
        Ok(token)
    }
}
