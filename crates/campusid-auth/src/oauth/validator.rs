//! Stage 1: authorization request validation.
//!
//! Validation order matters for error propagation. The client and its
//! redirect_uri are checked first; until the redirect_uri is known to
//! belong to the client, every failure renders in-page. Once it is
//! validated, failures become RFC 6749 error redirects.

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::oauth::authorize::{
    AuthorizationErrorRedirect, AuthorizationRequest, AuthorizeOutcome,
};
use crate::oauth::pending::{FlowStage, PendingAuthorization};
use crate::oauth::response::ResponseGenerator;
use crate::oauth::resolver::SessionResolver;
use crate::scopes::{GrantFamily, ScopeNegotiator};
use crate::storage::client::ClientRegistry;
use crate::storage::flow::FlowStore;
use crate::types::client::{Client, ClientKind, is_valid_client_id};
use crate::types::context::RequestContext;
use time::OffsetDateTime;

/// Storage key prefix for pending authorizations.
pub const PENDING_KEY_PREFIX: &str = "pending:";

/// The authorization endpoint service.
pub struct AuthorizeService {
    config: Arc<AuthConfig>,
    registry: Arc<dyn ClientRegistry>,
    flow_store: Arc<dyn FlowStore>,
    negotiator: ScopeNegotiator,
    resolver: SessionResolver,
    responder: ResponseGenerator,
}

impl AuthorizeService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        registry: Arc<dyn ClientRegistry>,
        flow_store: Arc<dyn FlowStore>,
        resolver: SessionResolver,
        responder: ResponseGenerator,
    ) -> Self {
        let negotiator = ScopeNegotiator::new(&config.scopes);
        Self {
            config,
            registry,
            flow_store,
            negotiator,
            resolver,
            responder,
        }
    }

    /// Handles a stage-1 authorization request.
    ///
    /// `session_token` is the browser's SSO cookie value, when present.
    /// Never fails outright; every error is folded into the outcome
    /// variant matching how far validation got.
    pub async fn begin(
        &self,
        request: &AuthorizationRequest,
        session_token: Option<&str>,
        ctx: &RequestContext,
    ) -> AuthorizeOutcome {
        // Everything up to the redirect_uri check renders in-page.
        let client = match self.validate_client(request, ctx).await {
            Ok(client) => client,
            Err(error) => return AuthorizeOutcome::PageError { error },
        };

        let redirect_uri = match validate_redirect_uri(request, &client) {
            Ok(uri) => uri,
            Err(error) => return AuthorizeOutcome::PageError { error },
        };

        // The redirect target is trusted from here on.
        match self
            .begin_validated(request, &client, &redirect_uri, session_token, ctx)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    client_id = client.client_id,
                    error = %error,
                    "authorization request rejected"
                );
                self.error_redirect(&error, &redirect_uri, request.state.clone())
            }
        }
    }

    async fn validate_client(
        &self,
        request: &AuthorizationRequest,
        ctx: &RequestContext,
    ) -> AuthResult<Client> {
        let client_id = request
            .client_id
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("client_id is required"))?;

        if !is_valid_client_id(client_id) {
            return Err(AuthError::invalid_request("malformed client_id"));
        }

        let client = self
            .registry
            .find_client(client_id, ClientKind::Login)
            .await?
            .ok_or_else(|| {
                tracing::debug!(request_id = %ctx.request_id, client_id, "unknown login client");
                AuthError::unauthorized_client("unknown client")
            })?;

        if !client.enabled {
            return Err(AuthError::unauthorized_client("client is disabled"));
        }
        Ok(client)
    }

    async fn begin_validated(
        &self,
        request: &AuthorizationRequest,
        client: &Client,
        redirect_uri: &str,
        session_token: Option<&str>,
        ctx: &RequestContext,
    ) -> AuthResult<AuthorizeOutcome> {
        match request.response_type.as_deref() {
            Some("code") => {}
            _ => {
                return Err(AuthError::invalid_request(
                    "response_type must be 'code'",
                ));
            }
        }

        let requested = request.scope.as_deref().unwrap_or_default();
        let negotiated = self
            .negotiator
            .negotiate(requested, client, GrantFamily::Login)?;

        let pending = PendingAuthorization {
            request_id: ctx.request_id,
            client_id: client.client_id.clone(),
            redirect_uri: redirect_uri.to_string(),
            requested_scopes: requested.to_string(),
            effective_scopes: negotiated.granted.to_scope_string(),
            scopes_reduced: negotiated.reduced,
            state: request.state.clone(),
            nonce: request.nonce.clone(),
            stage: FlowStage::Requested,
            identity: None,
            had_session: false,
            created_at: OffsetDateTime::now_utc(),
        };

        let pending_key = PendingAuthorization::generate_key();
        let value = serde_json::to_value(&pending)
            .map_err(|e| AuthError::internal(format!("pending state serialization: {e}")))?;
        self.flow_store
            .put(
                &format!("{PENDING_KEY_PREFIX}{pending_key}"),
                value,
                self.config.oauth.pending_lifetime,
                true,
            )
            .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            client_id = client.client_id,
            scopes = pending.effective_scopes,
            reduced = pending.scopes_reduced,
            "authorization request accepted"
        );

        // An SSO session for this service skips interactive login.
        if self.config.session.enabled {
            if let Some(token) = session_token {
                if let Some(identity) = self.resolver.resolve_session(token).await? {
                    tracing::info!(
                        request_id = %ctx.request_id,
                        subject = identity.subject,
                        "reusing sso session"
                    );
                    let completed = self
                        .responder
                        .complete(&pending_key, identity, true, ctx)
                        .await?;
                    return Ok(AuthorizeOutcome::CodeRedirect {
                        url: completed.redirect_url,
                        session_token: completed.session_token,
                    });
                }
            }
        }

        Ok(AuthorizeOutcome::LoginRedirect {
            url: self.login_url(&pending_key)?,
        })
    }

    fn login_url(&self, pending_key: &str) -> AuthResult<String> {
        let login = &self.config.login.url;
        // The login URL may be relative; resolve against the issuer.
        let base = url::Url::parse(&self.config.issuer)
            .map_err(|e| AuthError::configuration(format!("invalid issuer url: {e}")))?;
        let mut url = base
            .join(login)
            .map_err(|e| AuthError::configuration(format!("invalid login url: {e}")))?;
        url.query_pairs_mut().append_pair("request", pending_key);
        Ok(url.to_string())
    }

    fn error_redirect(
        &self,
        error: &AuthError,
        redirect_uri: &str,
        state: Option<String>,
    ) -> AuthorizeOutcome {
        let redirect = AuthorizationErrorRedirect::from_error(error, state, &self.config.issuer);
        match redirect.to_redirect_url(redirect_uri) {
            Ok(url) => AuthorizeOutcome::RedirectError { url },
            // Registered URIs parse; if one does not, fall back in-page.
            Err(_) => AuthorizeOutcome::PageError {
                error: AuthError::invalid_request("invalid redirect_uri"),
            },
        }
    }

    /// Handles the stage-2 continuation after interactive login.
    ///
    /// Loads the pending authorization, consumes the frontend's completion
    /// record, and finishes the flow. Failures before the pending record
    /// loads render in-page; afterwards they redirect, since the record
    /// holds a validated redirect_uri.
    pub async fn resume(&self, pending_key: &str, ctx: &RequestContext) -> AuthorizeOutcome {
        let pending = match self.load_pending(pending_key).await {
            Ok(pending) => pending,
            Err(error) => return AuthorizeOutcome::PageError { error },
        };

        match self.resume_loaded(pending_key, ctx).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::debug!(
                    request_id = %pending.request_id,
                    client_id = pending.client_id,
                    error = %error,
                    "authorization continuation rejected"
                );
                self.error_redirect(&error, &pending.redirect_uri, pending.state.clone())
            }
        }
    }

    async fn load_pending(&self, pending_key: &str) -> AuthResult<PendingAuthorization> {
        let value = self
            .flow_store
            .get(&format!("{PENDING_KEY_PREFIX}{pending_key}"))
            .await?
            .ok_or_else(|| {
                AuthError::invalid_request("unknown or expired authorization request")
            })?;
        serde_json::from_value(value)
            .map_err(|e| AuthError::internal(format!("pending state deserialization: {e}")))
    }

    async fn resume_loaded(
        &self,
        pending_key: &str,
        ctx: &RequestContext,
    ) -> AuthResult<AuthorizeOutcome> {
        let identity = self.resolver.consume_completion(pending_key).await?;
        let completed = self
            .responder
            .complete(pending_key, identity, false, ctx)
            .await?;
        Ok(AuthorizeOutcome::CodeRedirect {
            url: completed.redirect_url,
            session_token: completed.session_token,
        })
    }
}

fn validate_redirect_uri(request: &AuthorizationRequest, client: &Client) -> AuthResult<String> {
    let redirect_uri = request
        .redirect_uri
        .as_deref()
        .ok_or_else(|| AuthError::invalid_request("redirect_uri is required"))?;
    if !client.is_redirect_uri_allowed(redirect_uri) {
        return Err(AuthError::invalid_request(
            "redirect_uri is not registered for this client",
        ));
    }
    Ok(redirect_uri.to_string())
}
