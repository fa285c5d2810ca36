//! Stage 3: authorization code exchange.
//!
//! The checks run in a fixed order, each with its own failure mode. The
//! code is deleted from the store before anything about the request is
//! validated, so a failed exchange burns the code and a concurrent
//! redemption race has exactly one winner.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::audit::AuditRecorder;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::oauth::client_auth::{ClientAuthScheme, ClientAuthenticator};
use crate::oauth::pending::{FlowStage, PendingAuthorization};
use crate::oauth::response::CODE_KEY_PREFIX;
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::scopes::ScopeSet;
use crate::storage::directory::IdentityDirectory;
use crate::storage::flow::FlowStore;
use crate::token::issuer::{IssueRequest, IssuedToken, TokenIssuer};
use crate::token::jwt::TokenKind;
use crate::types::client::ClientKind;
use crate::types::context::RequestContext;
use crate::types::ResolvedIdentity;

/// Redeems authorization codes for tokens.
pub struct ExchangeService {
    config: Arc<AuthConfig>,
    flow_store: Arc<dyn FlowStore>,
    directory: Arc<dyn IdentityDirectory>,
    authenticator: Arc<ClientAuthenticator>,
    issuer: Arc<TokenIssuer>,
    audit: Arc<AuditRecorder>,
}

impl ExchangeService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        flow_store: Arc<dyn FlowStore>,
        directory: Arc<dyn IdentityDirectory>,
        authenticator: Arc<ClientAuthenticator>,
        issuer: Arc<TokenIssuer>,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            config,
            flow_store,
            directory,
            authenticator,
            issuer,
            audit,
        }
    }

    /// Handles `grant_type=authorization_code`.
    ///
    /// # Errors
    ///
    /// Every failure maps onto one of the wire error codes; the HTTP
    /// layer renders them as JSON with status 400.
    pub async fn exchange(
        &self,
        request: &TokenRequest,
        basic_header: Option<&str>,
        ctx: &RequestContext,
    ) -> AuthResult<TokenResponse> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("code is required"))?;

        let result = self.exchange_code(code, request, basic_header, ctx).await;
        match &result {
            Ok(_) => {
                self.audit
                    .record_usage(ctx.request_id, code, "ok", None, ctx.remote_addr)
                    .await;
            }
            Err(e) => {
                self.audit
                    .record_usage(
                        ctx.request_id,
                        code,
                        "rejected",
                        Some(&e.to_string()),
                        ctx.remote_addr,
                    )
                    .await;
            }
        }
        result
    }

    async fn exchange_code(
        &self,
        code: &str,
        request: &TokenRequest,
        basic_header: Option<&str>,
        ctx: &RequestContext,
    ) -> AuthResult<TokenResponse> {
        // Read then delete. The delete must report that this call removed
        // the key; a concurrent redemption that lost the race sees false
        // and fails like a missing code.
        let store_key = format!("{CODE_KEY_PREFIX}{code}");
        let value = self.flow_store.get(&store_key).await?;
        let removed = self.flow_store.delete(&store_key).await?;
        let value = match (value, removed) {
            (Some(value), true) => value,
            _ => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    "authorization code missing or already redeemed"
                );
                return Err(AuthError::invalid_request(
                    "invalid or expired authorization code",
                ));
            }
        };

        let mut pending: PendingAuthorization = serde_json::from_value(value)
            .map_err(|e| AuthError::internal(format!("code snapshot deserialization: {e}")))?;

        // The stored request id correlates this exchange with stage 1.
        let flow_id = pending.request_id;
        pending.advance_to(FlowStage::Exchanged)?;

        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("redirect_uri is required"))?;
        if redirect_uri != pending.redirect_uri {
            tracing::info!(request_id = %flow_id, "redirect_uri mismatch at exchange");
            return Err(AuthError::invalid_request(
                "redirect_uri does not match the authorization request",
            ));
        }

        let scheme = ClientAuthScheme::detect(basic_header, request)?;
        let presented_id = scheme_client_id(&scheme, request)?;
        if presented_id != pending.client_id {
            tracing::info!(request_id = %flow_id, "client_id mismatch at exchange");
            return Err(AuthError::invalid_request(
                "client_id does not match the authorization request",
            ));
        }

        let authenticated = self
            .authenticator
            .authenticate(&scheme, ClientKind::Login, ctx)
            .await?;

        let effective = ScopeSet::parse(&pending.effective_scopes);
        let granted = match request.scope.as_deref() {
            Some(requested) => {
                let requested = ScopeSet::parse(requested);
                if !requested.is_subset_of(&effective) {
                    return Err(AuthError::invalid_scope(
                        "requested scopes exceed those granted at authorization",
                    ));
                }
                requested
            }
            None => effective,
        };

        let identity = pending
            .identity
            .clone()
            .ok_or_else(|| AuthError::internal("code snapshot without identity"))?;

        // The account may have been locked between login and exchange.
        if !self.directory.is_account_active(&identity).await? {
            tracing::info!(request_id = %flow_id, subject = identity.subject, "account no longer active");
            return Err(AuthError::access_denied("account is no longer active"));
        }

        let profile_claims = self.directory.claims_for_scopes(&identity, &granted).await?;

        let id_token = self.issue_id_token(&pending, &identity, profile_claims)?;
        let access = self.issue_access_token(&identity, &authenticated.client.client_id, &granted)?;

        self.audit
            .record_issuance(flow_id, &pending.client_id, &access.jti, &access.claims)
            .await;
        self.audit
            .record_issuance(flow_id, &pending.client_id, &id_token.jti, &id_token.claims)
            .await;

        tracing::info!(
            request_id = %flow_id,
            client_id = pending.client_id,
            subject = identity.subject,
            scopes = granted.to_scope_string(),
            "authorization code exchanged"
        );

        let mut response =
            TokenResponse::new(access.token, access.expires_in).with_id_token(id_token.token);
        if granted.to_scope_string() != pending.requested_scopes {
            response = response.with_scope(granted.to_scope_string());
        }
        Ok(response)
    }

    fn issue_id_token(
        &self,
        pending: &PendingAuthorization,
        identity: &ResolvedIdentity,
        profile_claims: Map<String, Value>,
    ) -> AuthResult<IssuedToken> {
        let mut custom = profile_claims;
        custom.insert(
            "auth_time".to_string(),
            Value::from(identity.auth_time.unix_timestamp()),
        );
        custom.insert(
            "amr".to_string(),
            Value::from(vec![identity.method.amr_value()]),
        );
        if let Some(nonce) = &pending.nonce {
            custom.insert("nonce".to_string(), Value::from(nonce.clone()));
        }

        self.issuer
            .issue(&IssueRequest {
                kind: TokenKind::Id,
                subject: &identity.subject,
                audience: &pending.client_id,
                scopes: &ScopeSet::default(),
                client_id: None,
                lifetime: self.config.oauth.id_token_lifetime,
                custom_claims: custom,
            })
            .map_err(|e| AuthError::invalid_request(format!("token signing failed: {e}")))
    }

    fn issue_access_token(
        &self,
        identity: &ResolvedIdentity,
        client_id: &str,
        granted: &ScopeSet,
    ) -> AuthResult<IssuedToken> {
        // Enough identity to serve userinfo without the ID token.
        let mut custom = Map::new();
        custom.insert(
            "organisation".to_string(),
            Value::from(identity.organisation.clone()),
        );
        custom.insert(
            "directory_ref".to_string(),
            Value::from(identity.directory_ref.clone()),
        );
        custom.insert(
            "amr".to_string(),
            Value::from(vec![identity.method.amr_value()]),
        );
        custom.insert(
            "auth_time".to_string(),
            Value::from(identity.auth_time.unix_timestamp()),
        );

        self.issuer
            .issue(&IssueRequest {
                kind: TokenKind::Access,
                subject: &identity.subject,
                audience: &self.config.oauth.internal_audience,
                scopes: granted,
                client_id: Some(client_id),
                lifetime: self.config.oauth.access_token_lifetime,
                custom_claims: custom,
            })
            .map_err(|e| AuthError::invalid_request(format!("token signing failed: {e}")))
    }
}

fn scheme_client_id(scheme: &ClientAuthScheme, request: &TokenRequest) -> AuthResult<String> {
    match scheme {
        ClientAuthScheme::SecretBasic { client_id, .. }
        | ClientAuthScheme::SecretPost { client_id, .. } => Ok(client_id.clone()),
        ClientAuthScheme::Assertion { assertion } => {
            // The verified claims are compared against this again inside
            // the authentication engine.
            let from_assertion = crate::oauth::assertion::extract_client_id_unverified(assertion)?;
            if let Some(body_id) = request.client_id.as_deref() {
                if body_id != from_assertion {
                    return Err(AuthError::unauthorized_client(
                        "client_id does not match the assertion issuer",
                    ));
                }
            }
            Ok(from_assertion)
        }
    }
}
