//! Client credentials grant.
//!
//! Machine clients trade their credentials for a single access token.
//! Unlike the login flow, negotiation never falls back to a default: an
//! empty effective scope set is a hard failure.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::audit::AuditRecorder;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::oauth::client_auth::{ClientAuthScheme, ClientAuthenticator, parse_basic_auth};
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::scopes::{GrantFamily, ScopeNegotiator};
use crate::token::issuer::{IssueRequest, TokenIssuer};
use crate::token::jwt::TokenKind;
use crate::types::client::ClientKind;
use crate::types::context::RequestContext;

/// Handles `grant_type=client_credentials`.
pub struct CredentialsService {
    config: Arc<AuthConfig>,
    authenticator: Arc<ClientAuthenticator>,
    negotiator: ScopeNegotiator,
    issuer: Arc<TokenIssuer>,
    audit: Arc<AuditRecorder>,
}

impl CredentialsService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        authenticator: Arc<ClientAuthenticator>,
        issuer: Arc<TokenIssuer>,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        let negotiator = ScopeNegotiator::new(&config.scopes);
        Self {
            config,
            authenticator,
            negotiator,
            issuer,
            audit,
        }
    }

    /// Issues a machine access token.
    ///
    /// A rejected grant leaves a failure entry in the audit trail under
    /// the presented client_id.
    ///
    /// # Errors
    ///
    /// Returns `unauthorized_client` for authentication failures and
    /// `invalid_scope` when negotiation yields an empty set.
    pub async fn issue(
        &self,
        request: &TokenRequest,
        basic_header: Option<&str>,
        ctx: &RequestContext,
    ) -> AuthResult<TokenResponse> {
        let result = self.grant(request, basic_header, ctx).await;
        if let Err(e) = &result {
            let client_id = presented_client_id(request, basic_header);
            self.audit
                .record_usage(
                    ctx.request_id,
                    &client_id,
                    "rejected",
                    Some(&e.to_string()),
                    ctx.remote_addr,
                )
                .await;
        }
        result
    }

    async fn grant(
        &self,
        request: &TokenRequest,
        basic_header: Option<&str>,
        ctx: &RequestContext,
    ) -> AuthResult<TokenResponse> {
        let scheme = ClientAuthScheme::detect(basic_header, request)?;
        let authenticated = self
            .authenticator
            .authenticate(&scheme, ClientKind::Token, ctx)
            .await?;
        let client = &authenticated.client;

        let requested = request.scope.as_deref().unwrap_or_default();
        let negotiated = self
            .negotiator
            .negotiate(requested, client, GrantFamily::Machine)?;
        if negotiated.granted.is_empty() {
            return Err(AuthError::invalid_scope(
                "no requested scope is grantable to this client",
            ));
        }

        let mut custom = Map::new();
        if let Some(firewall) = &client.firewall {
            if !firewall.allowed_organisations.is_empty() {
                custom.insert(
                    "allowed_organisations".to_string(),
                    Value::from(firewall.allowed_organisations.clone()),
                );
            }
            if !firewall.allowed_endpoints.is_empty() {
                custom.insert(
                    "allowed_endpoints".to_string(),
                    Value::from(firewall.allowed_endpoints.clone()),
                );
            }
            if let Some(service) = &firewall.required_service {
                custom.insert("required_service".to_string(), Value::from(service.clone()));
            }
        }

        let token = self
            .issuer
            .issue(&IssueRequest {
                kind: TokenKind::Access,
                subject: &client.client_id,
                audience: &self.config.oauth.internal_audience,
                scopes: &negotiated.granted,
                client_id: Some(&client.client_id),
                lifetime: self.config.oauth.access_token_lifetime,
                custom_claims: custom,
            })
            .map_err(|e| AuthError::invalid_request(format!("token signing failed: {e}")))?;

        self.audit
            .record_issuance(ctx.request_id, &client.client_id, &token.jti, &token.claims)
            .await;

        tracing::info!(
            request_id = %ctx.request_id,
            client_id = client.client_id,
            method = authenticated.method,
            scopes = negotiated.granted.to_scope_string(),
            "machine token issued"
        );

        let mut response = TokenResponse::new(token.token, token.expires_in);
        if negotiated.reduced {
            response = response.with_scope(negotiated.granted.to_scope_string());
        }
        Ok(response)
    }
}

/// Best-effort client_id of a rejected request, for the audit trail.
fn presented_client_id(request: &TokenRequest, basic_header: Option<&str>) -> String {
    if let Some(client_id) = &request.client_id {
        return client_id.clone();
    }
    if let Some(header) = basic_header {
        if let Ok((client_id, _)) = parse_basic_auth(header) {
            return client_id;
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::audit::{AuditRecord, AuditSink};
    use crate::oauth::assertion::AssertionVerifier;
    use crate::secret::hash_client_secret;
    use crate::storage::StorageError;
    use crate::storage::client::ClientRegistry;
    use crate::storage::flow::FlowStore;
    use crate::token::jwt::{SigningKeyPair, TokenSigner};
    use crate::types::client::{
        AuthType, AuthenticationRecord, Client, ClientFirewall,
    };

    const ISSUER: &str = "https://id.campus.example";
    const SECRET: &str = "sync-secret-1";

    #[derive(Default)]
    struct MockFlowStore {
        entries: Mutex<HashMap<String, serde_json::Value>>,
    }

    #[async_trait]
    impl FlowStore for MockFlowStore {
        async fn put(
            &self,
            key: &str,
            value: serde_json::Value,
            _ttl: Duration,
            create_only: bool,
        ) -> Result<(), StorageError> {
            let mut entries = self.entries.lock().unwrap();
            if create_only && entries.contains_key(key) {
                return Err(StorageError::AlreadyExists);
            }
            entries.insert(key.to_string(), value);
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn delete(&self, key: &str) -> Result<bool, StorageError> {
            Ok(self.entries.lock().unwrap().remove(key).is_some())
        }
    }

    struct MockRegistry {
        client: Client,
    }

    #[async_trait]
    impl ClientRegistry for MockRegistry {
        async fn find_client(
            &self,
            client_id: &str,
            kind: ClientKind,
        ) -> Result<Option<Client>, StorageError> {
            if self.client.client_id == client_id && self.client.kind == kind {
                Ok(Some(self.client.clone()))
            } else {
                Ok(None)
            }
        }
    }

    struct NullSink;

    #[async_trait]
    impl AuditSink for NullSink {
        async fn record(&self, _record: AuditRecord) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<AuditRecord>>,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn record(&self, record: AuditRecord) -> Result<(), StorageError> {
            self.records.lock().unwrap().push(record);
            Ok(())
        }
    }

    fn machine_client(firewall: Option<ClientFirewall>, enabled: bool) -> Client {
        Client {
            client_id: "grade-sync".to_string(),
            name: "Grade Sync".to_string(),
            kind: ClientKind::Token,
            redirect_uris: vec![],
            allowed_scopes: vec!["directory:read".to_string(), "directory:write".to_string()],
            firewall,
            enabled,
            auth_records: vec![AuthenticationRecord {
                id: Uuid::new_v4(),
                auth_type: AuthType::Password,
                secret_hash: Some(hash_client_secret(SECRET).unwrap()),
                public_key_pem: None,
                jwks: None,
                pinned_kid: None,
                pinned_alg: None,
                not_before: None,
                expires: None,
            }],
        }
    }

    fn service(client: Client) -> (CredentialsService, Arc<TokenIssuer>) {
        let config = Arc::new(AuthConfig {
            issuer: ISSUER.to_string(),
            ..AuthConfig::default()
        });
        let signer = TokenSigner::new(SigningKeyPair::generate_ec().unwrap(), ISSUER);
        let issuer = Arc::new(TokenIssuer::new(signer));
        let verifier = AssertionVerifier::new(
            ISSUER,
            Duration::from_secs(300),
            Arc::new(MockFlowStore::default()),
        );
        let authenticator = Arc::new(ClientAuthenticator::new(
            Arc::new(MockRegistry { client }),
            verifier,
        ));
        let audit = Arc::new(AuditRecorder::new(&config.audit, Arc::new(NullSink)));
        (
            CredentialsService::new(config, authenticator, issuer.clone(), audit),
            issuer,
        )
    }

    fn audited_service(client: Client, enabled: bool) -> (CredentialsService, Arc<RecordingSink>) {
        let mut config = AuthConfig {
            issuer: ISSUER.to_string(),
            ..AuthConfig::default()
        };
        config.audit.enabled = enabled;
        let config = Arc::new(config);
        let signer = TokenSigner::new(SigningKeyPair::generate_ec().unwrap(), ISSUER);
        let issuer = Arc::new(TokenIssuer::new(signer));
        let verifier = AssertionVerifier::new(
            ISSUER,
            Duration::from_secs(300),
            Arc::new(MockFlowStore::default()),
        );
        let authenticator = Arc::new(ClientAuthenticator::new(
            Arc::new(MockRegistry { client }),
            verifier,
        ));
        let sink = Arc::new(RecordingSink::default());
        let audit = Arc::new(AuditRecorder::new(&config.audit, sink.clone()));
        (
            CredentialsService::new(config, authenticator, issuer, audit),
            sink,
        )
    }

    fn token_request(scope: &str) -> TokenRequest {
        TokenRequest {
            grant_type: Some("client_credentials".to_string()),
            client_id: Some("grade-sync".to_string()),
            client_secret: Some(SECRET.to_string()),
            scope: Some(scope.to_string()),
            ..TokenRequest::default()
        }
    }

    #[tokio::test]
    async fn test_machine_token_issued() {
        let (service, issuer) = service(machine_client(None, true));
        let response = service
            .issue(&token_request("directory:read"), None, &RequestContext::new())
            .await
            .unwrap();

        let claims: serde_json::Value = issuer
            .signer()
            .verify(TokenKind::Access, &response.access_token)
            .unwrap()
            .claims;
        assert_eq!(claims["sub"], "grade-sync");
        assert_eq!(claims["client_id"], "grade-sync");
        assert_eq!(claims["scope"], "directory:read");
        assert!(response.id_token.is_none());
    }

    #[tokio::test]
    async fn test_firewall_claims_embedded() {
        let firewall = ClientFirewall {
            allowed_organisations: vec!["north-campus".to_string()],
            allowed_endpoints: vec!["/directory/students".to_string()],
            required_service: Some("grading".to_string()),
        };
        let (service, issuer) = service(machine_client(Some(firewall), true));
        let response = service
            .issue(&token_request("directory:read"), None, &RequestContext::new())
            .await
            .unwrap();

        let claims: serde_json::Value = issuer
            .signer()
            .verify(TokenKind::Access, &response.access_token)
            .unwrap()
            .claims;
        assert_eq!(claims["allowed_organisations"][0], "north-campus");
        assert_eq!(claims["allowed_endpoints"][0], "/directory/students");
        assert_eq!(claims["required_service"], "grading");
    }

    #[tokio::test]
    async fn test_empty_effective_scopes_hard_failure() {
        let (service, _) = service(machine_client(None, true));
        let err = service
            .issue(
                &token_request("devices:manage"),
                None,
                &RequestContext::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_scope");
    }

    #[tokio::test]
    async fn test_reduced_scopes_reported() {
        let (service, _) = service(machine_client(None, true));
        let response = service
            .issue(
                &token_request("directory:read devices:manage"),
                None,
                &RequestContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.scope.as_deref(), Some("directory:read"));
    }

    #[tokio::test]
    async fn test_disabled_client_rejected() {
        let (service, _) = service(machine_client(None, false));
        let err = service
            .issue(&token_request("directory:read"), None, &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");
    }

    #[tokio::test]
    async fn test_rejected_grant_leaves_failure_audit_entry() {
        let (service, sink) = audited_service(machine_client(None, false), true);
        let err = service
            .issue(&token_request("directory:read"), None, &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        match &records[0] {
            AuditRecord::Usage {
                token_id,
                status,
                error,
                ..
            } => {
                assert_eq!(token_id, "grade-sync");
                assert_eq!(status, "rejected");
                assert!(
                    error
                        .as_deref()
                        .unwrap_or_default()
                        .contains("client authentication failed")
                );
            }
            other => panic!("expected a usage record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_successful_grant_audits_issuance_only() {
        let (service, sink) = audited_service(machine_client(None, true), true);
        service
            .issue(&token_request("directory:read"), None, &RequestContext::new())
            .await
            .unwrap();

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(matches!(&records[0], AuditRecord::Issuance { client_id, .. } if client_id == "grade-sync"));
    }

    #[tokio::test]
    async fn test_rejected_grant_unrecorded_when_audit_disabled() {
        let (service, sink) = audited_service(machine_client(None, false), false);
        service
            .issue(&token_request("directory:read"), None, &RequestContext::new())
            .await
            .unwrap_err();
        assert!(sink.records.lock().unwrap().is_empty());
    }
}
