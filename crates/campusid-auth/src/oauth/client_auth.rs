//! Client authentication for the token endpoint.
//!
//! A request must carry exactly one authentication scheme: an HTTP Basic
//! header, a `client_secret` form pair, or a signed assertion pair. Zero
//! or more than one is rejected before any credential is examined.
//!
//! Credential lookup enforces the single-valid-record rule: for the
//! detected scheme the client must have exactly one authentication record
//! inside its validity window. Zero records means nothing to verify
//! against; two or more is ambiguous trust material, and the server never
//! tries candidates in sequence.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::oauth::assertion::{
    AssertionVerifier, JWT_BEARER_ASSERTION_TYPE, extract_client_id_unverified,
};
use crate::oauth::token::TokenRequest;
use crate::secret::verify_client_secret;
use crate::storage::client::ClientRegistry;
use crate::types::client::{AuthType, AuthenticationRecord, Client, ClientKind, is_valid_client_id};
use crate::types::context::RequestContext;

/// The authentication scheme detected on a token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAuthScheme {
    /// Credentials in the HTTP Basic Authorization header.
    SecretBasic { client_id: String, secret: String },
    /// Credentials in the form body.
    SecretPost { client_id: String, secret: String },
    /// Signed assertion in the form body.
    Assertion { assertion: String },
}

impl ClientAuthScheme {
    /// Detects which scheme a request uses.
    ///
    /// `basic_header` is the raw Authorization header value, when present.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnauthorizedClient` when no scheme or more than
    /// one scheme is present, and `AuthError::InvalidRequest` when the
    /// assertion pair is malformed.
    pub fn detect(
        basic_header: Option<&str>,
        request: &TokenRequest,
    ) -> AuthResult<Self> {
        let has_basic = basic_header.is_some();
        let has_post_secret = request.client_secret.is_some();
        let has_assertion =
            request.client_assertion.is_some() || request.client_assertion_type.is_some();

        let present = usize::from(has_basic) + usize::from(has_post_secret)
            + usize::from(has_assertion);
        if present == 0 {
            return Err(AuthError::unauthorized_client(
                "client authentication is required",
            ));
        }
        if present > 1 {
            return Err(AuthError::unauthorized_client(
                "request uses more than one client authentication method",
            ));
        }

        if let Some(header) = basic_header {
            let (client_id, secret) = parse_basic_auth(header)?;
            return Ok(Self::SecretBasic { client_id, secret });
        }

        if has_post_secret {
            let client_id = request.client_id.clone().ok_or_else(|| {
                AuthError::invalid_request("client_secret requires client_id")
            })?;
            let secret = request
                .client_secret
                .clone()
                .unwrap_or_default();
            return Ok(Self::SecretPost { client_id, secret });
        }

        // Assertion path. Both halves of the pair are mandatory.
        let assertion_type = request.client_assertion_type.as_deref().ok_or_else(|| {
            AuthError::invalid_request("client_assertion requires client_assertion_type")
        })?;
        if assertion_type != JWT_BEARER_ASSERTION_TYPE {
            return Err(AuthError::invalid_request(format!(
                "unsupported client_assertion_type: {assertion_type}"
            )));
        }
        let assertion = request.client_assertion.clone().ok_or_else(|| {
            AuthError::invalid_request("client_assertion_type requires client_assertion")
        })?;
        Ok(Self::Assertion { assertion })
    }

    /// Returns the RFC 8414 method name for logging and audit.
    #[must_use]
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::SecretBasic { .. } => "client_secret_basic",
            Self::SecretPost { .. } => "client_secret_post",
            Self::Assertion { .. } => "private_key_jwt",
        }
    }
}

/// Parses an HTTP Basic Authorization header into client credentials.
///
/// # Errors
///
/// Returns `AuthError::UnauthorizedClient` for a malformed header.
pub fn parse_basic_auth(header: &str) -> AuthResult<(String, String)> {
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or_else(|| AuthError::unauthorized_client("malformed Authorization header"))?;

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::unauthorized_client("malformed Authorization header"))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| AuthError::unauthorized_client("malformed Authorization header"))?;

    let (client_id, secret) = decoded
        .split_once(':')
        .ok_or_else(|| AuthError::unauthorized_client("malformed Authorization header"))?;
    if client_id.is_empty() {
        return Err(AuthError::unauthorized_client(
            "malformed Authorization header",
        ));
    }
    Ok((client_id.to_string(), secret.to_string()))
}

/// A client that passed token endpoint authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    /// The registered client.
    pub client: Client,
    /// Which scheme authenticated it.
    pub method: &'static str,
    /// The authentication record that matched, for audit trails.
    pub record_id: Uuid,
}

/// Verifies token endpoint credentials against the client registry.
pub struct ClientAuthenticator {
    registry: Arc<dyn ClientRegistry>,
    verifier: AssertionVerifier,
}

impl ClientAuthenticator {
    /// Creates an authenticator.
    #[must_use]
    pub fn new(registry: Arc<dyn ClientRegistry>, verifier: AssertionVerifier) -> Self {
        Self { registry, verifier }
    }

    /// Authenticates a detected scheme against the registry.
    ///
    /// Lookup failures, disabled clients, record ambiguity, and credential
    /// mismatches all collapse to the same `unauthorized_client` message on
    /// the wire; the distinguishing detail goes to the trace log only.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnauthorizedClient` when authentication fails.
    pub async fn authenticate(
        &self,
        scheme: &ClientAuthScheme,
        kind: ClientKind,
        ctx: &RequestContext,
    ) -> AuthResult<AuthenticatedClient> {
        let client_id = match scheme {
            ClientAuthScheme::SecretBasic { client_id, .. }
            | ClientAuthScheme::SecretPost { client_id, .. } => client_id.clone(),
            ClientAuthScheme::Assertion { assertion } => {
                extract_client_id_unverified(assertion)?
            }
        };

        if !is_valid_client_id(&client_id) {
            tracing::debug!(
                request_id = %ctx.request_id,
                client_id,
                "rejected client id with invalid shape"
            );
            return Err(auth_failed());
        }

        let client = self
            .registry
            .find_client(&client_id, kind)
            .await?
            .ok_or_else(|| {
                tracing::debug!(request_id = %ctx.request_id, client_id, "client not found");
                auth_failed()
            })?;

        if !client.enabled {
            tracing::debug!(request_id = %ctx.request_id, client_id, "client is disabled");
            return Err(auth_failed());
        }

        let now = OffsetDateTime::now_utc();
        let record = self.select_record(&client, scheme, now, ctx)?;

        match scheme {
            ClientAuthScheme::SecretBasic { secret, .. }
            | ClientAuthScheme::SecretPost { secret, .. } => {
                self.verify_secret(&client, record, secret, ctx)?;
            }
            ClientAuthScheme::Assertion { assertion } => {
                self.verifier
                    .verify(assertion, &client.client_id, record)
                    .await?;
            }
        }

        Ok(AuthenticatedClient {
            method: scheme.method_name(),
            record_id: record.id,
            client,
        })
    }

    /// Applies the single-valid-record rule for the detected scheme.
    fn select_record<'c>(
        &self,
        client: &'c Client,
        scheme: &ClientAuthScheme,
        now: OffsetDateTime,
        ctx: &RequestContext,
    ) -> AuthResult<&'c AuthenticationRecord> {
        let records: Vec<&AuthenticationRecord> = match scheme {
            ClientAuthScheme::SecretBasic { .. } | ClientAuthScheme::SecretPost { .. } => {
                client.valid_records(AuthType::Password, now)
            }
            // PEM and JWKS records both answer the assertion scheme, so
            // they count against the same rule.
            ClientAuthScheme::Assertion { .. } => client
                .auth_records
                .iter()
                .filter(|record| {
                    matches!(record.auth_type, AuthType::PublicKeyPem | AuthType::Jwks)
                        && record.is_valid_at(now)
                })
                .collect(),
        };

        match records.len() {
            1 => Ok(records[0]),
            0 => {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    client_id = client.client_id,
                    method = scheme.method_name(),
                    "no valid authentication record for scheme"
                );
                Err(auth_failed())
            }
            n => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    client_id = client.client_id,
                    method = scheme.method_name(),
                    records = n,
                    "ambiguous authentication records for scheme"
                );
                Err(auth_failed())
            }
        }
    }

    fn verify_secret(
        &self,
        client: &Client,
        record: &AuthenticationRecord,
        secret: &str,
        ctx: &RequestContext,
    ) -> AuthResult<()> {
        let stored_hash = record.secret_hash.as_deref().ok_or_else(|| {
            tracing::warn!(
                request_id = %ctx.request_id,
                client_id = client.client_id,
                record_id = %record.id,
                "password record has no stored hash"
            );
            auth_failed()
        })?;

        let matches = verify_client_secret(secret, stored_hash).map_err(|e| {
            tracing::warn!(
                request_id = %ctx.request_id,
                client_id = client.client_id,
                record_id = %record.id,
                error = %e,
                "stored secret hash is malformed"
            );
            auth_failed()
        })?;

        if !matches {
            tracing::debug!(
                request_id = %ctx.request_id,
                client_id = client.client_id,
                "client secret mismatch"
            );
            return Err(auth_failed());
        }
        Ok(())
    }
}

/// The uniform wire-visible authentication failure.
fn auth_failed() -> AuthError {
    AuthError::unauthorized_client("client authentication failed")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use jsonwebtoken::{EncodingKey, Header};
    use p384::SecretKey as EcSecretKey;
    use p384::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rand::rngs::OsRng;
    use serde_json::json;

    use super::*;
    use crate::secret::hash_client_secret;
    use crate::storage::StorageError;
    use crate::storage::flow::FlowStore;

    const ISSUER: &str = "https://id.campus.example";

    struct MockRegistry {
        clients: HashMap<String, Client>,
    }

    #[async_trait]
    impl ClientRegistry for MockRegistry {
        async fn find_client(
            &self,
            client_id: &str,
            kind: ClientKind,
        ) -> Result<Option<Client>, StorageError> {
            Ok(self
                .clients
                .get(client_id)
                .filter(|c| c.kind == kind)
                .cloned())
        }
    }

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

    fn password_record(secret: &str) -> AuthenticationRecord {
        AuthenticationRecord {
            id: Uuid::new_v4(),
            auth_type: AuthType::Password,
            secret_hash: Some(hash_client_secret(secret).unwrap()),
            public_key_pem: None,
            jwks: None,
            pinned_kid: None,
            pinned_alg: None,
            not_before: None,
            expires: None,
        }
    }

    fn pem_record(public_pem: &str, pinned_kid: Option<&str>) -> AuthenticationRecord {
        AuthenticationRecord {
            id: Uuid::new_v4(),
            auth_type: AuthType::PublicKeyPem,
            secret_hash: None,
            public_key_pem: Some(public_pem.to_string()),
            jwks: None,
            pinned_kid: pinned_kid.map(str::to_string),
            pinned_alg: Some("ES384".to_string()),
            not_before: None,
            expires: None,
        }
    }

    fn machine_client(client_id: &str, records: Vec<AuthenticationRecord>) -> Client {
        Client {
            client_id: client_id.to_string(),
            name: "Test Machine".to_string(),
            kind: ClientKind::Token,
            redirect_uris: vec![],
            allowed_scopes: vec!["directory:read".to_string()],
            firewall: None,
            enabled: true,
            auth_records: records,
        }
    }

    fn authenticator(clients: Vec<Client>) -> ClientAuthenticator {
        let registry = MockRegistry {
            clients: clients
                .into_iter()
                .map(|c| (c.client_id.clone(), c))
                .collect(),
        };
        let verifier = AssertionVerifier::new(
            ISSUER,
            Duration::from_secs(300),
            Arc::new(MockFlowStore::default()),
        );
        ClientAuthenticator::new(Arc::new(registry), verifier)
    }

    fn signed_assertion(
        client_id: &str,
        private_pem: &str,
        kid: Option<&str>,
        jti: &str,
    ) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = json!({
            "iss": client_id,
            "sub": client_id,
            "aud": ISSUER,
            "exp": now + 120,
            "iat": now,
            "jti": jti,
        });
        let mut header = Header::new(jsonwebtoken::Algorithm::ES384);
        header.kid = kid.map(str::to_string);
        let key = EncodingKey::from_ec_pem(private_pem.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, &claims, &key).unwrap()
    }

    fn ec_key_pems() -> (String, String) {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let private_pem = secret_key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
        let public_pem = secret_key
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (private_pem, public_pem)
    }

    #[test]
    fn test_detect_requires_exactly_one_scheme() {
        let request = TokenRequest::default();
        let err = ClientAuthScheme::detect(None, &request).unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");

        let request = TokenRequest {
            client_id: Some("course-planner".to_string()),
            client_secret: Some("s3".to_string()),
            ..TokenRequest::default()
        };
        let err = ClientAuthScheme::detect(Some("Basic Zm9vOmJhcg=="), &request).unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");
    }

    #[test]
    fn test_detect_basic() {
        // "course-planner:secret123"
        let header = format!(
            "Basic {}",
            STANDARD.encode("course-planner:secret123")
        );
        let scheme = ClientAuthScheme::detect(Some(&header), &TokenRequest::default()).unwrap();
        assert_eq!(
            scheme,
            ClientAuthScheme::SecretBasic {
                client_id: "course-planner".to_string(),
                secret: "secret123".to_string(),
            }
        );
    }

    #[test]
    fn test_detect_post_and_assertion() {
        let request = TokenRequest {
            client_id: Some("course-planner".to_string()),
            client_secret: Some("secret123".to_string()),
            ..TokenRequest::default()
        };
        let scheme = ClientAuthScheme::detect(None, &request).unwrap();
        assert_eq!(scheme.method_name(), "client_secret_post");

        let request = TokenRequest {
            client_assertion: Some("a.b.c".to_string()),
            client_assertion_type: Some(JWT_BEARER_ASSERTION_TYPE.to_string()),
            ..TokenRequest::default()
        };
        let scheme = ClientAuthScheme::detect(None, &request).unwrap();
        assert_eq!(scheme.method_name(), "private_key_jwt");
    }

    #[test]
    fn test_detect_rejects_partial_assertion_pair() {
        let request = TokenRequest {
            client_assertion: Some("a.b.c".to_string()),
            ..TokenRequest::default()
        };
        let err = ClientAuthScheme::detect(None, &request).unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");

        let request = TokenRequest {
            client_assertion: Some("a.b.c".to_string()),
            client_assertion_type: Some("urn:something:else".to_string()),
            ..TokenRequest::default()
        };
        let err = ClientAuthScheme::detect(None, &request).unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[test]
    fn test_parse_basic_auth_malformed() {
        assert!(parse_basic_auth("Bearer abc").is_err());
        assert!(parse_basic_auth("Basic not-base64!!!").is_err());
        let no_colon = format!("Basic {}", STANDARD.encode("no-colon-here"));
        assert!(parse_basic_auth(&no_colon).is_err());
    }

    #[tokio::test]
    async fn test_secret_post_success() {
        let client = machine_client("course-planner", vec![password_record("secret123")]);
        let auth = authenticator(vec![client]);

        let scheme = ClientAuthScheme::SecretPost {
            client_id: "course-planner".to_string(),
            secret: "secret123".to_string(),
        };
        let ctx = RequestContext::new();
        let authenticated = auth
            .authenticate(&scheme, ClientKind::Token, &ctx)
            .await
            .unwrap();
        assert_eq!(authenticated.client.client_id, "course-planner");
        assert_eq!(authenticated.method, "client_secret_post");
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let client = machine_client("course-planner", vec![password_record("secret123")]);
        let auth = authenticator(vec![client]);

        let scheme = ClientAuthScheme::SecretPost {
            client_id: "course-planner".to_string(),
            secret: "wrong".to_string(),
        };
        let err = auth
            .authenticate(&scheme, ClientKind::Token, &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");
    }

    #[tokio::test]
    async fn test_unknown_and_disabled_clients_rejected() {
        let mut disabled = machine_client("dorm-access", vec![password_record("secret123")]);
        disabled.enabled = false;
        let auth = authenticator(vec![disabled]);

        let ctx = RequestContext::new();
        let scheme = ClientAuthScheme::SecretPost {
            client_id: "nobody".to_string(),
            secret: "secret123".to_string(),
        };
        assert!(auth.authenticate(&scheme, ClientKind::Token, &ctx).await.is_err());

        let scheme = ClientAuthScheme::SecretPost {
            client_id: "dorm-access".to_string(),
            secret: "secret123".to_string(),
        };
        assert!(auth.authenticate(&scheme, ClientKind::Token, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_valid_records_rejected() {
        let client = machine_client("course-planner", vec![]);
        let auth = authenticator(vec![client]);

        let scheme = ClientAuthScheme::SecretPost {
            client_id: "course-planner".to_string(),
            secret: "secret123".to_string(),
        };
        let err = auth
            .authenticate(&scheme, ClientKind::Token, &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");
    }

    #[tokio::test]
    async fn test_two_valid_records_are_ambiguous() {
        let client = machine_client(
            "course-planner",
            vec![password_record("secret123"), password_record("secret123")],
        );
        let auth = authenticator(vec![client]);

        // Both records would verify, but ambiguity is a hard failure.
        let scheme = ClientAuthScheme::SecretPost {
            client_id: "course-planner".to_string(),
            secret: "secret123".to_string(),
        };
        let err = auth
            .authenticate(&scheme, ClientKind::Token, &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");
    }

    #[tokio::test]
    async fn test_expired_record_not_counted() {
        let secret = "secret123";
        let mut expired = password_record(secret);
        expired.expires = Some(OffsetDateTime::now_utc() - time::Duration::hours(1));
        let live = password_record(secret);
        let client = machine_client("course-planner", vec![expired, live]);
        let auth = authenticator(vec![client]);

        // The expired record does not make the live one ambiguous.
        let scheme = ClientAuthScheme::SecretPost {
            client_id: "course-planner".to_string(),
            secret: secret.to_string(),
        };
        assert!(
            auth.authenticate(&scheme, ClientKind::Token, &RequestContext::new())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_assertion_success() {
        let (private_pem, public_pem) = ec_key_pems();
        let client = machine_client(
            "grade-sync",
            vec![pem_record(&public_pem, Some("grade-sync-key-1"))],
        );
        let auth = authenticator(vec![client]);

        let assertion =
            signed_assertion("grade-sync", &private_pem, Some("grade-sync-key-1"), "jti-1");
        let scheme = ClientAuthScheme::Assertion { assertion };
        let authenticated = auth
            .authenticate(&scheme, ClientKind::Token, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(authenticated.method, "private_key_jwt");
    }

    #[tokio::test]
    async fn test_assertion_pinned_kid_mismatch() {
        let (private_pem, public_pem) = ec_key_pems();
        let client = machine_client(
            "grade-sync",
            vec![pem_record(&public_pem, Some("grade-sync-key-1"))],
        );
        let auth = authenticator(vec![client]);

        // Valid signature under the registered key, wrong kid header.
        let assertion =
            signed_assertion("grade-sync", &private_pem, Some("some-other-kid"), "jti-2");
        let scheme = ClientAuthScheme::Assertion { assertion };
        let err = auth
            .authenticate(&scheme, ClientKind::Token, &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");
    }

    #[tokio::test]
    async fn test_assertion_jti_replay_rejected() {
        let (private_pem, public_pem) = ec_key_pems();
        let client = machine_client(
            "grade-sync",
            vec![pem_record(&public_pem, Some("grade-sync-key-1"))],
        );
        let auth = authenticator(vec![client]);

        let assertion =
            signed_assertion("grade-sync", &private_pem, Some("grade-sync-key-1"), "jti-3");
        let scheme = ClientAuthScheme::Assertion {
            assertion: assertion.clone(),
        };
        let ctx = RequestContext::new();
        assert!(auth.authenticate(&scheme, ClientKind::Token, &ctx).await.is_ok());

        let err = auth
            .authenticate(&scheme, ClientKind::Token, &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");
    }

    #[tokio::test]
    async fn test_assertion_signed_by_foreign_key_rejected() {
        let (_own_private, public_pem) = ec_key_pems();
        let (foreign_private, _) = ec_key_pems();
        let client = machine_client(
            "grade-sync",
            vec![pem_record(&public_pem, Some("grade-sync-key-1"))],
        );
        let auth = authenticator(vec![client]);

        let assertion =
            signed_assertion("grade-sync", &foreign_private, Some("grade-sync-key-1"), "jti-4");
        let scheme = ClientAuthScheme::Assertion { assertion };
        let err = auth
            .authenticate(&scheme, ClientKind::Token, &RequestContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unauthorized_client");
    }
}
