//! OAuth 2.0 client registration types.
//!
//! Clients are managed out of band by a registry; this module defines the
//! shape the authorization flows read. A client carries one or more
//! [`AuthenticationRecord`]s holding its trust material; record selection
//! (the exactly-one-valid rule) lives in the authentication engine.

use std::sync::LazyLock;

use jsonwebtoken::jwk::JwkSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

static CLIENT_ID_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_-]{1,63}$").expect("client id pattern is valid")
});

/// Checks a client identifier against the fixed shape: lowercase letter
/// first, then lowercase alphanumerics, `_` or `-`, 2 to 64 characters.
#[must_use]
pub fn is_valid_client_id(client_id: &str) -> bool {
    CLIENT_ID_SHAPE.is_match(client_id)
}

// =============================================================================
// Client Kind
// =============================================================================

/// The flow family a client registration belongs to.
///
/// Login clients drive the interactive authorization-code flow; token
/// clients are backend services using the client-credentials grant. The
/// registry is keyed by (client_id, kind), so the same identifier can
/// never serve both families by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    /// Interactive authorization-code client.
    Login,
    /// Machine-to-machine client-credentials client.
    Token,
}

impl ClientKind {
    /// Returns the registry key segment for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Token => "token",
        }
    }
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Authentication Records
// =============================================================================

/// The authentication scheme an [`AuthenticationRecord`] supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// Shared secret, stored as a memory-hard hash.
    Password,
    /// Signed assertion verified against a single PEM public key.
    PublicKeyPem,
    /// Signed assertion verified against an embedded JWK set.
    Jwks,
}

impl AuthType {
    /// Returns the wire name of this authentication type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::PublicKeyPem => "public_key_pem",
            Self::Jwks => "jwks",
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of client trust material with a validity window.
///
/// Exactly one field of `secret_hash` / `public_key_pem` / `jwks` is
/// populated, matching `auth_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRecord {
    /// Stable record identifier, used in audit trails.
    pub id: Uuid,

    /// Which scheme this record supports.
    pub auth_type: AuthType,

    /// Argon2 hash of the shared secret (password records).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_hash: Option<String>,

    /// PEM-encoded public key (public_key_pem records).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_pem: Option<String>,

    /// Embedded JWK set (jwks records).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,

    /// When set, the assertion's JOSE header `kid` must equal this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_kid: Option<String>,

    /// When set, the assertion's JOSE header `alg` must equal this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_alg: Option<String>,

    /// Start of the validity window. `None` means valid from creation.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub not_before: Option<OffsetDateTime>,

    /// End of the validity window. `None` means no expiry.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires: Option<OffsetDateTime>,
}

impl AuthenticationRecord {
    /// Returns whether the record is inside its validity window at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        if let Some(not_before) = self.not_before {
            if now < not_before {
                return false;
            }
        }
        if let Some(expires) = self.expires {
            if now >= expires {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Client
// =============================================================================

/// Restrictions a backend client carries into its access tokens.
///
/// Embedded verbatim as token claims so resource servers can self-enforce
/// them without calling back into the authorization server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFirewall {
    /// Organisations the client may act on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_organisations: Vec<String>,

    /// Endpoint names the client may call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_endpoints: Vec<String>,

    /// Service the client must present itself as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_service: Option<String>,
}

impl ClientFirewall {
    /// Returns whether any restriction is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed_organisations.is_empty()
            && self.allowed_endpoints.is_empty()
            && self.required_service.is_none()
    }
}

/// An OAuth 2.0 client registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Human-readable display name.
    pub name: String,

    /// Flow family this registration belongs to.
    pub kind: ClientKind,

    /// Allowed redirect URIs. Membership is literal; no prefix or
    /// wildcard matching.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Scopes this client may request. `openid` is implicitly allowed
    /// for login clients and need not be listed.
    #[serde(default)]
    pub allowed_scopes: Vec<String>,

    /// Optional restrictions embedded into issued machine tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall: Option<ClientFirewall>,

    /// Whether this client is currently enabled.
    pub enabled: bool,

    /// Trust material. Managed alongside the client by the registry.
    #[serde(default)]
    pub auth_records: Vec<AuthenticationRecord>,
}

impl Client {
    /// Checks if the given redirect URI is registered for this client.
    ///
    /// The comparison is byte-identical: a trailing slash or differing
    /// query string is a different URI.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Returns the authentication records of the given type that are
    /// inside their validity window at `now`.
    #[must_use]
    pub fn valid_records(&self, auth_type: AuthType, now: OffsetDateTime) -> Vec<&AuthenticationRecord> {
        self.auth_records
            .iter()
            .filter(|record| record.auth_type == auth_type && record.is_valid_at(now))
            .collect()
    }

    /// Validates the registration shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is structurally invalid.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if !is_valid_client_id(&self.client_id) {
            return Err(ClientValidationError::MalformedClientId);
        }

        if self.name.is_empty() {
            return Err(ClientValidationError::EmptyName);
        }

        if self.kind == ClientKind::Login && self.redirect_uris.is_empty() {
            return Err(ClientValidationError::NoRedirectUris);
        }

        if self.auth_records.is_empty() {
            return Err(ClientValidationError::NoAuthRecords);
        }

        for record in &self.auth_records {
            let populated = match record.auth_type {
                AuthType::Password => record.secret_hash.is_some(),
                AuthType::PublicKeyPem => record.public_key_pem.is_some(),
                AuthType::Jwks => record.jwks.is_some(),
            };
            if !populated {
                return Err(ClientValidationError::EmptyAuthRecord { id: record.id });
            }
        }

        Ok(())
    }
}

/// Client registration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientValidationError {
    /// The client_id does not match the required shape.
    #[error("client_id does not match the required shape")]
    MalformedClientId,

    /// The display name is empty.
    #[error("client name cannot be empty")]
    EmptyName,

    /// A login client has no registered redirect URIs.
    #[error("login clients require at least one redirect URI")]
    NoRedirectUris,

    /// The client has no authentication records.
    #[error("client has no authentication records")]
    NoAuthRecords,

    /// A record carries no credential material for its type.
    #[error("authentication record {id} has no credential material")]
    EmptyAuthRecord {
        /// The offending record.
        id: Uuid,
    },
}
