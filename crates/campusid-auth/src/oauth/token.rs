//! Token endpoint wire types.
//!
//! The `grant_type` form field is parsed into a closed enum before any
//! dispatch; adding a grant is a compile-time-visible change.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// The grants this server issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code exchange (stage 3 of the login flow).
    AuthorizationCode,
    /// Machine-to-machine client credentials.
    ClientCredentials,
}

impl GrantType {
    /// Parses the `grant_type` form field.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnsupportedGrantType` for anything else.
    pub fn parse(value: &str) -> AuthResult<Self> {
        match value {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "client_credentials" => Ok(Self::ClientCredentials),
            other => Err(AuthError::unsupported_grant_type(other)),
        }
    }

    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token endpoint request (form-encoded body).
///
/// Every field is optional at parse time; which combination is required
/// depends on the grant and the authentication scheme, and the handlers
/// produce precise errors for what is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// The grant being exercised.
    #[serde(default)]
    pub grant_type: Option<String>,

    /// Authorization code (authorization_code grant).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI used at stage 1 (authorization_code grant).
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Client identifier.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (client_secret_post scheme).
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Signed client assertion (private key scheme).
    #[serde(default)]
    pub client_assertion: Option<String>,

    /// Assertion type; must be the RFC 7523 JWT bearer URN.
    #[serde(default)]
    pub client_assertion_type: Option<String>,

    /// Requested scopes (client_credentials grant).
    #[serde(default)]
    pub scope: Option<String>,
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    /// The signed access token.
    pub access_token: String,

    /// Always "Bearer".
    pub token_type: String,

    /// Seconds until the access token expires.
    pub expires_in: u64,

    /// Signed ID token (authorization_code grant with openid).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Effective scopes, present when they differ from the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Creates a bearer token response.
    #[must_use]
    pub fn new(access_token: impl Into<String>, expires_in: u64) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_in,
            id_token: None,
            scope: None,
        }
    }

    /// Attaches an ID token.
    #[must_use]
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    /// Attaches the effective scope string.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Token endpoint error body.
#[derive(Debug, Clone, Serialize)]
pub struct TokenErrorBody {
    /// OAuth 2.0 error code.
    pub error: &'static str,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Echoed state, when the failing request carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Correlation id for operators.
    pub request_id: Uuid,

    /// This server's issuer identifier.
    pub iss: String,
}

impl TokenErrorBody {
    /// Builds the wire body for an error.
    ///
    /// Server-side failures surface as a bare `server_error` without
    /// internal detail.
    #[must_use]
    pub fn from_error(err: &AuthError, request_id: Uuid, iss: impl Into<String>) -> Self {
        let error_description = if err.is_server_error() {
            None
        } else {
            Some(err.to_string())
        };
        Self {
            error: err.oauth_error_code(),
            error_description,
            state: None,
            request_id,
            iss: iss.into(),
        }
    }
}
