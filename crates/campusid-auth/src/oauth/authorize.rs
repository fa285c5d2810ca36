//! Authorization endpoint wire types.
//!
//! Request parsing, success/error redirect construction, and the split
//! between in-page and redirect errors.
//!
//! # Error propagation
//!
//! A redirect target can only carry error detail once it has been
//! validated: failures discovered before the redirect_uri check render a
//! generic in-page error, failures after it become RFC 6749 redirects
//! with `error`, `error_description`, `state`, and `iss`.

use serde::Deserialize;

use crate::error::AuthError;

/// Authorization request parameters.
///
/// Received as query (GET) or form (POST) parameters on the authorization
/// endpoint.
///
/// # Example
///
/// ```ignore
/// GET /authorize?
///   response_type=code
///   &client_id=demo-client
///   &redirect_uri=https://app.example/cb
///   &scope=openid profile
///   &state=abc123xyz
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationRequest {
    /// Must be "code"; this server issues no other response type.
    #[serde(default)]
    pub response_type: Option<String>,

    /// Client identifier issued during registration.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Redirect URI where the response will be sent. Must literally match
    /// one of the registered redirect URIs.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Requested scopes (space-separated). Must include `openid`.
    #[serde(default)]
    pub scope: Option<String>,

    /// CSRF protection state parameter, echoed back verbatim.
    #[serde(default)]
    pub state: Option<String>,

    /// OpenID Connect nonce, bound into the ID token.
    #[serde(default)]
    pub nonce: Option<String>,
}

/// A successful stage-2 redirect back to the client.
#[derive(Debug, Clone)]
pub struct AuthorizationResponse {
    /// The one-time authorization code.
    pub code: String,

    /// Echoed state parameter, if the client sent one.
    pub state: Option<String>,

    /// Effective scopes, set only when negotiation reduced the request
    /// (RFC 6749 §3.3).
    pub scope: Option<String>,

    /// This server's issuer identifier (RFC 9207).
    pub iss: String,
}

impl AuthorizationResponse {
    /// Builds the redirect URL with response parameters appended to the
    /// validated redirect URI.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the redirect URI is not a valid URL; the
    /// validator has already checked registry membership by this point.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("code", &self.code);
            if let Some(state) = &self.state {
                pairs.append_pair("state", state);
            }
            if let Some(scope) = &self.scope {
                pairs.append_pair("scope", scope);
            }
            pairs.append_pair("iss", &self.iss);
        }
        Ok(url.to_string())
    }
}

/// An error redirect back to the client, usable only after the
/// redirect_uri has been validated.
#[derive(Debug, Clone)]
pub struct AuthorizationErrorRedirect {
    /// OAuth 2.0 error code.
    pub error: &'static str,

    /// Human-readable description.
    pub error_description: String,

    /// Echoed state parameter, if the client sent one.
    pub state: Option<String>,

    /// This server's issuer identifier.
    pub iss: String,
}

impl AuthorizationErrorRedirect {
    /// Builds an error redirect from a flow error.
    #[must_use]
    pub fn from_error(err: &AuthError, state: Option<String>, iss: impl Into<String>) -> Self {
        Self {
            error: err.oauth_error_code(),
            error_description: err.to_string(),
            state,
            iss: iss.into(),
        }
    }

    /// Builds the redirect URL carrying the error parameters.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the redirect URI is not a valid URL.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("error", self.error);
            pairs.append_pair("error_description", &self.error_description);
            if let Some(state) = &self.state {
                pairs.append_pair("state", state);
            }
            pairs.append_pair("iss", &self.iss);
        }
        Ok(url.to_string())
    }
}

/// The validator's verdict on a stage-1 request.
///
/// Distinguishes where an error may be sent: `PageError` fires before the
/// redirect_uri is trusted, `RedirectError` after.
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// Request accepted; send the browser to the login frontend.
    LoginRedirect {
        /// URL of the login frontend with the pending key attached.
        url: String,
    },
    /// Request accepted and an identity resolved it; send the browser
    /// back to the client with a code.
    CodeRedirect {
        /// Complete redirect URL with code and parameters.
        url: String,
        /// Fresh SSO session token to set as a cookie, when one was
        /// created.
        session_token: Option<String>,
    },
    /// Rejected before the redirect_uri was validated. Render in-page.
    PageError {
        /// The underlying error (never leaked verbatim to the page).
        error: AuthError,
    },
    /// Rejected after the redirect_uri was validated. Redirect.
    RedirectError {
        /// Complete redirect URL with error parameters.
        url: String,
    },
}
