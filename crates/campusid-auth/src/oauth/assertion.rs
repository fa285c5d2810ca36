//! Signed client assertion verification (RFC 7523).
//!
//! Backend clients may authenticate with a JWT signed by their private
//! key. The assertion must carry:
//!
//! - `iss` and `sub`: both equal to the client_id
//! - `aud`: containing this server's issuer identifier
//! - `exp`: within the configured maximum lifetime
//! - `jti`: unique, tracked in the flow store against replay
//!
//! The verification key comes from the matched authentication record:
//! either its PEM public key or its embedded JWK set, selected by which
//! field is populated. A record populated with both, or neither, is
//! ambiguous trust material and fails closed. Pinned `kid`/`alg` values
//! on the record are enforced against the JOSE header before any
//! signature check.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{AuthError, AuthResult};
use crate::storage::FlowStore;
use crate::types::AuthenticationRecord;

/// The assertion type value of RFC 7523.
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Claims of a client assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAssertionClaims {
    /// Issuer - must be the client_id.
    pub iss: String,

    /// Subject - must be the client_id.
    pub sub: String,

    /// Audience - must contain this server's issuer identifier.
    pub aud: StringOrArray,

    /// Expiration time as Unix timestamp.
    pub exp: i64,

    /// JWT ID - must be unique to prevent replay.
    pub jti: String,

    /// Issued at time as Unix timestamp (optional but recommended).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Audience claim: single string or array of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrArray {
    /// Single string audience.
    String(String),
    /// Array of audience strings.
    Array(Vec<String>),
}

impl StringOrArray {
    /// Checks if the audience contains the specified value.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::String(s) => s == value,
            Self::Array(arr) => arr.iter().any(|s| s == value),
        }
    }
}

/// The JOSE header fields assertion validation reads.
#[derive(Debug, Clone)]
pub struct AssertionHeader {
    /// The `alg` header value, verbatim.
    pub alg: String,

    /// The `kid` header value, if present.
    pub kid: Option<String>,
}

/// Verifies client assertions against a record's trust material.
pub struct AssertionVerifier {
    /// This server's issuer identifier (expected audience).
    issuer: String,

    /// Maximum accepted assertion lifetime.
    max_lifetime: Duration,

    /// Flow store used to track consumed `jti` values.
    flow_store: Arc<dyn FlowStore>,
}

impl AssertionVerifier {
    /// Creates a verifier. `max_lifetime` bounds how far in the future an
    /// assertion's `exp` may lie (300 seconds is conventional).
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        max_lifetime: Duration,
        flow_store: Arc<dyn FlowStore>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            max_lifetime,
            flow_store,
        }
    }

    /// Verifies `assertion` for `client_id` against `record`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnauthorizedClient` for every verification
    /// failure: malformed JWT, pin mismatch, ambiguous key material, bad
    /// signature, claim mismatch, replayed `jti`.
    pub async fn verify(
        &self,
        assertion: &str,
        client_id: &str,
        record: &AuthenticationRecord,
    ) -> AuthResult<ClientAssertionClaims> {
        let header = extract_header(assertion)?;

        // Pins are enforced before anything is trusted, including the
        // signature (key-confusion defense).
        if let Some(pinned_kid) = &record.pinned_kid {
            if header.kid.as_deref() != Some(pinned_kid.as_str()) {
                return Err(AuthError::unauthorized_client(
                    "assertion key id does not match the pinned key id",
                ));
            }
        }
        if let Some(pinned_alg) = &record.pinned_alg {
            if &header.alg != pinned_alg {
                return Err(AuthError::unauthorized_client(
                    "assertion algorithm does not match the pinned algorithm",
                ));
            }
        }

        let algorithm = parse_algorithm(&header.alg)?;
        let decoding_key = decoding_key_for(record, &header, algorithm)?;

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[&self.issuer]);
        validation.set_issuer(&[client_id]);

        let token_data =
            jsonwebtoken::decode::<ClientAssertionClaims>(assertion, &decoding_key, &validation)
                .map_err(|e| {
                    tracing::debug!(client_id, error = %e, "client assertion rejected");
                    AuthError::unauthorized_client(format!("invalid client assertion: {e}"))
                })?;

        let claims = token_data.claims;

        if claims.iss != client_id {
            return Err(AuthError::unauthorized_client(
                "assertion issuer must equal client_id",
            ));
        }
        if claims.sub != client_id {
            return Err(AuthError::unauthorized_client(
                "assertion subject must equal client_id",
            ));
        }
        if !claims.aud.contains(&self.issuer) {
            return Err(AuthError::unauthorized_client(
                "assertion audience must contain this server's issuer",
            ));
        }

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let max_lifetime_secs = self.max_lifetime.as_secs() as i64;
        if claims.exp > now + max_lifetime_secs {
            return Err(AuthError::unauthorized_client(format!(
                "assertion exp must be within {max_lifetime_secs} seconds"
            )));
        }

        // Single-use jti: a create-only write is the atomic "first seen"
        // test, same as for authorization codes.
        let jti_ttl = Duration::from_secs((claims.exp - now).max(1) as u64);
        let jti_key = format!("assertion-jti:{}", claims.jti);
        match self
            .flow_store
            .put(&jti_key, serde_json::Value::Bool(true), jti_ttl, true)
            .await
        {
            Ok(()) => {}
            Err(crate::storage::StorageError::AlreadyExists) => {
                return Err(AuthError::unauthorized_client(
                    "assertion jti already used",
                ));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(claims)
    }
}

/// Extracts the client id from an unverified assertion.
///
/// Used to look the client up before the signature can be checked. The
/// verified claims are compared against this value afterwards.
pub fn extract_client_id_unverified(assertion: &str) -> AuthResult<String> {
    let parts: Vec<&str> = assertion.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::unauthorized_client("invalid assertion format"));
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| AuthError::unauthorized_client("invalid assertion payload encoding"))?;

    #[derive(Deserialize)]
    struct MinimalClaims {
        #[serde(default)]
        iss: Option<String>,
        #[serde(default)]
        sub: Option<String>,
    }

    let claims: MinimalClaims = serde_json::from_slice(&payload_bytes)
        .map_err(|_| AuthError::unauthorized_client("invalid assertion payload JSON"))?;

    claims
        .iss
        .or(claims.sub)
        .ok_or_else(|| AuthError::unauthorized_client("assertion missing iss and sub claims"))
}

/// Extracts the JOSE header fields from an unverified assertion.
pub fn extract_header(assertion: &str) -> AuthResult<AssertionHeader> {
    let parts: Vec<&str> = assertion.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::unauthorized_client("invalid assertion format"));
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(parts[0])
        .map_err(|_| AuthError::unauthorized_client("invalid assertion header encoding"))?;

    #[derive(Deserialize)]
    struct RawHeader {
        alg: String,
        #[serde(default)]
        kid: Option<String>,
    }

    let header: RawHeader = serde_json::from_slice(&header_bytes)
        .map_err(|_| AuthError::unauthorized_client("invalid assertion header JSON"))?;

    Ok(AssertionHeader {
        alg: header.alg,
        kid: header.kid,
    })
}

fn parse_algorithm(alg: &str) -> AuthResult<Algorithm> {
    match alg {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        "PS256" => Ok(Algorithm::PS256),
        "PS384" => Ok(Algorithm::PS384),
        "PS512" => Ok(Algorithm::PS512),
        _ => Err(AuthError::unauthorized_client(format!(
            "unsupported assertion algorithm: {alg}"
        ))),
    }
}

/// Resolves the verification key from the record's populated field.
fn decoding_key_for(
    record: &AuthenticationRecord,
    header: &AssertionHeader,
    algorithm: Algorithm,
) -> AuthResult<DecodingKey> {
    match (&record.public_key_pem, &record.jwks) {
        (Some(pem), None) => {
            let is_rsa = matches!(
                algorithm,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            );
            let key = if is_rsa {
                DecodingKey::from_rsa_pem(pem.as_bytes())
            } else {
                DecodingKey::from_ec_pem(pem.as_bytes())
            };
            key.map_err(|e| {
                AuthError::unauthorized_client(format!("record public key is invalid: {e}"))
            })
        }
        (None, Some(jwks)) => {
            let jwk = match header.kid.as_deref() {
                Some(kid) => jwks
                    .keys
                    .iter()
                    .find(|k| k.common.key_id.as_deref() == Some(kid)),
                None if jwks.keys.len() == 1 => jwks.keys.first(),
                None => None,
            }
            .ok_or_else(|| {
                AuthError::unauthorized_client("no key in the record's JWK set matches the assertion")
            })?;
            DecodingKey::from_jwk(jwk).map_err(|e| {
                AuthError::unauthorized_client(format!("record JWK is invalid: {e}"))
            })
        }
        // Both or neither populated: ambiguous material, fail closed.
        _ => Err(AuthError::unauthorized_client(
            "record carries ambiguous assertion key material",
        )),
    }
}
