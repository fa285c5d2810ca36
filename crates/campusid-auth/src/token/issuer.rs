//! Claim assembly and token issuance.
//!
//! The issuer builds the canonical claim map every token shares (jti, iat,
//! nbf, exp, iss, sub, aud, scope, client_id) and merges per-grant custom
//! claims on top. Signing failures come back as typed [`JwtError`] values;
//! the grant handlers convert them, never panic.

use std::time::Duration;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use super::jwt::{JwtError, TokenKind, TokenSigner};
use crate::scopes::ScopeSet;

/// A signed token together with the metadata the caller reports.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The signed compact JWT.
    pub token: String,

    /// The token's `jti` claim, recorded in audit entries.
    pub jti: String,

    /// Seconds until expiry, for the `expires_in` response field.
    pub expires_in: u64,

    /// Snapshot of the claims, for issuance auditing.
    pub claims: Map<String, Value>,
}

/// Parameters for one token issuance.
#[derive(Debug, Clone)]
pub struct IssueRequest<'a> {
    /// Artifact kind; selects the header `typ`.
    pub kind: TokenKind,

    /// `sub` claim.
    pub subject: &'a str,

    /// `aud` claim.
    pub audience: &'a str,

    /// Scopes, space-joined into the `scope` claim. Skipped when empty.
    pub scopes: &'a ScopeSet,

    /// `client_id` claim, when the grant has one.
    pub client_id: Option<&'a str>,

    /// Token lifetime.
    pub lifetime: Duration,

    /// Custom claims merged over the canonical map.
    pub custom_claims: Map<String, Value>,
}

/// Builds and signs tokens.
pub struct TokenIssuer {
    signer: TokenSigner,
}

impl TokenIssuer {
    /// Creates an issuer over the server's signer.
    #[must_use]
    pub fn new(signer: TokenSigner) -> Self {
        Self { signer }
    }

    /// Returns the underlying signer.
    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Builds the canonical claim map, merges custom claims, and signs.
    ///
    /// Custom claims never override the canonical ones; a grant handler
    /// supplying its own `iss` or `exp` is a bug this guards against.
    ///
    /// # Errors
    /// Returns a typed error if signing fails.
    pub fn issue(&self, request: &IssueRequest<'_>) -> Result<IssuedToken, JwtError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let lifetime_secs = request.lifetime.as_secs();
        let jti = Uuid::new_v4().to_string();

        let mut claims = request.custom_claims.clone();
        claims.insert("jti".to_string(), Value::from(jti.clone()));
        claims.insert("iat".to_string(), Value::from(now));
        claims.insert("nbf".to_string(), Value::from(now));
        claims.insert("exp".to_string(), Value::from(now + lifetime_secs as i64));
        claims.insert(
            "iss".to_string(),
            Value::from(self.signer.issuer().to_string()),
        );
        claims.insert("sub".to_string(), Value::from(request.subject.to_string()));
        claims.insert("aud".to_string(), Value::from(request.audience.to_string()));
        if !request.scopes.is_empty() {
            claims.insert(
                "scope".to_string(),
                Value::from(request.scopes.to_scope_string()),
            );
        }
        if let Some(client_id) = request.client_id {
            claims.insert("client_id".to_string(), Value::from(client_id.to_string()));
        }

        let token = self.signer.sign(request.kind, &claims)?;

        Ok(IssuedToken {
            token,
            jti,
            expires_in: lifetime_secs,
            claims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::jwt::SigningKeyPair;

    fn issuer() -> TokenIssuer {
        let key_pair = SigningKeyPair::generate_ec().unwrap();
        TokenIssuer::new(TokenSigner::new(key_pair, "https://id.campus.example"))
    }

    fn request<'a>(scopes: &'a ScopeSet, custom: Map<String, Value>) -> IssueRequest<'a> {
        IssueRequest {
            kind: TokenKind::Access,
            subject: "u-1",
            audience: "campusid/userinfo",
            scopes,
            client_id: Some("demo-client"),
            lifetime: Duration::from_secs(3600),
            custom_claims: custom,
        }
    }

    #[test]
    fn test_canonical_claims_present() {
        let issuer = issuer();
        let scopes = ScopeSet::parse("openid profile");
        let issued = issuer.issue(&request(&scopes, Map::new())).unwrap();

        assert_eq!(issued.expires_in, 3600);
        assert_eq!(issued.claims["iss"], "https://id.campus.example");
        assert_eq!(issued.claims["sub"], "u-1");
        assert_eq!(issued.claims["aud"], "campusid/userinfo");
        assert_eq!(issued.claims["scope"], "openid profile");
        assert_eq!(issued.claims["client_id"], "demo-client");
        assert_eq!(issued.claims["jti"], issued.jti.as_str());
        assert_eq!(issued.claims["iat"], issued.claims["nbf"]);

        let decoded = issuer
            .signer()
            .verify::<serde_json::Value>(TokenKind::Access, &issued.token)
            .unwrap();
        assert_eq!(decoded.claims["jti"], issued.jti.as_str());
    }

    #[test]
    fn test_custom_claims_merged_but_not_overriding() {
        let issuer = issuer();
        let scopes = ScopeSet::parse("openid");
        let mut custom = Map::new();
        custom.insert("organisation".to_string(), Value::from("north-campus"));
        custom.insert("iss".to_string(), Value::from("https://evil.example"));

        let issued = issuer.issue(&request(&scopes, custom)).unwrap();
        assert_eq!(issued.claims["organisation"], "north-campus");
        assert_eq!(issued.claims["iss"], "https://id.campus.example");
    }

    #[test]
    fn test_empty_scope_claim_skipped() {
        let issuer = issuer();
        let scopes = ScopeSet::default();
        let issued = issuer.issue(&request(&scopes, Map::new())).unwrap();
        assert!(!issued.claims.contains_key("scope"));
    }

    #[test]
    fn test_fresh_jti_per_issue() {
        let issuer = issuer();
        let scopes = ScopeSet::parse("openid");
        let a = issuer.issue(&request(&scopes, Map::new())).unwrap();
        let b = issuer.issue(&request(&scopes, Map::new())).unwrap();
        assert_ne!(a.jti, b.jti);
    }
}
