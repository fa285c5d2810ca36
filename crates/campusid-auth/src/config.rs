//! Authorization subsystem configuration.
//!
//! Configuration is organized into subsections mirroring the flow: token
//! lifetimes, signing material, the global scope sets per grant family,
//! SSO sessions, the interactive login hand-off, and auditing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root authorization configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://id.campus.example"
///
/// [auth.oauth]
/// authorization_code_lifetime = "2m"
/// access_token_lifetime = "1h"
///
/// [auth.scopes]
/// login = ["openid", "profile", "email"]
/// machine = ["directory:read", "directory:write"]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Server issuer URL (token `iss` claim and the `iss` redirect
    /// parameter). The public base URL of the identity provider.
    pub issuer: String,

    /// OAuth 2.0 flow configuration.
    pub oauth: OAuthConfig,

    /// Token signing configuration.
    pub signing: SigningConfig,

    /// Global scope allow-lists per grant family.
    pub scopes: ScopeConfig,

    /// SSO session configuration.
    pub session: SessionConfig,

    /// Interactive login hand-off configuration.
    pub login: LoginConfig,

    /// Audit configuration.
    pub audit: AuditConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            oauth: OAuthConfig::default(),
            signing: SigningConfig::default(),
            scopes: ScopeConfig::default(),
            session: SessionConfig::default(),
            login: LoginConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// OAuth 2.0 flow configuration.
///
/// Controls the lifetimes of the ephemeral flow artifacts and the issued
/// tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Lifetime of a pending authorization (stage 1 until login completes).
    #[serde(with = "humantime_serde")]
    pub pending_lifetime: Duration,

    /// Authorization code lifetime. Codes are single-use and short-lived.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// ID token lifetime.
    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,

    /// Audience written into access tokens consumed by the userinfo
    /// endpoint and downstream resource servers.
    pub internal_audience: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            pending_lifetime: Duration::from_secs(600), // 10 minutes
            authorization_code_lifetime: Duration::from_secs(120), // 2 minutes
            access_token_lifetime: Duration::from_secs(3600), // 1 hour
            id_token_lifetime: Duration::from_secs(3600),
            internal_audience: "campusid/userinfo".to_string(),
        }
    }
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm. Supported: "RS256", "RS384", "ES384".
    pub algorithm: String,

    /// PEM-encoded private key. When empty, a fresh key pair is generated
    /// at startup (tokens do not survive a restart).
    pub private_key_pem: String,

    /// Key id advertised in the JWKS and written into token headers.
    pub key_id: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "ES384".to_string(),
            private_key_pem: String::new(),
            key_id: "campusid-1".to_string(),
        }
    }
}

/// Global scope allow-lists.
///
/// The login and machine sets are disjoint grant families: interactive
/// logins negotiate against `login`, client-credentials grants against
/// `machine`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Scopes grantable through the interactive authorization-code flow.
    pub login: Vec<String>,

    /// Scopes grantable through the client-credentials flow.
    pub machine: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            login: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "organisation".to_string(),
            ],
            machine: vec![
                "directory:read".to_string(),
                "directory:write".to_string(),
                "devices:manage".to_string(),
            ],
        }
    }
}

/// SSO session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Enable SSO session reuse. When disabled every authorization goes
    /// through interactive login.
    pub enabled: bool,

    /// Session lifetime. Sessions are refreshed on reuse.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lifetime: Duration::from_secs(8 * 3600), // 8 hours
        }
    }
}

/// Interactive login hand-off configuration.
///
/// The login form and MFA challenge are rendered by an external frontend;
/// this subsystem only redirects to it and consumes its completion.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginConfig {
    /// URL of the interactive login frontend. The pending request key is
    /// appended as a query parameter.
    pub url: String,

    /// Service name recorded on SSO sessions created by this server.
    pub service: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            url: "/login".to_string(),
            service: "campusid".to_string(),
        }
    }
}

/// Audit configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Enable audit recording. When disabled the recorder is inert.
    pub enabled: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    MissingValue(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The issuer URL is empty
    /// - The signing algorithm is not supported
    /// - The login and machine scope sets overlap
    /// - A lifetime is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        match self.signing.algorithm.as_str() {
            "RS256" | "RS384" | "ES384" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{other}'. Must be RS256, RS384, or ES384"
                )));
            }
        }

        for scope in &self.scopes.login {
            if self.scopes.machine.contains(scope) {
                return Err(ConfigError::InvalidValue(format!(
                    "Scope '{scope}' appears in both the login and machine sets"
                )));
            }
        }

        if self.oauth.authorization_code_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "authorization_code_lifetime must be > 0".to_string(),
            ));
        }

        if self.oauth.pending_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "pending_lifetime must be > 0".to_string(),
            ));
        }

        if self.login.url.is_empty() {
            return Err(ConfigError::MissingValue("login.url".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_issuer_rejected() {
        let config = AuthConfig {
            issuer: String::new(),
            ..AuthConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let mut config = AuthConfig::default();
        config.signing.algorithm = "HS256".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlapping_scope_sets_rejected() {
        let mut config = AuthConfig::default();
        config.scopes.machine.push("openid".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_humantime() {
        let value = serde_json::json!({
            "issuer": "https://id.campus.example",
            "oauth": {
                "authorization_code_lifetime": "2m",
                "access_token_lifetime": "30m"
            }
        });
        let config: AuthConfig = serde_json::from_value(value).unwrap();
        assert_eq!(
            config.oauth.authorization_code_lifetime,
            Duration::from_secs(120)
        );
        assert_eq!(config.oauth.access_token_lifetime, Duration::from_secs(1800));
        // Untouched sections keep their defaults.
        assert!(config.session.enabled);
    }
}
