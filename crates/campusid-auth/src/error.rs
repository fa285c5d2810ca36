//! Authorization error types.
//!
//! Every failure in the subsystem is expressed as an [`AuthError`] and
//! carried to the HTTP boundary, which decides the wire shape (in-page
//! error, RFC 6749 redirect, or JSON body). The `oauth_error_code` mapping
//! is the single source of truth for the wire-level `error` field.

use std::fmt;

/// Errors that can occur during authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request is malformed, a parameter is missing, or an
    /// authorization code is unknown or already consumed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The requested scope set is invalid, or negotiation left nothing.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The client is unknown, disabled, malformed, or failed to
    /// authenticate (bad secret, bad or ambiguous assertion material).
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of why the client is rejected.
        message: String,
    },

    /// The `grant_type` form field names a grant this server does not issue.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The resolved identity is locked or marked for removal.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// An error occurred while reading or writing flow state.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The directory-backed claims gatherer failed.
    #[error("Directory error: {message}")]
    Directory {
        /// Description of the directory error.
        message: String,
    },

    /// The configuration is invalid (unreadable signing key, bad scope set).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Directory` error.
    #[must_use]
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. }
                | Self::InvalidScope { .. }
                | Self::UnauthorizedClient { .. }
                | Self::UnsupportedGrantType { .. }
                | Self::AccessDenied { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns the error category for logging and monitoring.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::InvalidScope { .. } => ErrorCategory::Authorization,
            Self::UnauthorizedClient { .. } => ErrorCategory::Authentication,
            Self::UnsupportedGrantType { .. } => ErrorCategory::Validation,
            Self::AccessDenied { .. } => ErrorCategory::Authorization,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Directory { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code carried on the wire.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::AccessDenied { .. } => "access_denied",
            Self::Storage { .. } => "server_error",
            Self::Directory { .. } => "server_error",
            Self::Configuration { .. } => "server_error",
            Self::Internal { .. } => "server_error",
        }
    }

    /// Returns the HTTP status for a JSON (token-endpoint) rendering.
    ///
    /// Client errors are 400 per RFC 6749 §5.2; server-side failures are 500.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        if self.is_client_error() { 400 } else { 500 }
    }
}

/// Result alias used throughout the crate.
pub type AuthResult<T> = Result<T, AuthError>;

/// Categories of authorization errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Client identity verification errors.
    Authentication,
    /// Permission and scope errors.
    Authorization,
    /// Request validation errors.
    Validation,
    /// Storage and directory errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::unauthorized_client("client not found");
        assert_eq!(err.to_string(), "Unauthorized client: client not found");

        let err = AuthError::invalid_request("authorization code already consumed");
        assert_eq!(
            err.to_string(),
            "Invalid request: authorization code already consumed"
        );

        let err = AuthError::unsupported_grant_type("password");
        assert_eq!(err.to_string(), "Unsupported grant type: password");
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::unauthorized_client("test");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());

        let err = AuthError::storage("store down");
        assert!(!err.is_client_error());
        assert!(err.is_server_error());

        let err = AuthError::access_denied("account locked");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_oauth_error_code() {
        assert_eq!(
            AuthError::invalid_request("test").oauth_error_code(),
            "invalid_request"
        );
        assert_eq!(
            AuthError::invalid_scope("test").oauth_error_code(),
            "invalid_scope"
        );
        assert_eq!(
            AuthError::unauthorized_client("test").oauth_error_code(),
            "unauthorized_client"
        );
        assert_eq!(
            AuthError::unsupported_grant_type("test").oauth_error_code(),
            "unsupported_grant_type"
        );
        assert_eq!(
            AuthError::access_denied("test").oauth_error_code(),
            "access_denied"
        );
        assert_eq!(
            AuthError::storage("test").oauth_error_code(),
            "server_error"
        );
        assert_eq!(
            AuthError::directory("test").oauth_error_code(),
            "server_error"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(AuthError::invalid_request("test").http_status(), 400);
        assert_eq!(AuthError::access_denied("test").http_status(), 400);
        assert_eq!(AuthError::internal("test").http_status(), 500);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::unauthorized_client("test").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::invalid_scope("test").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            AuthError::storage("test").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
    }
}
