//! OAuth 2.0 / OpenID Connect authorization for the CampusID identity
//! provider.
//!
//! Implements the interactive authorization-code flow (with SSO session
//! reuse and an external login/MFA frontend), the client-credentials
//! flow for machine clients, multi-scheme client authentication (shared
//! secret or signed assertion against a PEM key or JWK set), scope
//! negotiation, and signed token issuance.
//!
//! Storage is abstracted behind the traits in [`storage`]; see the
//! `campusid-store-memory` crate for the in-memory backend.
//!
//! # Architecture
//!
//! The login flow runs in three stages coordinated exclusively through
//! the flow store, so any stage may be served by any process instance:
//!
//! 1. `GET|POST /authorize` validates the request and parks it as a
//!    [`oauth::PendingAuthorization`].
//! 2. `GET /authorize/response` consumes the login frontend's completion
//!    and redirects back to the client with a single-use code.
//! 3. `POST /token` redeems the code (or exercises the
//!    client-credentials grant) for signed tokens.

pub mod audit;
pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod scopes;
pub mod secret;
pub mod storage;
pub mod token;
pub mod types;

pub use audit::{AuditRecord, AuditRecorder, AuditSink};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, AuthResult, ErrorCategory};
pub use scopes::{GrantFamily, NegotiatedScopes, ScopeNegotiator, ScopeSet};
pub use types::{
    AuthMethod, AuthType, AuthenticationRecord, Client, ClientFirewall, ClientKind,
    LoginCompletion, RequestContext, ResolvedIdentity,
};
