//! OAuth 2.0 / OpenID Connect flows.
//!
//! The interactive login flow runs in three stages coordinated through
//! the flow store: validation ([`validator`]), identity resolution
//! ([`resolver`]) with response generation ([`response`]), and code
//! exchange ([`exchange`]). Machine clients use [`credentials`] instead.

pub mod assertion;
pub mod authorize;
pub mod client_auth;
pub mod credentials;
pub mod exchange;
pub mod pending;
pub mod resolver;
pub mod response;
pub mod token;
pub mod validator;

pub use assertion::{AssertionVerifier, JWT_BEARER_ASSERTION_TYPE};
pub use authorize::{AuthorizationRequest, AuthorizeOutcome};
pub use client_auth::{AuthenticatedClient, ClientAuthScheme, ClientAuthenticator};
pub use credentials::CredentialsService;
pub use exchange::ExchangeService;
pub use pending::{FlowStage, PendingAuthorization};
pub use resolver::SessionResolver;
pub use response::ResponseGenerator;
pub use token::{GrantType, TokenErrorBody, TokenRequest, TokenResponse};
pub use validator::AuthorizeService;
