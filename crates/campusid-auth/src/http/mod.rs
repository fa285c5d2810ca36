//! HTTP surface of the authorization subsystem.
//!
//! Axum handlers for the four OAuth/OIDC endpoints plus the JWKS
//! document. This layer is the single boundary turning an [`AuthError`]
//! into a wire shape: in-page HTML before the redirect_uri is trusted,
//! an RFC 6749 redirect after, and JSON everywhere on `/token`.

pub mod authorize;
pub mod jwks;
pub mod token;
pub mod userinfo;

use std::net::IpAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderMap;
use axum::routing::{get, post};

use crate::audit::{AuditRecorder, AuditSink};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::oauth::assertion::AssertionVerifier;
use crate::oauth::client_auth::ClientAuthenticator;
use crate::oauth::credentials::CredentialsService;
use crate::oauth::exchange::ExchangeService;
use crate::oauth::resolver::SessionResolver;
use crate::oauth::response::ResponseGenerator;
use crate::oauth::validator::AuthorizeService;
use crate::storage::client::ClientRegistry;
use crate::storage::directory::IdentityDirectory;
use crate::storage::flow::FlowStore;
use crate::storage::session::SsoSessionStore;
use crate::token::issuer::TokenIssuer;
use crate::types::context::RequestContext;

/// Name of the SSO session cookie.
pub const SESSION_COOKIE: &str = "campusid_session";

/// How long client assertions may claim to live.
const ASSERTION_MAX_LIFETIME: std::time::Duration = std::time::Duration::from_secs(300);

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<AuthConfig>,
    /// Stage 1 and 2 of the login flow.
    pub authorize: Arc<AuthorizeService>,
    /// Authorization code redemption.
    pub exchange: Arc<ExchangeService>,
    /// Client credentials grant.
    pub credentials: Arc<CredentialsService>,
    /// Token signing, also serves the JWKS.
    pub issuer: Arc<TokenIssuer>,
    /// Claims gatherer for userinfo.
    pub directory: Arc<dyn IdentityDirectory>,
}

impl AppState {
    /// Wires the services over the given storage backends.
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        registry: Arc<dyn ClientRegistry>,
        flow_store: Arc<dyn FlowStore>,
        sessions: Arc<dyn SsoSessionStore>,
        directory: Arc<dyn IdentityDirectory>,
        audit_sink: Arc<dyn AuditSink>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        let audit = Arc::new(AuditRecorder::new(&config.audit, audit_sink));
        let verifier = AssertionVerifier::new(
            config.issuer.clone(),
            ASSERTION_MAX_LIFETIME,
            flow_store.clone(),
        );
        let authenticator = Arc::new(ClientAuthenticator::new(registry.clone(), verifier));

        let resolver =
            SessionResolver::new(config.clone(), sessions.clone(), directory.clone());
        let responder =
            ResponseGenerator::new(config.clone(), flow_store.clone(), sessions.clone());
        let authorize = Arc::new(AuthorizeService::new(
            config.clone(),
            registry,
            flow_store.clone(),
            resolver,
            responder,
        ));

        let exchange = Arc::new(ExchangeService::new(
            config.clone(),
            flow_store,
            directory.clone(),
            authenticator.clone(),
            issuer.clone(),
            audit.clone(),
        ));
        let credentials = Arc::new(CredentialsService::new(
            config.clone(),
            authenticator,
            issuer.clone(),
            audit,
        ));

        Self {
            config,
            authorize,
            exchange,
            credentials,
            issuer,
            directory,
        }
    }
}

/// Builds the router for the authorization endpoints.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/authorize",
            get(authorize::authorize_handler).post(authorize::authorize_form_handler),
        )
        .route(
            "/authorize/response",
            get(authorize::authorize_response_handler),
        )
        .route("/token", post(token::token_handler))
        .route(
            "/userinfo",
            get(userinfo::userinfo_handler).post(userinfo::userinfo_handler),
        )
        .route("/.well-known/jwks.json", get(jwks::jwks_handler))
        .with_state(state)
}

/// Builds the per-request context from the incoming headers.
///
/// The remote address is taken from `X-Forwarded-For` when a proxy
/// supplies one; the subsystem itself never terminates TCP.
pub(crate) fn request_context(headers: &HeaderMap) -> RequestContext {
    let remote_addr = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());
    match remote_addr {
        Some(addr) => RequestContext::new().with_remote_addr(addr),
        None => RequestContext::new(),
    }
}

/// Renders the generic in-page error shown before a redirect target is
/// trusted. Detail is logged, never shown.
pub(crate) fn page_error(error: &AuthError, ctx: &RequestContext) -> (axum::http::StatusCode, axum::response::Html<String>) {
    tracing::info!(
        request_id = %ctx.request_id,
        error = %error,
        "rendering in-page authorization error"
    );
    let status = axum::http::StatusCode::from_u16(error.http_status())
        .unwrap_or(axum::http::StatusCode::BAD_REQUEST);
    let body = format!(
        "<!DOCTYPE html><html><head><title>Authorization error</title></head>\
         <body><h1>Authorization error</h1>\
         <p>The authorization request could not be processed.</p>\
         <p>Reference: {}</p></body></html>",
        ctx.request_id
    );
    (status, axum::response::Html(body))
}
