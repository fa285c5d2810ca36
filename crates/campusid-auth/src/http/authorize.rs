//! Authorization endpoint handlers.
//!
//! `GET|POST /authorize` starts the flow; `GET /authorize/response` is
//! where the browser returns once the external login frontend has
//! finished. The SSO cookie is read on the way in and set on the way out.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use super::{AppState, SESSION_COOKIE, page_error, request_context};
use crate::error::AuthError;
use crate::oauth::authorize::{AuthorizationRequest, AuthorizeOutcome};
use crate::types::context::RequestContext;

/// Handler for `GET /authorize`.
pub async fn authorize_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(request): Query<AuthorizationRequest>,
) -> Response {
    begin(&state, &headers, jar, request).await
}

/// Handler for `POST /authorize` (form-encoded parameters).
pub async fn authorize_form_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(request): Form<AuthorizationRequest>,
) -> Response {
    begin(&state, &headers, jar, request).await
}

async fn begin(
    state: &AppState,
    headers: &HeaderMap,
    jar: CookieJar,
    request: AuthorizationRequest,
) -> Response {
    let ctx = request_context(headers);
    let session_token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());

    let outcome = state
        .authorize
        .begin(&request, session_token.as_deref(), &ctx)
        .await;
    render_outcome(state, outcome, jar, &ctx)
}

/// Query parameters of the stage-2 continuation.
#[derive(Debug, Deserialize)]
pub struct ContinuationParams {
    /// The pending request key handed to the login frontend.
    #[serde(default)]
    pub request: Option<String>,
}

/// Handler for `GET /authorize/response`.
///
/// The login frontend redirects the browser here after recording its
/// completion; the key identifies the pending authorization.
pub async fn authorize_response_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<ContinuationParams>,
) -> Response {
    let ctx = request_context(&headers);
    let Some(pending_key) = params.request.as_deref() else {
        return page_error(&AuthError::invalid_request("request key is required"), &ctx)
            .into_response();
    };

    let outcome = state.authorize.resume(pending_key, &ctx).await;
    render_outcome(&state, outcome, jar, &ctx)
}

fn render_outcome(
    state: &AppState,
    outcome: AuthorizeOutcome,
    jar: CookieJar,
    ctx: &RequestContext,
) -> Response {
    match outcome {
        AuthorizeOutcome::LoginRedirect { url } => Redirect::to(&url).into_response(),
        AuthorizeOutcome::CodeRedirect { url, session_token } => {
            let jar = match session_token {
                Some(token) => jar.add(session_cookie(state, token)),
                None => jar,
            };
            (jar, Redirect::to(&url)).into_response()
        }
        AuthorizeOutcome::PageError { error } => page_error(&error, ctx).into_response(),
        AuthorizeOutcome::RedirectError { url } => Redirect::to(&url).into_response(),
    }
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let secure = state.config.issuer.starts_with("https://");
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(
            time::Duration::try_from(state.config.session.lifetime)
                .unwrap_or(time::Duration::hours(8)),
        )
        .build()
}
