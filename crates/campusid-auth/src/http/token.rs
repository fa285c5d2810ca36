//! Token endpoint handler.
//!
//! `POST /token` with a form-encoded body, dispatched on the closed
//! grant type enum. Success and error responses both carry `no-store`
//! and `no-cache` headers per RFC 6749 §5.1.

use axum::Form;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use super::{AppState, request_context};
use crate::error::{AuthError, AuthResult};
use crate::oauth::token::{GrantType, TokenErrorBody, TokenRequest, TokenResponse};
use crate::types::context::RequestContext;

/// Handler for `POST /token`.
pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Response {
    let ctx = request_context(&headers);
    let basic_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match dispatch(&state, &request, basic_header.as_deref(), &ctx).await {
        Ok(response) => success_response(response),
        Err(error) => {
            tracing::info!(
                request_id = %ctx.request_id,
                grant_type = ?request.grant_type,
                error = %error,
                "token request failed"
            );
            error_response(&state, &error, &ctx)
        }
    }
}

async fn dispatch(
    state: &AppState,
    request: &TokenRequest,
    basic_header: Option<&str>,
    ctx: &RequestContext,
) -> AuthResult<TokenResponse> {
    let grant_type = request
        .grant_type
        .as_deref()
        .ok_or_else(|| AuthError::invalid_request("grant_type is required"))?;

    match GrantType::parse(grant_type)? {
        GrantType::AuthorizationCode => state.exchange.exchange(request, basic_header, ctx).await,
        GrantType::ClientCredentials => state.credentials.issue(request, basic_header, ctx).await,
    }
}

fn success_response(response: TokenResponse) -> Response {
    (
        StatusCode::OK,
        [
            ("Cache-Control", "no-store"),
            ("Pragma", "no-cache"),
        ],
        Json(response),
    )
        .into_response()
}

fn error_response(state: &AppState, error: &AuthError, ctx: &RequestContext) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = TokenErrorBody::from_error(error, ctx.request_id, &state.config.issuer);
    (
        status,
        [
            ("Cache-Control", "no-store"),
            ("Pragma", "no-cache"),
        ],
        Json(body),
    )
        .into_response()
}
