//! OpenID Connect userinfo endpoint.
//!
//! Serves claims for the bearer of an access token carrying the
//! internal userinfo audience and the `openid` scope. The identity is
//! reconstructed entirely from the access token claims; the ID token is
//! never needed here.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::{AppState, request_context};
use crate::scopes::ScopeSet;
use crate::types::identity::AuthMethod;
use crate::types::ResolvedIdentity;

/// Handler for `GET|POST /userinfo`.
pub async fn userinfo_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = request_context(&headers);

    let Some(token) = bearer_token(&headers) else {
        return unauthorized("invalid_request", "missing bearer token");
    };

    let claims: Value = match state
        .issuer
        .signer()
        .verify(crate::token::jwt::TokenKind::Access, token)
    {
        Ok(data) => data.claims,
        Err(e) => {
            tracing::debug!(request_id = %ctx.request_id, error = %e, "userinfo token rejected");
            return unauthorized("invalid_token", "token verification failed");
        }
    };

    if claims.get("aud").and_then(Value::as_str)
        != Some(state.config.oauth.internal_audience.as_str())
    {
        return unauthorized("invalid_token", "wrong token audience");
    }

    let scopes = ScopeSet::parse(claims.get("scope").and_then(Value::as_str).unwrap_or(""));
    if !scopes.contains("openid") {
        return forbidden("insufficient_scope", "openid scope required");
    }

    let Some(identity) = identity_from_claims(&claims) else {
        return unauthorized("invalid_token", "token carries no user identity");
    };

    let mut body = match state.directory.claims_for_scopes(&identity, &scopes).await {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(request_id = %ctx.request_id, error = %e, "claims lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "server_error"})),
            )
                .into_response();
        }
    };
    body.insert("sub".to_string(), Value::from(identity.subject.clone()));

    Json(Value::Object(body)).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Rebuilds the resolved identity the access token was issued for.
fn identity_from_claims(claims: &Value) -> Option<ResolvedIdentity> {
    // Machine tokens have no organisation/amr claims and fail here.
    let subject = claims.get("sub")?.as_str()?;
    let organisation = claims.get("organisation")?.as_str()?;
    let directory_ref = claims.get("directory_ref")?.as_str()?;
    let method = claims
        .get("amr")?
        .as_array()?
        .first()?
        .as_str()
        .and_then(AuthMethod::from_amr_value)?;
    let auth_time = claims.get("auth_time")?.as_i64()?;
    Some(ResolvedIdentity {
        subject: subject.to_string(),
        directory_ref: directory_ref.to_string(),
        organisation: organisation.to_string(),
        method,
        auth_time: OffsetDateTime::from_unix_timestamp(auth_time).ok()?,
    })
}

fn unauthorized(error: &str, description: &str) -> Response {
    bearer_challenge(StatusCode::UNAUTHORIZED, error, description)
}

fn forbidden(error: &str, description: &str) -> Response {
    bearer_challenge(StatusCode::FORBIDDEN, error, description)
}

fn bearer_challenge(status: StatusCode, error: &str, description: &str) -> Response {
    let challenge = format!("Bearer error=\"{error}\", error_description=\"{description}\"");
    let mut body = Map::new();
    body.insert("error".to_string(), Value::from(error));
    (status, [("WWW-Authenticate", challenge)], Json(Value::Object(body))).into_response()
}
