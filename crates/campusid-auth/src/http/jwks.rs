//! JWKS endpoint handler.
//!
//! Publishes the server's public signing keys at
//! `/.well-known/jwks.json` so resource servers can verify tokens
//! without a shared secret.

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use super::AppState;

/// Handler for `GET /.well-known/jwks.json`.
pub async fn jwks_handler(State(state): State<AppState>) -> impl IntoResponse {
    let jwks = state.issuer.signer().jwks();
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Json(jwks),
    )
}
