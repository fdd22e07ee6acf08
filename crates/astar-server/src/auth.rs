use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use astar_core::Subject;
use chrono::Utc;
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

/// Axum middleware that admits only requests carrying a valid access token.
///
/// Auth flow:
/// 1. `Authorization: Bearer <token>` missing or malformed → 401
/// 2. Signature, issuer or expiry check fails → 401
/// 3. Otherwise the token's [`Subject`] is inserted into request extensions
///    for handlers to pick up with `Extension<Subject>`.
pub async fn require_auth(State(app): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        return AppError::unauthorized("missing bearer token").into_response();
    };

    match app.signer.verify(&token, Utc::now()) {
        Ok(claims) => {
            req.extensions_mut().insert(Subject {
                user_id: claims.sub,
                tenant: claims.tenant,
                roles: claims.roles,
            });
            next.run(req).await
        }
        Err(e) => {
            debug!(error = %e, path = %req.uri().path(), "rejected access token");
            AppError::from(e).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
