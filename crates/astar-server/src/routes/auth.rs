use astar_core::{AstarError, Subject, TokenResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginBody {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct RefreshBody {
    refresh_token: String,
}

/// POST /api/auth/login: exchange a username and password for tokens.
///
/// Unknown users, wrong passwords and disabled accounts all produce the same
/// 401 so the response does not reveal which usernames exist.
pub async fn login(
    State(app): State<AppState>,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Json(body) = payload.map_err(AppError::invalid_json)?;
    let user = app
        .config
        .find_user(&body.username)
        .filter(|u| u.check_password(&body.password))
        .ok_or(AstarError::InvalidCredentials)?;

    let tokens = app.issue_tokens(user, None, Utc::now()).await?;
    info!(username = %user.username, tenant = %user.tenant, "login");
    Ok(Json(tokens))
}

/// POST /api/auth/refresh: rotate a refresh token into a fresh token pair.
pub async fn refresh(
    State(app): State<AppState>,
    payload: Result<Json<RefreshBody>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Json(body) = payload.map_err(AppError::invalid_json)?;
    let now = Utc::now();
    let record = app.refresh_tokens.rotate(&body.refresh_token, now).await?;

    let user = app
        .config
        .find_user(&record.username)
        .filter(|u| !u.disabled)
        .ok_or_else(|| AstarError::InvalidToken("account is no longer active".into()))?;

    let tokens = app.issue_tokens(user, Some(record.family), now).await?;
    info!(username = %user.username, "refresh");
    Ok(Json(tokens))
}

/// POST /api/auth/logout: revoke the refresh token's family. Idempotent.
pub async fn logout(
    State(app): State<AppState>,
    payload: Result<Json<RefreshBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(body) = payload.map_err(AppError::invalid_json)?;
    if app.refresh_tokens.revoke(&body.refresh_token).await {
        info!("logout");
    }
    Ok(Json(serde_json::json!({ "status": "logged_out" })))
}

/// GET /api/auth/me: the authenticated subject and its effective permissions.
pub async fn me(
    State(app): State<AppState>,
    Extension(subject): Extension<Subject>,
) -> Json<serde_json::Value> {
    let permissions = app.evaluator.effective_for(&subject).to_strings();
    Json(serde_json::json!({
        "username": subject.user_id,
        "tenant": subject.tenant,
        "roles": subject.roles,
        "permissions": permissions,
    }))
}
