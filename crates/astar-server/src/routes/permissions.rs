use astar_core::{AccessRequest, Decision, Permission, Subject};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CheckBody {
    permission: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    tenant: Option<String>,
}

/// POST /api/permissions/check: evaluate a permission for the caller.
///
/// A denial is a normal `200` with `allowed: false`; only a malformed
/// permission string is an error.
pub async fn check(
    State(app): State<AppState>,
    Extension(subject): Extension<Subject>,
    payload: Result<Json<CheckBody>, JsonRejection>,
) -> Result<Json<Decision>, AppError> {
    let Json(body) = payload.map_err(AppError::invalid_json)?;
    let permission = Permission::parse(&body.permission)?;
    let mut request = AccessRequest::new(permission);
    if let Some(owner) = body.owner {
        request = request.owned_by(owner);
    }
    if let Some(tenant) = body.tenant {
        request = request.in_tenant(tenant);
    }
    Ok(Json(app.evaluator.evaluate(&subject, &request)))
}
