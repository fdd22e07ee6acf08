use astar_core::{AccessRequest, Action, AstarError, Permission, Resource, Scope, Subject};
use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::error::AppError;
use crate::state::AppState;

fn require_role_read(app: &AppState, subject: &Subject) -> Result<(), AppError> {
    let request = AccessRequest::new(Permission::new(Resource::Role, Action::READ, Scope::Tenant));
    app.evaluator.require(subject, &request)?;
    Ok(())
}

fn role_json(app: &AppState, name: &str) -> Result<serde_json::Value, AppError> {
    let hierarchy = &app.hierarchy;
    let def = hierarchy
        .get(name)
        .ok_or_else(|| AstarError::RoleNotFound(name.to_string()))?;
    let permissions = hierarchy
        .effective(name)
        .map(|set| set.to_strings())
        .unwrap_or_default();
    Ok(serde_json::json!({
        "name": def.name,
        "display_name": def.display_name,
        "parent": def.parent,
        "ancestors": hierarchy.ancestors(name)?,
        "permissions": permissions,
    }))
}

/// GET /api/roles: every role with its parent and effective permissions.
/// Requires `role:read`.
pub async fn list_roles(
    State(app): State<AppState>,
    Extension(subject): Extension<Subject>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_role_read(&app, &subject)?;
    let roles = app
        .hierarchy
        .names()
        .map(|name| role_json(&app, name))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(serde_json::Value::Array(roles)))
}

/// GET /api/roles/{name}: a single role. Requires `role:read`.
pub async fn get_role(
    State(app): State<AppState>,
    Extension(subject): Extension<Subject>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_role_read(&app, &subject)?;
    Ok(Json(role_json(&app, &name)?))
}
