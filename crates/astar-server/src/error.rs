use astar_core::AstarError;
use axum::extract::rejection::JsonRejection;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 Bad Request errors
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain for input
/// problems that have no `AstarError` variant.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    /// A request body that is not valid JSON or misses a required field.
    pub fn invalid_json(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }

    /// Construct a 401 for a missing or unusable bearer token.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(AstarError::InvalidToken(msg.into()).into())
    }

    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<BadRequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        match self.0.downcast_ref::<AstarError>() {
            Some(e) => match e {
                AstarError::InvalidCredentials
                | AstarError::InvalidToken(_)
                | AstarError::TokenExpired => StatusCode::UNAUTHORIZED,
                AstarError::Forbidden(_) => StatusCode::FORBIDDEN,
                AstarError::InvalidPermission(_) | AstarError::InvalidRoleName(_) => {
                    StatusCode::BAD_REQUEST
                }
                AstarError::RoleNotFound(_) | AstarError::UserNotFound(_) => StatusCode::NOT_FOUND,
                AstarError::ConfigNotFound(_)
                | AstarError::DuplicateRole(_)
                | AstarError::UnknownParent { .. }
                | AstarError::RoleCycle(_)
                | AstarError::MissingSigningSecret
                | AstarError::PasswordHash(_)
                | AstarError::Io(_)
                | AstarError::Yaml(_)
                | AstarError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        if status == StatusCode::UNAUTHORIZED {
            return (
                status,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                axum::Json(body),
            )
                .into_response();
        }
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
