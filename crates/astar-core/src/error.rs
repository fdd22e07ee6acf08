use thiserror::Error;

#[derive(Debug, Error)]
pub enum AstarError {
    #[error("config not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid permission '{0}': expected resource:action[,action][:scope]")]
    InvalidPermission(String),

    #[error("invalid role name '{0}': must be lowercase alphanumeric with hyphens or underscores")]
    InvalidRoleName(String),

    #[error("role not found: {0}")]
    RoleNotFound(String),

    #[error("duplicate role: {0}")]
    DuplicateRole(String),

    #[error("role '{role}' has unknown parent '{parent}'")]
    UnknownParent { role: String, parent: String },

    #[error("role hierarchy cycle: {0}")]
    RoleCycle(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("signing secret is not configured")]
    MissingSigningSecret,

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AstarError>;
