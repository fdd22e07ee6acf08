use thiserror::Error;

/// Errors surfaced by the client.
///
/// `Clone` because one refresh result is handed to every caller that joined
/// it; underlying transport errors are carried as strings for that reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("no active session: run 'astar login' first")]
    NoSession,

    #[error("rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("session ended while a refresh was in flight")]
    SessionEnded,

    #[error("refresh task failed: {0}")]
    TaskFailed(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Local(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::InvalidResponse(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::InvalidResponse(e.to_string())
    }
}

impl From<astar_core::AstarError> for ClientError {
    fn from(e: astar_core::AstarError) -> Self {
        use astar_core::AstarError;
        match e {
            AstarError::Io(e) => ClientError::Io(e.to_string()),
            AstarError::Json(e) => ClientError::InvalidResponse(e.to_string()),
            AstarError::InvalidCredentials
            | AstarError::InvalidToken(_)
            | AstarError::TokenExpired => ClientError::Rejected {
                status: 401,
                message: e.to_string(),
            },
            AstarError::Forbidden(_) => ClientError::Rejected {
                status: 403,
                message: e.to_string(),
            },
            other => ClientError::Local(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astar_core::AstarError;

    #[test]
    fn core_errors_map_by_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        assert!(matches!(ClientError::from(AstarError::Io(io)), ClientError::Io(_)));

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            ClientError::from(AstarError::Json(json)),
            ClientError::InvalidResponse(_)
        ));

        assert!(matches!(
            ClientError::from(AstarError::TokenExpired),
            ClientError::Rejected { status: 401, .. }
        ));
        assert!(matches!(
            ClientError::from(AstarError::Forbidden("role:read".into())),
            ClientError::Rejected { status: 403, .. }
        ));
        assert_eq!(
            ClientError::from(AstarError::RoleNotFound("partner".into())),
            ClientError::Local("role not found: partner".into())
        );
    }
}
