use std::sync::Arc;
use std::time::Duration;

use astar_core::config::UserRecord;
use astar_core::jwt::{Claims, TokenSigner};
use astar_core::token::BEARER;
use astar_core::{Config, PermissionEvaluator, RoleHierarchy, TokenResponse};
use chrono::{DateTime, Utc};

use crate::refresh_store::RefreshTokenStore;

const PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hierarchy: Arc<RoleHierarchy>,
    pub evaluator: PermissionEvaluator,
    pub signer: TokenSigner,
    pub refresh_tokens: Arc<RefreshTokenStore>,
}

impl AppState {
    /// Build state from config, resolving the signing secret from
    /// `ASTAR_SIGNING_SECRET` or the config file.
    pub fn new(config: Config) -> astar_core::Result<Self> {
        let secret = config.auth.signing_secret()?;
        Self::with_secret(config, &secret)
    }

    pub fn with_secret(config: Config, secret: &str) -> astar_core::Result<Self> {
        let hierarchy = Arc::new(config.role_hierarchy()?);
        let signer = TokenSigner::new(config.auth.issuer.clone(), secret)?;
        let refresh_tokens = Arc::new(RefreshTokenStore::new(config.auth.refresh_token_ttl_secs));

        // Periodically drop expired refresh tokens.
        // Guard: only spawn if inside a Tokio runtime (skipped in sync unit tests).
        if tokio::runtime::Handle::try_current().is_ok() {
            let store = Arc::downgrade(&refresh_tokens);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(PURGE_INTERVAL);
                tick.tick().await;
                loop {
                    tick.tick().await;
                    let Some(store) = store.upgrade() else { break };
                    let purged = store.purge_expired(Utc::now()).await;
                    if purged > 0 {
                        tracing::debug!(purged, "purged expired refresh tokens");
                    }
                }
            });
        }

        Ok(Self {
            config: Arc::new(config),
            evaluator: PermissionEvaluator::new(hierarchy.clone()),
            hierarchy,
            signer,
            refresh_tokens,
        })
    }

    /// Sign an access token and issue a refresh token for `user`.
    /// `family` continues an existing rotation chain.
    pub async fn issue_tokens(
        &self,
        user: &UserRecord,
        family: Option<String>,
        now: DateTime<Utc>,
    ) -> astar_core::Result<TokenResponse> {
        let ttl = self.config.auth.access_token_ttl_secs;
        let claims = Claims::new(
            self.signer.issuer(),
            &user.username,
            &user.tenant,
            user.roles.clone(),
            now,
            ttl,
        );
        let access_token = self.signer.sign(&claims)?;
        let refresh_token = self.refresh_tokens.issue(&user.username, family, now).await;
        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: BEARER.to_string(),
            expires_in: ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_requires_secret() {
        let err = AppState::with_secret(Config::default(), "").err().unwrap();
        assert!(matches!(err, astar_core::AstarError::MissingSigningSecret));
    }

    #[test]
    fn default_config_uses_builtin_roles() {
        let state = AppState::with_secret(Config::default(), "test-secret").unwrap();
        assert!(state.hierarchy.contains("owner"));
        assert!(state.hierarchy.inherits("owner", "client"));
    }

    #[tokio::test]
    async fn issued_access_token_verifies() {
        let state = AppState::with_secret(Config::default(), "test-secret").unwrap();
        let user = UserRecord::new("tanaka", "acme", "pw", &["lawyer"]).unwrap();
        let now = Utc::now();
        let tokens = state.issue_tokens(&user, None, now).await.unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 900);
        let claims = state.signer.verify(&tokens.access_token, now).unwrap();
        assert_eq!(claims.sub, "tanaka");
        assert_eq!(claims.tenant, "acme");
        assert_eq!(claims.roles, vec!["lawyer".to_string()]);
        assert_eq!(state.refresh_tokens.active_count().await, 1);
    }
}
