use std::collections::HashMap;

use astar_core::AstarError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tokio::sync::Mutex;
use tracing::warn;

/// An outstanding refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    pub username: String,
    /// Shared by every token rotated out of the same login.
    pub family: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tokens {
    active: HashMap<String, RefreshRecord>,
    /// Already-rotated tokens, kept until expiry to detect reuse.
    rotated: HashMap<String, RefreshRecord>,
}

impl Tokens {
    fn revoke_family(&mut self, family: &str) -> usize {
        let before = self.active.len();
        self.active.retain(|_, r| r.family != family);
        before - self.active.len()
    }
}

/// In-memory store of opaque, single-use refresh tokens.
///
/// Each refresh rotates the token: the presented one is retired and a new
/// one is issued in the same family. Presenting a retired token again
/// revokes the whole family.
pub struct RefreshTokenStore {
    ttl: Duration,
    tokens: Mutex<Tokens>,
}

impl RefreshTokenStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs.min(astar_core::token::MAX_EXPIRES_IN) as i64),
            tokens: Mutex::new(Tokens::default()),
        }
    }

    /// Issue a token for `username`, starting a new family when `family` is `None`.
    pub async fn issue(&self, username: &str, family: Option<String>, now: DateTime<Utc>) -> String {
        let token = generate_token();
        let record = RefreshRecord {
            username: username.to_string(),
            family: family.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            expires_at: now + self.ttl,
        };
        self.tokens.lock().await.active.insert(token.clone(), record);
        token
    }

    /// Retire `token` and return its record.
    pub async fn rotate(&self, token: &str, now: DateTime<Utc>) -> Result<RefreshRecord, AstarError> {
        let mut tokens = self.tokens.lock().await;
        if let Some(record) = tokens.active.remove(token) {
            if record.expires_at <= now {
                return Err(AstarError::TokenExpired);
            }
            tokens.rotated.insert(token.to_string(), record.clone());
            return Ok(record);
        }
        if let Some(record) = tokens.rotated.get(token).cloned() {
            let revoked = tokens.revoke_family(&record.family);
            warn!(
                username = %record.username,
                revoked,
                "refresh token reuse detected; family revoked"
            );
            return Err(AstarError::InvalidToken("refresh token reuse detected".into()));
        }
        Err(AstarError::InvalidToken("unknown refresh token".into()))
    }

    /// Revoke the family `token` belongs to. Returns false for unknown tokens.
    pub async fn revoke(&self, token: &str) -> bool {
        let mut tokens = self.tokens.lock().await;
        let family = tokens
            .active
            .get(token)
            .or_else(|| tokens.rotated.get(token))
            .map(|r| r.family.clone());
        match family {
            Some(family) => {
                tokens.revoke_family(&family);
                true
            }
            None => false,
        }
    }

    /// Drop expired active and retired tokens.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut tokens = self.tokens.lock().await;
        let before = tokens.active.len() + tokens.rotated.len();
        tokens.active.retain(|_, r| r.expires_at > now);
        tokens.rotated.retain(|_, r| r.expires_at > now);
        before - tokens.active.len() - tokens.rotated.len()
    }

    pub async fn active_count(&self) -> usize {
        self.tokens.lock().await.active.len()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
