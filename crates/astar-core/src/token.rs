use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const BEARER: &str = "Bearer";

/// Upper bound on `expires_in` accepted from a server (ten years).
pub const MAX_EXPIRES_IN: u64 = 10 * 365 * 24 * 3600;

/// Wire shape returned by the login and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

fn default_token_type() -> String {
    BEARER.to_string()
}

/// A credential pair held by a client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    pub fn from_response(resp: TokenResponse, now: DateTime<Utc>) -> Self {
        let ttl = chrono::Duration::seconds(resp.expires_in.min(MAX_EXPIRES_IN) as i64);
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            token_type: resp.token_type,
            expires_at: now + ttl,
        }
    }

    /// Remaining lifetime of the access token; zero once expired.
    pub fn expires_in(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// True when the access token expires within `skew` of `now`.
    pub fn is_expiring(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_in(now) <= skew
    }
}

/// When to proactively refresh a freshly issued access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Refresh this long before the token expires.
    pub skew: Duration,
    /// Never schedule a refresh sooner than this.
    pub floor: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            skew: Duration::from_secs(120),
            floor: Duration::from_secs(30),
        }
    }
}

impl RefreshPolicy {
    pub fn new(skew: Duration, floor: Duration) -> Self {
        Self { skew, floor }
    }

    /// `max(expires_in - skew, floor)` with saturating subtraction.
    pub fn delay_for(&self, expires_in: Duration) -> Duration {
        expires_in.saturating_sub(self.skew).max(self.floor)
    }
}
