use crate::error::{AstarError, Result};
use crate::password;
use crate::role::{check_definitions, default_roles, RoleDefinition, RoleHierarchy};
use crate::token::RefreshPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "astar.yaml";
pub const SIGNING_SECRET_ENV: &str = "ASTAR_SIGNING_SECRET";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,
    /// Overridden by `ASTAR_SIGNING_SECRET` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,
    #[serde(default = "default_skew")]
    pub refresh_skew_secs: u64,
    #[serde(default = "default_floor")]
    pub refresh_floor_secs: u64,
}

fn default_issuer() -> String {
    "astar".to_string()
}

fn default_access_ttl() -> u64 {
    900
}

fn default_refresh_ttl() -> u64 {
    7 * 24 * 3600
}

fn default_skew() -> u64 {
    120
}

fn default_floor() -> u64 {
    30
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
            signing_secret: None,
            refresh_skew_secs: default_skew(),
            refresh_floor_secs: default_floor(),
        }
    }
}

impl AuthConfig {
    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::new(
            Duration::from_secs(self.refresh_skew_secs),
            Duration::from_secs(self.refresh_floor_secs),
        )
    }

    /// Secret from the environment, falling back to the config file.
    pub fn signing_secret(&self) -> Result<String> {
        self.resolve_signing_secret(std::env::var(SIGNING_SECRET_ENV).ok())
    }

    pub fn resolve_signing_secret(&self, env_override: Option<String>) -> Result<String> {
        env_override
            .filter(|s| !s.is_empty())
            .or_else(|| self.signing_secret.clone().filter(|s| !s.is_empty()))
            .ok_or(AstarError::MissingSigningSecret)
    }
}

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub tenant: String,
    /// Argon2id PHC string, as printed by `astar hash-password`.
    pub password_hash: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl UserRecord {
    pub fn new(username: &str, tenant: &str, plaintext: &str, roles: &[&str]) -> Result<Self> {
        Ok(Self {
            username: username.to_string(),
            tenant: tenant.to_string(),
            password_hash: password::hash_password(plaintext)?,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            disabled: false,
        })
    }

    pub fn check_password(&self, plaintext: &str) -> bool {
        !self.disabled && password::verify_password(plaintext, &self.password_hash)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Empty means the built-in role chain.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleDefinition>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            auth: AuthConfig::default(),
            roles: Vec::new(),
            users: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AstarError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(AstarError::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn role_definitions(&self) -> Vec<RoleDefinition> {
        if self.roles.is_empty() {
            default_roles()
        } else {
            self.roles.clone()
        }
    }

    pub fn role_hierarchy(&self) -> Result<RoleHierarchy> {
        RoleHierarchy::build(self.role_definitions())
    }

    pub fn find_user(&self, username: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.username == username)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        self.validate_with_secret(std::env::var(SIGNING_SECRET_ENV).ok())
    }

    pub fn validate_with_secret(&self, env_secret: Option<String>) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let auth = &self.auth;

        // 1. Signing secret
        match auth.resolve_signing_secret(env_secret) {
            Err(_) => warnings.push(ConfigWarning::error(format!(
                "no signing secret: set auth.signing_secret or {SIGNING_SECRET_ENV}"
            ))),
            Ok(secret) if secret.len() < 32 => warnings.push(ConfigWarning::warning(format!(
                "signing secret is {} bytes; use at least 32",
                secret.len()
            ))),
            Ok(_) => {}
        }

        // 2. Token lifetimes
        if auth.access_token_ttl_secs == 0 {
            warnings.push(ConfigWarning::error("auth.access_token_ttl_secs must be > 0"));
        }
        if auth.refresh_token_ttl_secs <= auth.access_token_ttl_secs {
            warnings.push(ConfigWarning::warning(format!(
                "refresh tokens ({}s) do not outlive access tokens ({}s)",
                auth.refresh_token_ttl_secs, auth.access_token_ttl_secs
            )));
        }
        if auth.refresh_floor_secs == 0 {
            warnings.push(ConfigWarning::warning(
                "auth.refresh_floor_secs is 0; short-lived tokens will refresh in a tight loop",
            ));
        }
        if auth.refresh_skew_secs >= auth.access_token_ttl_secs && auth.access_token_ttl_secs > 0 {
            warnings.push(ConfigWarning::warning(format!(
                "refresh skew ({}s) >= access token lifetime ({}s); every refresh waits only the floor",
                auth.refresh_skew_secs, auth.access_token_ttl_secs
            )));
        }

        // 3. Roles
        let role_problems = check_definitions(&self.role_definitions());
        for problem in &role_problems {
            warnings.push(ConfigWarning::error(format!("roles: {problem}")));
        }
        let hierarchy = if role_problems.is_empty() {
            self.role_hierarchy().ok()
        } else {
            None
        };

        // 4. Users
        let mut seen = HashSet::new();
        for user in &self.users {
            if !seen.insert(user.username.as_str()) {
                warnings.push(ConfigWarning::error(format!(
                    "duplicate user '{}'",
                    user.username
                )));
            }
            if user.tenant.trim().is_empty() {
                warnings.push(ConfigWarning::error(format!(
                    "user '{}' has no tenant",
                    user.username
                )));
            }
            if !password::is_recognized(&user.password_hash) {
                warnings.push(ConfigWarning::error(format!(
                    "user '{}' has an unreadable password_hash",
                    user.username
                )));
            } else if password::needs_rehash(&user.password_hash) {
                warnings.push(ConfigWarning::warning(format!(
                    "user '{}' has a legacy SHA-256 password hash; regenerate it with `astar hash-password`",
                    user.username
                )));
            }
            if user.roles.is_empty() {
                warnings.push(ConfigWarning::warning(format!(
                    "user '{}' has no roles and will be denied everything",
                    user.username
                )));
            }
            if let Some(h) = &hierarchy {
                for role in &user.roles {
                    if !h.contains(role) {
                        warnings.push(ConfigWarning::error(format!(
                            "user '{}' references unknown role '{}'",
                            user.username, role
                        )));
                    }
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
