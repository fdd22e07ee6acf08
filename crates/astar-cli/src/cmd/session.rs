use crate::output::print_json;
use anyhow::{anyhow, Context, Result};
use astar_client::{
    AuthorizedClient, ClientError, HttpTokenEndpoint, Session, SessionStore, StoredSession,
};
use astar_core::{Config, Credentials};
use chrono::Utc;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A stored session reopened for one command.
struct Opened {
    store: SessionStore,
    server: String,
    endpoint: HttpTokenEndpoint,
    session: Session,
    rt: tokio::runtime::Runtime,
}

impl Opened {
    fn open(config_path: &Path, session_dir: &Path) -> Result<Self> {
        let store = SessionStore::new(session_dir);
        let stored = store
            .load()
            .ok_or_else(|| anyhow!("not logged in; run `astar login` first"))?;
        let policy = Config::load_or_default(config_path)
            .context("failed to load config")?
            .auth
            .refresh_policy();

        let rt = tokio::runtime::Runtime::new()?;
        let endpoint = HttpTokenEndpoint::new(stored.server.clone());
        let session = Session::new(Arc::new(endpoint.clone()), policy);
        {
            // The proactive refresh timer is spawned onto this runtime.
            let _guard = rt.enter();
            session.login(stored.credentials);
        }
        Ok(Self {
            store,
            server: stored.server,
            endpoint,
            session,
            rt,
        })
    }

    /// Write back whatever the session holds now; a session ended by a
    /// rejected refresh clears the file.
    fn persist(&self) -> Result<()> {
        match self.session.credentials() {
            Some(credentials) => self.store.save(&StoredSession {
                server: self.server.clone(),
                credentials,
            })?,
            None => self.store.clear()?,
        }
        Ok(())
    }

    /// Run `op`, persist the session, and explain a rejected session.
    fn run<T>(&self, op: impl Future<Output = astar_client::Result<T>>) -> Result<T> {
        let result = self.rt.block_on(op);
        self.persist()?;
        result.map_err(|e| match e {
            ClientError::Rejected { status: 401, .. } | ClientError::NoSession => {
                anyhow!("{e}; session expired, run `astar login` again")
            }
            other => other.into(),
        })
    }
}

fn print_credentials(credentials: &Credentials, server: &str, json: bool) -> Result<()> {
    if json {
        print_json(&serde_json::json!({
            "server": server,
            "token_type": credentials.token_type,
            "expires_at": credentials.expires_at,
        }))
    } else {
        let remaining = credentials.expires_in(Utc::now()).as_secs();
        println!(
            "Session for {server}; access token expires at {} ({remaining}s)",
            credentials.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// login
// ---------------------------------------------------------------------------

pub fn login(
    session_dir: &Path,
    server: &str,
    username: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow!("password required: pass --password or set ASTAR_PASSWORD"))?;
    let endpoint = HttpTokenEndpoint::new(server);
    let rt = tokio::runtime::Runtime::new()?;
    let tokens = rt
        .block_on(endpoint.login(username, &password))
        .with_context(|| format!("login to {} failed", endpoint.base_url()))?;

    let credentials = Credentials::from_response(tokens, Utc::now());
    let store = SessionStore::new(session_dir);
    store.save(&StoredSession {
        server: endpoint.base_url().to_string(),
        credentials: credentials.clone(),
    })?;

    if !json {
        println!("Logged in as {username}.");
    }
    print_credentials(&credentials, endpoint.base_url(), json)
}

// ---------------------------------------------------------------------------
// refresh
// ---------------------------------------------------------------------------

pub fn refresh(config_path: &Path, session_dir: &Path, json: bool) -> Result<()> {
    let opened = Opened::open(config_path, session_dir)?;
    let credentials = opened.run(opened.session.refresh())?;
    print_credentials(&credentials, &opened.server, json)
}

// ---------------------------------------------------------------------------
// logout
// ---------------------------------------------------------------------------

pub fn logout(session_dir: &Path) -> Result<()> {
    let store = SessionStore::new(session_dir);
    let Some(stored) = store.load() else {
        println!("Not logged in.");
        return Ok(());
    };

    let endpoint = HttpTokenEndpoint::new(stored.server.clone());
    let rt = tokio::runtime::Runtime::new()?;
    if let Err(e) = rt.block_on(endpoint.logout(&stored.credentials.refresh_token)) {
        warn!(error = %e, server = %stored.server, "server logout failed; clearing local session anyway");
    }
    store.clear()?;
    println!("Logged out.");
    Ok(())
}

// ---------------------------------------------------------------------------
// whoami
// ---------------------------------------------------------------------------

pub fn whoami(config_path: &Path, session_dir: &Path, json: bool) -> Result<()> {
    let opened = Opened::open(config_path, session_dir)?;
    let client = AuthorizedClient::new(opened.server.clone(), opened.session.clone());
    let me: serde_json::Value = opened.run(client.get_json("/api/auth/me"))?;

    if json {
        return print_json(&me);
    }
    let field = |key: &str| me[key].as_str().unwrap_or("-").to_string();
    let list = |key: &str| {
        me[key]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default()
    };
    println!("user:        {}", field("username"));
    println!("tenant:      {}", field("tenant"));
    println!("roles:       {}", list("roles"));
    println!("permissions: {}", list("permissions"));
    println!("server:      {}", opened.endpoint.base_url());
    Ok(())
}

// ---------------------------------------------------------------------------
// token
// ---------------------------------------------------------------------------

pub fn token(config_path: &Path, session_dir: &Path, json: bool) -> Result<()> {
    let opened = Opened::open(config_path, session_dir)?;
    let token = opened.run(opened.session.access_token())?;
    if json {
        // Claims are shown for inspection only; the server does the verifying.
        let claims = astar_core::jwt::decode_unverified(&token)?;
        return print_json(&serde_json::json!({
            "access_token": token,
            "claims": claims,
        }));
    }
    println!("{token}");
    Ok(())
}
