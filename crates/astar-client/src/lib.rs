//! `astar-client`: client-side session handling for the Astar auth server.
//!
//! # Architecture
//!
//! ```text
//! AuthorizedClient   ← attaches bearer token, retries once on 401
//!     │
//!     ▼
//! Session            ← holds credentials; single-flight refresh;
//!     │                 proactive refresh timer; broadcast events
//!     ▼
//! TokenEndpoint      ← trait; HttpTokenEndpoint posts to /api/auth/refresh
//!
//! SessionStore       ← session.json on disk between CLI invocations
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use astar_client::{HttpTokenEndpoint, Session};
//! use astar_core::{Credentials, RefreshPolicy};
//! use std::sync::Arc;
//!
//! let endpoint = HttpTokenEndpoint::new("http://localhost:8080");
//! let tokens = endpoint.login("tanaka", "secret").await?;
//!
//! let session = Session::new(Arc::new(endpoint), RefreshPolicy::default());
//! session.login(Credentials::from_response(tokens, chrono::Utc::now()));
//!
//! let token = session.access_token().await?;
//! ```

pub mod authorized;
pub mod endpoint;
pub mod error;
pub mod session;
pub mod store;

pub use authorized::AuthorizedClient;
pub use endpoint::{HttpTokenEndpoint, TokenEndpoint};
pub use error::ClientError;
pub use session::{Session, SessionEvent};
pub use store::{SessionStore, StoredSession};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClientError>;
