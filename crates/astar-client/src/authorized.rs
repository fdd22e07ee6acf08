use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::endpoint::status_error;
use crate::session::Session;
use crate::{ClientError, Result};

/// HTTP client that attaches the session's bearer token.
///
/// A `401` triggers one refresh (shared with any concurrent refresh) and a
/// single retry; a second `401` is returned as [`ClientError::Rejected`].
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    base_url: String,
    session: Session,
}

impl AuthorizedClient {
    pub fn new(base_url: impl Into<String>, session: Session) -> Self {
        Self::with_client(base_url, session, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, session: Session, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, Some(body)).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let token = self.session.access_token().await?;
        let mut resp = self.request(method.clone(), path, body.as_ref(), &token).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            debug!(path, "401 from server; refreshing and retrying once");
            let credentials = self.session.refresh().await?;
            resp = self
                .request(method, path, body.as_ref(), &credentials.access_token)
                .await?;
        }

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(ClientError::from)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut req = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }
        Ok(req.send().await?)
    }
}
