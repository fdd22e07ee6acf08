use astar_core::TokenResponse;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::StatusCode;
use serde::Serialize;

use crate::{ClientError, Result};

/// Something that can exchange a refresh token for a new credential pair.
pub trait TokenEndpoint: Send + Sync {
    fn refresh(&self, refresh_token: String) -> BoxFuture<'static, Result<TokenResponse>>;
}

/// The Astar server's `/api/auth/*` endpoints over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

impl HttpTokenEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let url = format!("{}/api/auth/login", self.base_url);
        post_tokens(&self.http, &url, &LoginBody { username, password }).await
    }

    /// Revoke the refresh token's family on the server.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let url = format!("{}/api/auth/logout", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&RefreshBody { refresh_token })
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(status_error(resp).await)
        }
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn refresh(&self, refresh_token: String) -> BoxFuture<'static, Result<TokenResponse>> {
        let http = self.http.clone();
        let url = format!("{}/api/auth/refresh", self.base_url);
        async move {
            post_tokens(
                &http,
                &url,
                &RefreshBody {
                    refresh_token: &refresh_token,
                },
            )
            .await
        }
        .boxed()
    }
}

async fn post_tokens<B: Serialize + ?Sized>(
    http: &reqwest::Client,
    url: &str,
    body: &B,
) -> Result<TokenResponse> {
    let resp = http.post(url).json(body).send().await?;
    if !resp.status().is_success() {
        return Err(status_error(resp).await);
    }
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Map a non-success response to an error, using the `{"error": ..}` body
/// when present.
pub(crate) async fn status_error(resp: reqwest::Response) -> ClientError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(text);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Rejected {
            status: status.as_u16(),
            message,
        },
        _ => ClientError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn token_body(n: u32) -> String {
        json!({
            "access_token": format!("access-{n}"),
            "refresh_token": format!("refresh-{n}"),
            "token_type": "Bearer",
            "expires_in": 900
        })
        .to_string()
    }

    #[tokio::test]
    async fn refresh_posts_token_and_parses_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/auth/refresh")
            .match_body(Matcher::Json(json!({ "refresh_token": "refresh-0" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body(1))
            .create_async()
            .await;

        let endpoint = HttpTokenEndpoint::new(format!("{}/", server.url()));
        let resp = endpoint.refresh("refresh-0".into()).await.unwrap();
        assert_eq!(resp.access_token, "access-1");
        assert_eq!(resp.expires_in, 900);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_maps_to_rejected_with_server_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/refresh")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid token: refresh token revoked"}"#)
            .create_async()
            .await;

        let err = HttpTokenEndpoint::new(server.url())
            .refresh("stale".into())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::Rejected {
                status: 401,
                message: "invalid token: refresh token revoked".into()
            }
        );
    }

    #[tokio::test]
    async fn server_error_maps_to_http() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/refresh")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let err = HttpTokenEndpoint::new(server.url())
            .refresh("r".into())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::Http {
                status: 503,
                message: "maintenance".into()
            }
        );
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/login")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = HttpTokenEndpoint::new(server.url())
            .login("tanaka", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn login_sends_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/auth/login")
            .match_body(Matcher::Json(json!({ "username": "tanaka", "password": "pw" })))
            .with_status(200)
            .with_body(token_body(7))
            .create_async()
            .await;

        let resp = HttpTokenEndpoint::new(server.url())
            .login("tanaka", "pw")
            .await
            .unwrap();
        assert_eq!(resp.refresh_token, "refresh-7");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn logout_succeeds_on_2xx() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/auth/logout")
            .match_body(Matcher::Json(json!({ "refresh_token": "r" })))
            .with_status(200)
            .with_body(r#"{"status":"logged_out"}"#)
            .create_async()
            .await;

        HttpTokenEndpoint::new(server.url()).logout("r").await.unwrap();
        mock.assert_async().await;
    }
}
