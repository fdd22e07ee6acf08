//! HS256 access tokens.
//!
//! Tokens are standard three-part JWTs (`header.claims.signature`), each part
//! base64url-encoded without padding. Only `HS256` is accepted.

use crate::error::{AstarError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    /// Username.
    pub sub: String,
    pub tenant: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn new(
        issuer: &str,
        subject: &str,
        tenant: &str,
        roles: Vec<String>,
        now: DateTime<Utc>,
        ttl_secs: u64,
    ) -> Self {
        let iat = now.timestamp();
        Self {
            iss: issuer.to_string(),
            sub: subject.to_string(),
            tenant: tenant.to_string(),
            roles,
            iat,
            exp: iat.saturating_add(ttl_secs.min(i64::MAX as u64) as i64),
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Header {
    alg: String,
}

#[derive(Clone)]
pub struct TokenSigner {
    issuer: String,
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(issuer: impl Into<String>, secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(AstarError::MissingSigningSecret);
        }
        Ok(Self {
            issuer: issuer.into(),
            secret: secret.to_vec(),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length")
    }

    pub fn sign(&self, claims: &Claims) -> Result<String> {
        let header = URL_SAFE_NO_PAD.encode(HEADER);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let signing_input = format!("{header}.{payload}");
        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let (signing_input, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| AstarError::InvalidToken("malformed token".into()))?;
        let (header, _) = split_parts(token)?;

        let header: Header = decode_json(header)?;
        if header.alg != "HS256" {
            return Err(AstarError::InvalidToken(format!(
                "unsupported algorithm '{}'",
                header.alg
            )));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AstarError::InvalidToken("malformed signature".into()))?;
        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AstarError::InvalidToken("bad signature".into()))?;

        let claims = decode_unverified(token)?;
        if claims.iss != self.issuer {
            return Err(AstarError::InvalidToken(format!(
                "unexpected issuer '{}'",
                claims.iss
            )));
        }
        if claims.exp <= now.timestamp() {
            return Err(AstarError::TokenExpired);
        }
        Ok(claims)
    }
}

fn split_parts(token: &str) -> Result<(&str, &str)> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(_), None) if !h.is_empty() && !c.is_empty() => Ok((h, c)),
        _ => Err(AstarError::InvalidToken("malformed token".into())),
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(part: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| AstarError::InvalidToken("malformed base64".into()))?;
    serde_json::from_slice(&bytes).map_err(|e| AstarError::InvalidToken(e.to_string()))
}

/// Read claims without checking the signature. For display only.
pub fn decode_unverified(token: &str) -> Result<Claims> {
    let (_, claims) = split_parts(token)?;
    decode_json(claims)
}
