use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use answerboard_cache::{CacheManager, CacheOptions, keys};

use crate::error::{SheetsError, SheetsResult};

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens live 3600s; cache them a little less.
const TOKEN_CACHE_SECS: u64 = 3300;
/// A cached token this close to expiry is treated as stale.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Anything that can produce a bearer token for API calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> SheetsResult<String>;
}

/// The JSON key file downloaded for a service account.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub private_key_id: Option<String>,
    pub project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> SheetsResult<Self> {
        let key: Self =
            serde_json::from_str(json).map_err(|e| SheetsError::InvalidKey(e.to_string()))?;
        if key.client_email.trim().is_empty() || key.private_key.trim().is_empty() {
            return Err(SheetsError::InvalidKey(
                "client_email and private_key are required".to_string(),
            ));
        }
        Ok(key)
    }

    pub fn from_file(path: &Path) -> SheetsResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SheetsError::InvalidKey(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges signed JWT assertions for OAuth access tokens and caches them.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    http: reqwest::Client,
    cache: Arc<CacheManager>,
    scopes: Vec<String>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client, cache: Arc<CacheManager>) -> Self {
        Self {
            key,
            http,
            cache,
            scopes: vec![SHEETS_SCOPE.to_string(), DRIVE_SCOPE.to_string()],
        }
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Bearer token for the service account itself.
    /// `force_refresh` skips and replaces any cached token.
    pub async fn get_token(&self, force_refresh: bool) -> SheetsResult<String> {
        self.token_for(None, force_refresh).await
    }

    /// Bearer token impersonating `subject` (domain-wide delegation).
    pub async fn get_delegated_token(&self, subject: &str, force_refresh: bool) -> SheetsResult<String> {
        self.token_for(Some(subject), force_refresh).await
    }

    async fn token_for(&self, subject: Option<&str>, force_refresh: bool) -> SheetsResult<String> {
        let cache_key = keys::service_account_token(subject);
        let options = CacheOptions::ttl(Duration::from_secs(TOKEN_CACHE_SECS)).without_memo();

        if force_refresh {
            self.cache.remove(&cache_key);
        } else if let Some(cached) = self.cache.lookup::<CachedToken>(&cache_key, options) {
            if cached.expires_at > Utc::now() + chrono::Duration::seconds(EXPIRY_MARGIN_SECS) {
                debug!(subject = ?subject, "using cached service account token");
                return Ok(cached.access_token);
            }
        }

        let response = self.exchange(subject).await?;
        let lifetime = response.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        let token = CachedToken {
            access_token: response.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        };

        let ttl = (lifetime - 300).clamp(0, TOKEN_CACHE_SECS as i64) as u64;
        self.cache.store(
            &cache_key,
            &token,
            CacheOptions::ttl(Duration::from_secs(ttl)).without_memo(),
        );
        info!(subject = ?subject, "obtained new service account token");
        Ok(token.access_token)
    }

    fn assertion(&self, subject: Option<&str>, now: i64) -> SheetsResult<String> {
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: self.scopes.join(" "),
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
            sub: subject,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| SheetsError::InvalidKey(e.to_string()))?;
        encode(&header, &claims, &key).map_err(|e| SheetsError::Auth(e.to_string()))
    }

    async fn exchange(&self, subject: Option<&str>) -> SheetsResult<TokenResponse> {
        let assertion = self.assertion(subject, Utc::now().timestamp())?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Auth(format!("token endpoint returned {status}: {body}")));
        }
        Ok(response.json::<TokenResponse>().await?)
    }
}

#[async_trait]
impl TokenSource for ServiceAccountAuth {
    async fn bearer_token(&self) -> SheetsResult<String> {
        self.get_token(false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_JSON: &str = r#"{
        "type": "service_account",
        "project_id": "classroom",
        "private_key_id": "abc123",
        "private_key": "not-a-real-key",
        "client_email": "board@classroom.iam.gserviceaccount.com"
    }"#;

    fn auth(cache: Arc<CacheManager>) -> ServiceAccountAuth {
        let key = ServiceAccountKey::from_json(KEY_JSON).unwrap();
        ServiceAccountAuth::new(key, reqwest::Client::new(), cache)
    }

    #[test]
    fn key_parsing_fills_default_token_uri() {
        let key = ServiceAccountKey::from_json(KEY_JSON).unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(key.private_key_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn key_without_email_is_rejected() {
        let err = ServiceAccountKey::from_json(r#"{"client_email":"","private_key":"k"}"#)
            .unwrap_err();
        assert!(matches!(err, SheetsError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn cached_token_is_served_without_network() {
        let cache = Arc::new(CacheManager::in_memory());
        cache.store(
            &keys::service_account_token(None),
            &CachedToken {
                access_token: "cached-token".to_string(),
                expires_at: Utc::now() + chrono::Duration::seconds(1800),
            },
            CacheOptions::default(),
        );

        let token = auth(cache).get_token(false).await.unwrap();
        assert_eq!(token, "cached-token");
    }

    #[tokio::test]
    async fn force_refresh_bypasses_the_cache() {
        let cache = Arc::new(CacheManager::in_memory());
        cache.store(
            &keys::service_account_token(None),
            &CachedToken {
                access_token: "cached-token".to_string(),
                expires_at: Utc::now() + chrono::Duration::seconds(1800),
            },
            CacheOptions::default(),
        );

        // The dummy key cannot sign, so a refresh fails before any request is sent.
        let err = auth(cache.clone()).get_token(true).await.unwrap_err();
        assert!(matches!(err, SheetsError::InvalidKey(_)));
        assert!(
            cache
                .lookup::<CachedToken>(&keys::service_account_token(None), CacheOptions::default())
                .is_none()
        );
    }

    #[tokio::test]
    async fn nearly_expired_token_is_not_reused() {
        let cache = Arc::new(CacheManager::in_memory());
        cache.store(
            &keys::service_account_token(Some("owner@school.example")),
            &CachedToken {
                access_token: "old".to_string(),
                expires_at: Utc::now() + chrono::Duration::seconds(10),
            },
            CacheOptions::default(),
        );

        let result = auth(cache).get_delegated_token("owner@school.example", false).await;
        assert!(result.is_err());
    }
}
